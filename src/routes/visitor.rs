use actix_web::{web, HttpResponse};
use chrono::SecondsFormat;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::entity::visitor;
use crate::error::AppError;
use crate::response::ResponseDto;
use crate::store::visitor::{self as visitor_store, VisitorLogin};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/login").route(web::post().to(login)))
        .service(web::resource("/{id:\\d+}").route(web::get().to(get_visitor)))
        .service(web::resource("/{id:\\d+}/avatar").route(web::post().to(update_avatar)));
}

#[derive(Deserialize)]
struct VisitorLoginRequest {
    nickname: String,
    email: String,
    site: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateAvatarRequest {
    avatar_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VisitorDto {
    id: i32,
    nickname: String,
    email: String,
    site: Option<String>,
    avatar_url: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

async fn login(
    db: web::Data<DatabaseConnection>,
    payload: web::Json<VisitorLoginRequest>,
) -> Result<HttpResponse, AppError> {
    let payload = payload.into_inner();
    let visitor = visitor_store::login_or_create(
        db.get_ref(),
        VisitorLogin {
            nickname: payload.nickname,
            email: payload.email,
            site: payload.site,
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(to_dto(visitor)))))
}

async fn get_visitor(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let visitor = visitor_store::find_by_id(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(to_dto(visitor)))))
}

async fn update_avatar(
    db: web::Data<DatabaseConnection>,
    _auth: AuthUser,
    path: web::Path<i32>,
    payload: web::Json<UpdateAvatarRequest>,
) -> Result<HttpResponse, AppError> {
    let avatar_url = payload.into_inner().avatar_url;
    if avatar_url.trim().is_empty() {
        return Err(AppError::invalid_request("avatarUrl cannot be empty"));
    }
    let visitor = visitor_store::update_avatar(db.get_ref(), path.into_inner(), avatar_url).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(to_dto(visitor)))))
}

fn to_dto(model: visitor::Model) -> VisitorDto {
    VisitorDto {
        id: model.id,
        nickname: model.nickname,
        email: model.email,
        site: model.site,
        avatar_url: model.avatar_url,
        created_at: model.created.map(to_rfc3339),
        updated_at: model.updated.map(to_rfc3339),
    }
}

fn to_rfc3339(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::{json, Value};

    use crate::auth::issue_test_token;
    use crate::config::AppConfig;
    use crate::db::memory_db;
    use crate::store::fixtures;

    #[actix_web::test]
    async fn login_lookup_and_avatar() {
        let db = memory_db().await;
        let config = AppConfig::for_test();
        let admin = fixtures::user(&db, "admin").await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .app_data(web::Data::new(db.clone()))
                .configure(crate::routes::configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/visitor/login")
            .set_json(json!({ "nickname": "Zhang", "email": "zhang@example.com" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["nickname"], "Zhang");
        let id = body["data"]["id"].as_i64().unwrap();

        let req = test::TestRequest::get().uri(&format!("/visitor/{}", id)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["email"], "zhang@example.com");

        let req = test::TestRequest::post()
            .uri(&format!("/visitor/{}/avatar", id))
            .set_json(json!({ "avatarUrl": "/uploads/z.png" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri(&format!("/visitor/{}/avatar", id))
            .insert_header(("Authorization", issue_test_token(&config, admin.id)))
            .set_json(json!({ "avatarUrl": "/uploads/z.png" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["avatarUrl"], "/uploads/z.png");

        let req = test::TestRequest::get().uri(&format!("/visitor/{}", id + 1)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
