use actix_web::{web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::error::AppError;
use crate::response::ResponseDto;
use crate::store::comment::{self as comment_store, NewComment};
use crate::thread;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("").route(web::post().to(create)))
        .service(web::resource("/post/{post_id:\\d+}").route(web::get().to(list_by_post)))
        .service(web::resource("/post/{post_id:\\d+}/threads").route(web::get().to(threads)))
        .service(
            web::resource("/{id:\\d+}")
                .route(web::get().to(find_one))
                .route(web::delete().to(remove)),
        );
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCommentRequest {
    content: String,
    post_id: i32,
    parent_id: Option<i32>,
    visitor_id: Option<i32>,
}

#[derive(serde::Serialize)]
struct EmptyResponse {}

async fn create(
    db: web::Data<DatabaseConnection>,
    auth: OptionalAuthUser,
    payload: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, AppError> {
    let payload = payload.into_inner();
    // a signed-in user always comments as themselves
    let (author_id, visitor_id) = match auth.0 {
        Some(user) => (Some(user.user_id), None),
        None => (None, payload.visitor_id),
    };

    let created = comment_store::insert(
        db.get_ref(),
        NewComment {
            content: payload.content,
            post_id: payload.post_id,
            parent_id: payload.parent_id,
            author_id,
            visitor_id,
        },
    )
    .await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(created))))
}

async fn list_by_post(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let forest = comment_store::list_by_post(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(forest))))
}

async fn threads(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let forest = comment_store::list_by_post(db.get_ref(), path.into_inner()).await?;
    let view = thread::display_threads(&forest);
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(view))))
}

async fn find_one(
    db: web::Data<DatabaseConnection>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    let node = comment_store::find_one(db.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::success(Some(node))))
}

async fn remove(
    db: web::Data<DatabaseConnection>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, AppError> {
    comment_store::remove(db.get_ref(), path.into_inner(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(ResponseDto::<EmptyResponse>::success(None)))
}
