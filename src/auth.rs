use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::debug;
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::config::AppConfig;
use crate::entity::user;
use crate::error::{db_error, AppError};

/// A registered user resolved from the request token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i32,
}

#[derive(Clone, Debug)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Err(AppError::system_exception().into()) });
            }
        };
        let token = extract_token(req, &config);

        Box::pin(async move {
            let token = token.ok_or_else(AppError::need_login)?;
            let auth = authenticate_token(&db, &config, &token).await?;
            Ok(auth)
        })
    }
}

impl FromRequest for OptionalAuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let db = match req.app_data::<web::Data<DatabaseConnection>>() {
            Some(db) => db.clone(),
            None => {
                return Box::pin(async { Ok(OptionalAuthUser(None)) });
            }
        };
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(cfg) => cfg.clone(),
            None => {
                return Box::pin(async { Ok(OptionalAuthUser(None)) });
            }
        };
        let token = extract_token(req, &config);

        Box::pin(async move {
            if let Some(token) = token {
                let auth = match authenticate_token(&db, &config, &token).await {
                    Ok(auth) => Some(auth),
                    Err(err) => {
                        debug!("ignoring unusable token: {}", err);
                        None
                    }
                };
                return Ok(OptionalAuthUser(auth));
            }
            Ok(OptionalAuthUser(None))
        })
    }
}

fn extract_token(req: &HttpRequest, config: &AppConfig) -> Option<String> {
    let header = config.token_header.as_str();
    req.headers()
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(strip_bearer)
        .filter(|v| !v.is_empty())
}

fn strip_bearer(raw: &str) -> String {
    let raw = raw.trim();
    match raw.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => raw[7..].trim().to_string(),
        _ => raw.to_string(),
    }
}

async fn authenticate_token(
    db: &DatabaseConnection,
    config: &AppConfig,
    token: &str,
) -> Result<AuthUser, AppError> {
    let claims = decode_jwt(config, token)?;
    let user_id = extract_user_id(&claims).ok_or_else(AppError::need_login)?;
    // tokens of deleted users are treated like missing ones
    user::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(AppError::need_login)?;

    Ok(AuthUser { user_id })
}

fn decode_jwt(config: &AppConfig, token: &str) -> Result<serde_json::Value, AppError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    decode::<serde_json::Value>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::need_login())
}

fn extract_user_id(claims: &serde_json::Value) -> Option<i32> {
    for key in ["loginId", "userId", "id", "sub"] {
        if let Some(value) = claims.get(key) {
            if let Some(id) = value.as_i64() {
                return i32::try_from(id).ok();
            }
            if let Some(s) = value.as_str() {
                if let Ok(id) = s.parse::<i32>() {
                    return Some(id);
                }
            }
        }
    }
    None
}

#[cfg(test)]
pub fn issue_test_token(config: &AppConfig, user_id: i32) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp();
    let claims = serde_json::json!({ "sub": user_id.to_string(), "exp": exp });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .expect("encode token")
}
