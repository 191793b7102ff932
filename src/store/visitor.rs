use chrono::Utc;
use log::{debug, error, warn};
use regex::Regex;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entity::visitor;
use crate::error::{db_error, AppError};

#[derive(Clone, Debug)]
pub struct VisitorLogin {
    pub nickname: String,
    pub email: String,
    pub site: Option<String>,
}

/// Returns the visitor registered under `login.email`, refreshing its
/// nickname and site, or creates one.
pub async fn login_or_create(db: &DatabaseConnection, login: VisitorLogin) -> Result<visitor::Model, AppError> {
    let nickname = login.nickname.trim().to_string();
    let email = login.email.trim().to_lowercase();
    let site = login.site.filter(|s| !s.trim().is_empty());
    if nickname.is_empty() {
        return Err(AppError::invalid_request("nickname cannot be empty"));
    }
    if !is_valid_email(&email)? {
        return Err(AppError::invalid_request("email is invalid"));
    }

    if let Some(existing) = find_by_email(db, &email).await? {
        let mut active: visitor::ActiveModel = existing.into();
        active.nickname = Set(nickname);
        if site.is_some() {
            active.site = Set(site);
        }
        active.updated = Set(Some(Utc::now()));
        return active.update(db).await.map_err(db_error);
    }

    let now = Utc::now();
    let created = visitor::ActiveModel {
        nickname: Set(nickname),
        email: Set(email.clone()),
        site: Set(site),
        created: Set(Some(now)),
        updated: Set(Some(now)),
        ..Default::default()
    }
    .insert(db)
    .await;

    match created {
        Ok(model) => {
            debug!("visitor created id={}", model.id);
            Ok(model)
        }
        Err(err) => {
            // a concurrent login may have created the same email first
            let msg = err.to_string();
            if msg.contains("UNIQUE") || msg.contains("Duplicate") {
                warn!("visitor email conflict, re-reading: {}", msg);
                return reread_after_conflict(db, &email).await;
            }
            Err(db_error(err))
        }
    }
}

pub async fn find_by_id(db: &DatabaseConnection, id: i32) -> Result<visitor::Model, AppError> {
    visitor::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found("visitor"))
}

pub async fn update_avatar(db: &DatabaseConnection, id: i32, avatar_url: String) -> Result<visitor::Model, AppError> {
    let existing = find_by_id(db, id).await?;
    let mut active: visitor::ActiveModel = existing.into();
    active.avatar_url = Set(Some(avatar_url));
    active.updated = Set(Some(Utc::now()));
    active.update(db).await.map_err(db_error)
}

fn is_valid_email(email: &str) -> Result<bool, AppError> {
    let regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").map_err(|_| AppError::system_exception())?;
    Ok(regex.is_match(email))
}

async fn reread_after_conflict(db: &DatabaseConnection, email: &str) -> Result<visitor::Model, AppError> {
    match find_by_email(db, email).await? {
        Some(model) => Ok(model),
        None => {
            error!("visitor email {} conflicted but no row holds it", email);
            Err(AppError::system_exception())
        }
    }
}

async fn find_by_email(db: &DatabaseConnection, email: &str) -> Result<Option<visitor::Model>, AppError> {
    visitor::Entity::find()
        .filter(visitor::Column::Email.eq(email))
        .one(db)
        .await
        .map_err(db_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_db;

    fn login(nickname: &str, email: &str, site: Option<&str>) -> VisitorLogin {
        VisitorLogin {
            nickname: nickname.to_string(),
            email: email.to_string(),
            site: site.map(str::to_string),
        }
    }

    #[actix_rt::test]
    async fn same_email_reuses_visitor() {
        let db = memory_db().await;
        let first = login_or_create(&db, login("Zhang", "zhang@example.com", Some("https://a.example")))
            .await
            .unwrap();
        let second = login_or_create(&db, login("Zhang San", "Zhang@Example.com", None))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.nickname, "Zhang San");
        assert_eq!(second.site.as_deref(), Some("https://a.example"));

        let other = login_or_create(&db, login("Li", "li@example.com", None)).await.unwrap();
        assert_ne!(other.id, first.id);
    }

    #[actix_rt::test]
    async fn login_rejects_bad_input() {
        let db = memory_db().await;
        assert!(matches!(
            login_or_create(&db, login(" ", "a@example.com", None)).await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            login_or_create(&db, login("a", "not-an-email", None)).await,
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[actix_rt::test]
    async fn conflict_without_a_stored_row_is_a_system_error() {
        let db = memory_db().await;
        assert!(matches!(
            reread_after_conflict(&db, "ghost@example.com").await,
            Err(AppError::System)
        ));

        let v = login_or_create(&db, login("Zhao", "zhao@example.com", None)).await.unwrap();
        assert_eq!(reread_after_conflict(&db, "zhao@example.com").await.unwrap().id, v.id);
    }

    #[actix_rt::test]
    async fn avatar_update_and_lookup() {
        let db = memory_db().await;
        let v = login_or_create(&db, login("Wang", "wang@example.com", None)).await.unwrap();

        let updated = update_avatar(&db, v.id, "/uploads/wang.png".to_string()).await.unwrap();
        assert_eq!(updated.avatar_url.as_deref(), Some("/uploads/wang.png"));
        assert_eq!(find_by_id(&db, v.id).await.unwrap().avatar_url, updated.avatar_url);

        assert!(matches!(find_by_id(&db, v.id + 1).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            update_avatar(&db, v.id + 1, "x".to_string()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
