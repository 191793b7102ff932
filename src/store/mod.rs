pub mod comment;
pub mod visitor;

#[cfg(test)]
pub mod fixtures {
    use chrono::{TimeZone, Utc};
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

    use crate::entity::{comment, post, user, visitor};

    pub async fn user(db: &DatabaseConnection, username: &str) -> user::Model {
        user::ActiveModel {
            username: Set(username.to_string()),
            created: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert user")
    }

    pub async fn post(db: &DatabaseConnection, author_id: i32) -> post::Model {
        post::ActiveModel {
            title: Set("hello world".to_string()),
            author_id: Set(author_id),
            created: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert post")
    }

    pub async fn visitor(db: &DatabaseConnection, nickname: &str, email: &str) -> visitor::Model {
        visitor::ActiveModel {
            nickname: Set(nickname.to_string()),
            email: Set(email.to_string()),
            created: Set(Some(Utc::now())),
            updated: Set(Some(Utc::now())),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert visitor")
    }

    /// A user-authored comment created `minute` minutes into a fixed day.
    pub async fn comment(
        db: &DatabaseConnection,
        post_id: i32,
        parent_id: Option<i32>,
        author_id: i32,
        minute: u32,
    ) -> comment::Model {
        comment::ActiveModel {
            content: Set(format!("comment at {}", minute)),
            post_id: Set(post_id),
            parent_id: Set(parent_id),
            author_id: Set(Some(author_id)),
            visitor_id: Set(None),
            is_approved: Set(true),
            created_at: Set(Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("insert comment")
    }

    pub async fn unapprove(db: &DatabaseConnection, id: i32) {
        comment::ActiveModel {
            id: Set(id),
            is_approved: Set(false),
            ..Default::default()
        }
        .update(db)
        .await
        .expect("update comment");
    }
}
