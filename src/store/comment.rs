use std::collections::{HashMap, HashSet};

use chrono::Utc;
use log::{debug, info};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

use crate::entity::{comment, post, user, visitor};
use crate::error::{db_error, map_tx_error, AppError};
use crate::thread::{self, AuthorSummary, CommentNode, CommentRecord, VisitorSummary};

/// Input of [`insert`]. Exactly one of `author_id` / `visitor_id` must be set.
#[derive(Clone, Debug)]
pub struct NewComment {
    pub content: String,
    pub post_id: i32,
    pub parent_id: Option<i32>,
    pub author_id: Option<i32>,
    pub visitor_id: Option<i32>,
}

enum Owner {
    User(i32),
    Visitor(i32),
}

impl Owner {
    fn resolve(author_id: Option<i32>, visitor_id: Option<i32>) -> Result<Self, AppError> {
        match (author_id, visitor_id) {
            (Some(id), None) => Ok(Self::User(id)),
            (None, Some(id)) => Ok(Self::Visitor(id)),
            _ => Err(AppError::invalid_request("author or visitor id required")),
        }
    }
}

/// Validates and stores a new comment. The existence checks and the write
/// share one transaction.
pub async fn insert(db: &DatabaseConnection, new: NewComment) -> Result<CommentNode, AppError> {
    if new.content.trim().is_empty() {
        return Err(AppError::invalid_request("content cannot be empty"));
    }

    let created = db
        .transaction::<_, comment::Model, AppError>(move |txn| {
            Box::pin(async move {
                post::Entity::find_by_id(new.post_id)
                    .one(txn)
                    .await
                    .map_err(db_error)?
                    .ok_or_else(|| AppError::not_found("post"))?;

                if let Some(parent_id) = new.parent_id {
                    comment::Entity::find_by_id(parent_id)
                        .one(txn)
                        .await
                        .map_err(db_error)?
                        .ok_or_else(|| AppError::not_found("parent comment"))?;
                }

                match Owner::resolve(new.author_id, new.visitor_id)? {
                    Owner::User(id) => {
                        user::Entity::find_by_id(id)
                            .one(txn)
                            .await
                            .map_err(db_error)?
                            .ok_or_else(|| AppError::not_found("author"))?;
                    }
                    Owner::Visitor(id) => {
                        visitor::Entity::find_by_id(id)
                            .one(txn)
                            .await
                            .map_err(db_error)?
                            .ok_or_else(|| AppError::not_found("visitor"))?;
                    }
                }

                comment::ActiveModel {
                    content: Set(new.content),
                    post_id: Set(new.post_id),
                    parent_id: Set(new.parent_id),
                    author_id: Set(new.author_id),
                    visitor_id: Set(new.visitor_id),
                    is_approved: Set(true),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(txn)
                .await
                .map_err(db_error)
            })
        })
        .await
        .map_err(map_tx_error)?;

    debug!(
        "comment saved id={} post={} parent={:?}",
        created.id, created.post_id, created.parent_id
    );
    let mut records = to_records(db, vec![created]).await?;
    Ok(CommentNode::leaf(records.remove(0)))
}

/// Every approved comment of a post as a reply forest, newest thread first.
/// An unknown post simply has no comments.
pub async fn list_by_post<C: ConnectionTrait>(db: &C, post_id: i32) -> Result<Vec<CommentNode>, AppError> {
    let rows = comment::Entity::find()
        .filter(comment::Column::PostId.eq(post_id))
        .filter(comment::Column::IsApproved.eq(true))
        .order_by_asc(comment::Column::CreatedAt)
        .order_by_asc(comment::Column::Id)
        .all(db)
        .await
        .map_err(db_error)?;

    let mut records = to_records(db, rows).await?;
    let parents: HashMap<i32, _> = records.iter().map(|r| (r.id, r.summary())).collect();
    for record in records.iter_mut() {
        record.parent = record.parent_id.and_then(|id| parents.get(&id).cloned());
    }
    Ok(thread::build_forest(records))
}

/// One comment with its immediate approved replies.
pub async fn find_one<C: ConnectionTrait>(db: &C, id: i32) -> Result<CommentNode, AppError> {
    let model = comment::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found("comment"))?;
    let replies = comment::Entity::find()
        .filter(comment::Column::ParentId.eq(id))
        .filter(comment::Column::IsApproved.eq(true))
        .order_by_asc(comment::Column::CreatedAt)
        .order_by_asc(comment::Column::Id)
        .all(db)
        .await
        .map_err(db_error)?;

    let mut records = to_records(db, std::iter::once(model).chain(replies).collect()).await?;
    let comment = records.remove(0);
    let summary = comment.summary();
    let replies = records
        .into_iter()
        .map(|mut r| {
            r.parent = Some(summary.clone());
            CommentNode::leaf(r)
        })
        .collect();
    Ok(CommentNode { comment, replies })
}

/// Deletes a comment owned by `requesting_user_id`. Replies are left in place
/// and drop out of every listing with their parent.
pub async fn remove<C: ConnectionTrait>(db: &C, id: i32, requesting_user_id: i32) -> Result<(), AppError> {
    let model = comment::Entity::find_by_id(id)
        .one(db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| AppError::not_found("comment"))?;

    if model.author_id != Some(requesting_user_id) {
        return Err(AppError::forbidden("you can only delete your own comments"));
    }

    comment::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map_err(db_error)?;
    info!("comment {} deleted by user {}", id, requesting_user_id);
    Ok(())
}

async fn to_records<C: ConnectionTrait>(db: &C, rows: Vec<comment::Model>) -> Result<Vec<CommentRecord>, AppError> {
    let author_ids: HashSet<i32> = rows.iter().filter_map(|r| r.author_id).collect();
    let visitor_ids: HashSet<i32> = rows.iter().filter_map(|r| r.visitor_id).collect();

    let authors: HashMap<i32, AuthorSummary> = if author_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(author_ids))
            .all(db)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|u| {
                let summary = AuthorSummary {
                    id: u.id,
                    name: u.name(),
                    avatar_url: u.avatar_url,
                };
                (u.id, summary)
            })
            .collect()
    };

    let visitors: HashMap<i32, VisitorSummary> = if visitor_ids.is_empty() {
        HashMap::new()
    } else {
        visitor::Entity::find()
            .filter(visitor::Column::Id.is_in(visitor_ids))
            .all(db)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(|v| {
                let summary = VisitorSummary {
                    id: v.id,
                    nickname: v.nickname,
                    avatar_url: v.avatar_url,
                    site: v.site,
                };
                (v.id, summary)
            })
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|r| CommentRecord {
            author: r.author_id.and_then(|id| authors.get(&id).cloned()),
            visitor: r.visitor_id.and_then(|id| visitors.get(&id).cloned()),
            id: r.id,
            content: r.content,
            post_id: r.post_id,
            parent_id: r.parent_id,
            author_id: r.author_id,
            visitor_id: r.visitor_id,
            is_approved: r.is_approved,
            created_at: r.created_at,
            parent: None,
        })
        .collect())
}
