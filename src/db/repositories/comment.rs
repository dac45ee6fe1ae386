use std::collections::HashMap;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::db::error::{DataError, DataResult};
use crate::entities::{comments, pages, users};

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub user_id: i32,
    pub page_id: String,
    pub parent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<comments::Model> for Comment {
    fn from(model: comments::Model) -> Self {
        Self {
            id: model.id,
            text: model.text,
            user_id: model.user_id,
            page_id: model.page_id,
            parent_id: model.parent_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub text: String,
    pub user_id: i32,
    pub page_id: String,
    pub parent_id: Option<String>,
}

pub struct CommentRepository {
    conn: DatabaseConnection,
}

impl CommentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create a comment after checking every reference it carries: the
    /// author and page must exist, and a supplied parent must be a comment
    /// on the SAME page. The cross-page check is deliberate; nothing in the
    /// schema alone stops a parent from another page.
    pub async fn create(&self, new_comment: NewComment) -> DataResult<Comment> {
        if new_comment.text.trim().is_empty() {
            return Err(DataError::MissingField("text"));
        }

        let author = users::Entity::find_by_id(new_comment.user_id)
            .one(&self.conn)
            .await?;
        if author.is_none() {
            return Err(DataError::ReferentialIntegrity(format!(
                "comment author {} does not exist",
                new_comment.user_id
            )));
        }

        let page = pages::Entity::find_by_id(&new_comment.page_id)
            .one(&self.conn)
            .await?;
        if page.is_none() {
            return Err(DataError::ReferentialIntegrity(format!(
                "page {} does not exist",
                new_comment.page_id
            )));
        }

        if let Some(parent_id) = &new_comment.parent_id {
            let parent = comments::Entity::find_by_id(parent_id)
                .one(&self.conn)
                .await?
                .ok_or_else(|| {
                    DataError::ReferentialIntegrity(format!(
                        "parent comment {parent_id} does not exist"
                    ))
                })?;

            if parent.page_id != new_comment.page_id {
                return Err(DataError::ReferentialIntegrity(format!(
                    "parent comment {parent_id} belongs to page {}, not page {}",
                    parent.page_id, new_comment.page_id
                )));
            }
        }

        let now = chrono::Utc::now().to_rfc3339();

        let inserted = comments::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            text: Set(new_comment.text),
            user_id: Set(new_comment.user_id),
            page_id: Set(new_comment.page_id),
            parent_id: Set(new_comment.parent_id),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        }
        .insert(&self.conn)
        .await?;

        Ok(Comment::from(inserted))
    }

    pub async fn get(&self, id: &str) -> DataResult<Option<Comment>> {
        let comment = comments::Entity::find_by_id(id).one(&self.conn).await?;
        Ok(comment.map(Comment::from))
    }

    /// All comments on a page in storage order; the tree service builds
    /// its adjacency structure from this single fetch.
    pub async fn list_for_page(&self, page_id: &str) -> DataResult<Vec<Comment>> {
        let rows = comments::Entity::find()
            .filter(comments::Column::PageId.eq(page_id))
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    /// Edit the text body; the only mutation a comment supports.
    pub async fn update_text(&self, id: &str, text: &str) -> DataResult<Comment> {
        if text.trim().is_empty() {
            return Err(DataError::MissingField("text"));
        }

        let comment = comments::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| DataError::not_found("comment", id))?;

        let mut active: comments::ActiveModel = comment.into();
        active.text = Set(text.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        let updated = active.update(&self.conn).await?;

        Ok(Comment::from(updated))
    }

    /// Delete a comment and its whole descendant subtree in one
    /// transaction. Descendants are collected iteratively from a single
    /// per-page fetch, so the cost is one read plus one bulk delete.
    pub async fn remove(&self, id: &str) -> DataResult<usize> {
        let root = comments::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| DataError::not_found("comment", id))?;

        let siblings = comments::Entity::find()
            .filter(comments::Column::PageId.eq(&root.page_id))
            .all(&self.conn)
            .await?;

        let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
        for comment in &siblings {
            if let Some(parent_id) = &comment.parent_id {
                children_of
                    .entry(parent_id.as_str())
                    .or_default()
                    .push(comment.id.as_str());
            }
        }

        let mut doomed: Vec<String> = Vec::new();
        let mut stack: Vec<&str> = vec![root.id.as_str()];
        while let Some(current) = stack.pop() {
            doomed.push(current.to_string());
            if let Some(kids) = children_of.get(current) {
                stack.extend(kids);
            }
        }

        let removed = doomed.len();

        let txn = self.conn.begin().await?;
        comments::Entity::delete_many()
            .filter(comments::Column::Id.is_in(doomed))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        Ok(removed)
    }
}
