use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::db::error::{DataError, DataResult};
use crate::entities::{comments, pages, users};

#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub name: String,
    pub stylesheet: Option<String>,
    pub user_id: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<pages::Model> for Page {
    fn from(model: pages::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            stylesheet: model.stylesheet,
            user_id: model.user_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct PageRepository {
    conn: DatabaseConnection,
}

impl PageRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create a page owned by an existing user. The UUID and both
    /// timestamps are assigned here rather than by the storage layer.
    pub async fn create(&self, name: &str, user_id: i32) -> DataResult<Page> {
        if name.trim().is_empty() {
            return Err(DataError::MissingField("name"));
        }

        let owner = users::Entity::find_by_id(user_id).one(&self.conn).await?;
        if owner.is_none() {
            return Err(DataError::ReferentialIntegrity(format!(
                "page owner {user_id} does not exist"
            )));
        }

        let now = chrono::Utc::now().to_rfc3339();

        let inserted = pages::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(name.to_string()),
            stylesheet: Set(None),
            user_id: Set(user_id),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        }
        .insert(&self.conn)
        .await?;

        Ok(Page::from(inserted))
    }

    pub async fn get(&self, id: &str) -> DataResult<Option<Page>> {
        let page = pages::Entity::find_by_id(id).one(&self.conn).await?;
        Ok(page.map(Page::from))
    }

    pub async fn list_for_user(&self, user_id: i32) -> DataResult<Vec<Page>> {
        let rows = pages::Entity::find()
            .filter(pages::Column::UserId.eq(user_id))
            .order_by_asc(pages::Column::CreatedAt)
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(Page::from).collect())
    }

    pub async fn rename(&self, id: &str, name: &str) -> DataResult<Page> {
        if name.trim().is_empty() {
            return Err(DataError::MissingField("name"));
        }

        let page = pages::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| DataError::not_found("page", id))?;

        let mut active: pages::ActiveModel = page.into();
        active.name = Set(name.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        let updated = active.update(&self.conn).await?;

        Ok(Page::from(updated))
    }

    /// Record (or clear) the page's stylesheet path; the blob itself lives
    /// on disk and is managed by the stylesheet service.
    pub async fn set_stylesheet(&self, id: &str, path: Option<String>) -> DataResult<Page> {
        let page = pages::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| DataError::not_found("page", id))?;

        let mut active: pages::ActiveModel = page.into();
        active.stylesheet = Set(path);
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        let updated = active.update(&self.conn).await?;

        Ok(Page::from(updated))
    }

    /// Delete a page and every comment on it in one transaction. Returns
    /// the deleted page so the caller can clean up its stylesheet blob.
    pub async fn remove(&self, id: &str) -> DataResult<Page> {
        let page = pages::Entity::find_by_id(id)
            .one(&self.conn)
            .await?
            .ok_or_else(|| DataError::not_found("page", id))?;

        let txn = self.conn.begin().await?;

        comments::Entity::delete_many()
            .filter(comments::Column::PageId.eq(id))
            .exec(&txn)
            .await?;

        pages::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;

        Ok(Page::from(page))
    }
}
