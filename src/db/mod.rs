use std::path::Path;
use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use tracing::info;

pub mod error;
pub mod migrator;
pub mod repositories;

pub use error::{DataError, DataResult};
pub use repositories::comment::{Comment, NewComment};
pub use repositories::page::Page;
pub use repositories::user::{NewUser, User};

use crate::config::SecurityConfig;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

/// Row counts across the store, for the status endpoint.
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub users: u64,
    pub pages: u64,
    pub comments: u64,
}

impl Store {
    pub async fn new(db_url: &str) -> anyhow::Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> anyhow::Result<Self> {
        use sea_orm_migration::MigratorTrait;

        // A pooled :memory: database is one database per connection; clamp
        // to a single connection so the migrated schema stays visible.
        let (max_connections, min_connections) = if db_url.contains(":memory:") {
            (1, 1)
        } else {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn stats(&self) -> DataResult<StoreStats> {
        use crate::entities::prelude::{Comments, Pages, Users};
        use sea_orm::{EntityTrait, PaginatorTrait};

        Ok(StoreStats {
            users: Users::find().count(&self.conn).await?,
            pages: Pages::find().count(&self.conn).await?,
            comments: Comments::find().count(&self.conn).await?,
        })
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn page_repo(&self) -> repositories::page::PageRepository {
        repositories::page::PageRepository::new(self.conn.clone())
    }

    fn comment_repo(&self) -> repositories::comment::CommentRepository {
        repositories::comment::CommentRepository::new(self.conn.clone())
    }

    pub async fn create_user(
        &self,
        new_user: NewUser,
        security: Option<&SecurityConfig>,
    ) -> DataResult<(User, String)> {
        self.user_repo().create(new_user, security).await
    }

    pub async fn get_user(&self, id: i32) -> DataResult<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_users_by_ids(&self, ids: &[i32]) -> DataResult<Vec<User>> {
        self.user_repo().get_by_ids(ids).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> DataResult<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> DataResult<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn verify_token(&self, value: &str) -> DataResult<Option<User>> {
        self.user_repo().verify_token(value).await
    }

    pub async fn token_for_user(&self, user_id: i32) -> DataResult<String> {
        self.user_repo().token_for_user(user_id).await
    }

    pub async fn create_page(&self, name: &str, user_id: i32) -> DataResult<Page> {
        self.page_repo().create(name, user_id).await
    }

    pub async fn get_page(&self, id: &str) -> DataResult<Option<Page>> {
        self.page_repo().get(id).await
    }

    pub async fn list_pages_for_user(&self, user_id: i32) -> DataResult<Vec<Page>> {
        self.page_repo().list_for_user(user_id).await
    }

    pub async fn rename_page(&self, id: &str, name: &str) -> DataResult<Page> {
        self.page_repo().rename(id, name).await
    }

    pub async fn set_page_stylesheet(&self, id: &str, path: Option<String>) -> DataResult<Page> {
        self.page_repo().set_stylesheet(id, path).await
    }

    pub async fn remove_page(&self, id: &str) -> DataResult<Page> {
        self.page_repo().remove(id).await
    }

    pub async fn create_comment(&self, new_comment: NewComment) -> DataResult<Comment> {
        self.comment_repo().create(new_comment).await
    }

    pub async fn get_comment(&self, id: &str) -> DataResult<Option<Comment>> {
        self.comment_repo().get(id).await
    }

    pub async fn list_comments_for_page(&self, page_id: &str) -> DataResult<Vec<Comment>> {
        self.comment_repo().list_for_page(page_id).await
    }

    pub async fn update_comment_text(&self, id: &str, text: &str) -> DataResult<Comment> {
        self.comment_repo().update_text(id, text).await
    }

    pub async fn remove_comment(&self, id: &str) -> DataResult<usize> {
        self.comment_repo().remove(id).await
    }
}
