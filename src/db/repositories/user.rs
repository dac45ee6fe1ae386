use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::error::{DataError, DataResult};
use crate::entities::{tokens, users};

/// User data returned from the repository (without the password hash)
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create a user and provision its credential token in one transaction.
    ///
    /// Both writes share a transaction so a token failure rolls the user
    /// back instead of leaving a tokenless identity behind. Returns the
    /// created user together with the fresh token value.
    pub async fn create(
        &self,
        new_user: NewUser,
        security: Option<&SecurityConfig>,
    ) -> DataResult<(User, String)> {
        if new_user.username.trim().is_empty() {
            return Err(DataError::MissingField("username"));
        }
        if new_user.email.trim().is_empty() {
            return Err(DataError::MissingField("email"));
        }
        if new_user.password.is_empty() {
            return Err(DataError::MissingField("password"));
        }

        let password = new_user.password.clone();
        let config = security.cloned();
        // Argon2 is CPU-bound; keep it off the async runtime.
        let password_hash = task::spawn_blocking(move || hash_password(&password, config.as_ref()))
            .await
            .map_err(|e| DataError::Internal(format!("password hashing task panicked: {e}")))??;

        let now = chrono::Utc::now().to_rfc3339();

        let txn = self.conn.begin().await?;

        let inserted = users::ActiveModel {
            username: Set(new_user.username.clone()),
            email: Set(new_user.email.clone()),
            password_hash: Set(password_hash),
            created_at: Set(now.clone()),
            updated_at: Set(now.clone()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| DataError::from_insert(e, "username", &new_user.username))?;

        let token_value = generate_token();

        let token_insert = tokens::ActiveModel {
            user_id: Set(inserted.id),
            value: Set(token_value.clone()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await;

        if let Err(e) = token_insert {
            txn.rollback().await.ok();
            return Err(DataError::PartialWrite(format!(
                "user \"{}\" created but token provisioning failed: {e}",
                new_user.username
            )));
        }

        txn.commit().await?;

        Ok((User::from(inserted), token_value))
    }

    pub async fn get_by_id(&self, id: i32) -> DataResult<Option<User>> {
        let user = users::Entity::find_by_id(id).one(&self.conn).await?;
        Ok(user.map(User::from))
    }

    /// Bulk fetch for the comment-tree serializer, one query per page
    /// instead of one per comment.
    pub async fn get_by_ids(&self, ids: &[i32]) -> DataResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = users::Entity::find()
            .filter(users::Column::Id.is_in(ids.to_vec()))
            .all(&self.conn)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn get_by_username(&self, username: &str) -> DataResult<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await?;
        Ok(user.map(User::from))
    }

    /// Verify a password for a user.
    /// Runs in `spawn_blocking` because Argon2 verification is CPU-intensive
    /// and would stall the async runtime if run inline.
    pub async fn verify_password(&self, username: &str, password: &str) -> DataResult<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await?;

        let Some(user) = user else {
            return Ok(false);
        };

        let password_hash = user.password_hash;
        let password = password.to_string();

        let is_valid = task::spawn_blocking(move || {
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| DataError::Internal(format!("invalid password hash format: {e}")))?;

            let argon2 = Argon2::default();
            Ok::<bool, DataError>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .map_err(|e| DataError::Internal(format!("password verification task panicked: {e}")))??;

        Ok(is_valid)
    }

    /// Resolve a presented token value to its owning user
    pub async fn verify_token(&self, value: &str) -> DataResult<Option<User>> {
        let token = tokens::Entity::find()
            .filter(tokens::Column::Value.eq(value))
            .one(&self.conn)
            .await?;

        let Some(token) = token else {
            return Ok(None);
        };

        let user = users::Entity::find_by_id(token.user_id)
            .one(&self.conn)
            .await?;
        Ok(user.map(User::from))
    }

    /// The user's single token, or a `PartialWrite` error if the invariant
    /// "every user carries a token" has been violated out-of-band.
    pub async fn token_for_user(&self, user_id: i32) -> DataResult<String> {
        let token = tokens::Entity::find()
            .filter(tokens::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await?;

        token.map(|t| t.value).ok_or_else(|| {
            DataError::PartialWrite(format!("user {user_id} exists but has no token"))
        })
    }
}

/// Hash a password using Argon2id with optional custom params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> DataResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| DataError::Internal(format!("invalid Argon2 params: {e}")))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DataError::Internal(format!("failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

/// Generate a random token value (64 character hex string)
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use sea_orm::PaginatorTrait;

    async fn test_store() -> Store {
        Store::new("sqlite::memory:")
            .await
            .expect("in-memory store")
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "hunter2-longer".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_provisions_exactly_one_token() {
        let store = test_store().await;
        let (user, token) = store.create_user(new_user("alice"), None).await.unwrap();

        assert_eq!(token.len(), 64);

        let count = tokens::Entity::find()
            .filter(tokens::Column::UserId.eq(user.id))
            .count(&store.conn)
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.token_for_user(user.id).await.unwrap(), token);
    }

    #[tokio::test]
    async fn test_missing_token_surfaces_as_partial_write() {
        let store = test_store().await;
        let (user, _token) = store.create_user(new_user("bob"), None).await.unwrap();

        // Out-of-band corruption: the token row disappears while the user
        // row survives.
        tokens::Entity::delete_many()
            .filter(tokens::Column::UserId.eq(user.id))
            .exec(&store.conn)
            .await
            .unwrap();

        let err = store.token_for_user(user.id).await.unwrap_err();
        assert!(matches!(err, DataError::PartialWrite(_)));
    }

    #[tokio::test]
    async fn test_token_failure_rolls_back_user() {
        use sea_orm::{ConnectionTrait, Statement};

        let store = test_store().await;

        // Occupy the token slot of the next user id (the seed admin holds
        // id 1) so token provisioning must fail mid-transaction. Foreign
        // keys are relaxed so the orphan row can be planted.
        let backend = store.conn.get_database_backend();
        store
            .conn
            .execute(Statement::from_string(
                backend,
                "PRAGMA foreign_keys = OFF".to_string(),
            ))
            .await
            .unwrap();

        tokens::ActiveModel {
            user_id: Set(2),
            value: Set("occupied".to_string()),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        }
        .insert(&store.conn)
        .await
        .unwrap();

        let err = store.create_user(new_user("carol"), None).await.unwrap_err();
        assert!(matches!(err, DataError::PartialWrite(_)));

        // The half-written identity did not persist.
        assert!(
            store
                .get_user_by_username("carol")
                .await
                .unwrap()
                .is_none()
        );
    }
}
