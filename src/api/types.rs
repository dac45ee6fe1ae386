use serde::{Deserialize, Serialize};

use crate::db::{Page, User};

/// Uniform response envelope for all JSON endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub gravatar: String,
    pub created_at: String,
    pub updated_at: String,
}

impl UserDto {
    pub fn from_user(user: User, gravatar: String) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            gravatar,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageDto {
    pub id: String,
    pub name: String,
    pub user_id: i32,
    pub has_stylesheet: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Page> for PageDto {
    fn from(page: Page) -> Self {
        Self {
            id: page.id,
            name: page.name,
            user_id: page.user_id,
            has_stylesheet: page.stylesheet.is_some(),
            created_at: page.created_at,
            updated_at: page.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
