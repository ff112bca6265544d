use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub tags: Vec<String>,
    pub hero_banner_url: Option<String>,
    pub author_id: Id,
    pub author_username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository-level input for a new post; handlers fill in the author fields
/// from the verified bearer token, never from the request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub hero_banner_url: Option<String>,
    pub author_id: Id,
    pub author_username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub hero_banner_url: Option<String>,
    #[serde(default)]
    pub remove_hero_banner: bool,
}

/// Full account record. Never serialized to API clients directly; handlers
/// respond with a trimmed view that omits the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Single-use password-reset credential. Consumption is deletion; expiry is
/// lazy (expired rows are rejected on lookup, never swept).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct ResetToken {
    pub token: String,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
