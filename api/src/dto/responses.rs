use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Post, User};

/// Denormalized owner view embedded in post responses and events.
#[derive(Debug, Clone, Serialize)]
pub struct CreatorView {
    pub id: Uuid,
    pub name: String,
}

impl CreatorView {
    pub fn of(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
        }
    }
}

/// A post with its creator resolved, as served to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub creator: CreatorView,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostView {
    pub fn new(post: Post, creator: CreatorView) -> Self {
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            image_url: post.image_url,
            creator,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListResponse {
    pub message: String,
    pub posts: Vec<PostView>,
    pub total_items: usize,
}

#[derive(Debug, Serialize)]
pub struct PostCreatedResponse {
    pub message: String,
    pub post: PostView,
    pub creator: CreatorView,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub message: String,
    pub post: PostView,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
