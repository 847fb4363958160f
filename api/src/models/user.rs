use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Back-references to every post this user created, in creation order.
    /// Kept in sync with `Post::creator` by the feed handlers.
    pub posts: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}
