use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Post, User};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("user {0} does not exist")]
    UserMissing(Uuid),
    #[error("post {0} does not exist")]
    PostMissing(Uuid),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Document store holding the Users and Posts collections.
///
/// Persistence is delegated to an external collaborator behind this trait;
/// handlers only ever see `Arc<dyn DocumentStore>`. The bidirectional
/// User.posts <-> Post.creator references are maintained by the callers,
/// not by the store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<(), StorageError>;
    async fn user(&self, id: Uuid) -> Result<Option<User>, StorageError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;

    /// Appends `post_id` to the user's back-reference list. A post id is
    /// recorded at most once no matter how often this is called.
    async fn attach_post(&self, user_id: Uuid, post_id: Uuid) -> Result<(), StorageError>;
    /// Drops `post_id` from the user's back-reference list.
    async fn detach_post(&self, user_id: Uuid, post_id: Uuid) -> Result<(), StorageError>;

    async fn insert_post(&self, post: Post) -> Result<(), StorageError>;
    async fn post(&self, id: Uuid) -> Result<Option<Post>, StorageError>;
    async fn update_post(&self, post: Post) -> Result<(), StorageError>;
    async fn remove_post(&self, id: Uuid) -> Result<(), StorageError>;

    /// One page of posts, newest first, plus the total post count.
    /// `page` is 1-based; a page past the end is empty, not an error.
    async fn posts_page(
        &self,
        page: usize,
        per_page: usize,
    ) -> Result<(Vec<Post>, usize), StorageError>;
}

/// In-memory document store.
///
/// DashMap collections keyed by id plus an email index for login lookups.
/// An insertion log keeps pagination stable: DashMap iteration order is
/// arbitrary, the log is not.
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    email_index: DashMap<String, Uuid>,
    posts: DashMap<Uuid, Post>,
    insertion_log: RwLock<Vec<Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            email_index: DashMap::new(),
            posts: DashMap::new(),
            insertion_log: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<(), StorageError> {
        self.email_index.insert(user.email.clone(), user.id);
        self.users.insert(user.id, user);
        Ok(())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let Some(id) = self.email_index.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn attach_post(&self, user_id: Uuid, post_id: Uuid) -> Result<(), StorageError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserMissing(user_id))?;
        if !user.posts.contains(&post_id) {
            user.posts.push(post_id);
        }
        Ok(())
    }

    async fn detach_post(&self, user_id: Uuid, post_id: Uuid) -> Result<(), StorageError> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserMissing(user_id))?;
        user.posts.retain(|id| *id != post_id);
        Ok(())
    }

    async fn insert_post(&self, post: Post) -> Result<(), StorageError> {
        let id = post.id;
        self.posts.insert(id, post);
        self.insertion_log
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(id);
        Ok(())
    }

    async fn post(&self, id: Uuid) -> Result<Option<Post>, StorageError> {
        Ok(self.posts.get(&id).map(|p| p.clone()))
    }

    async fn update_post(&self, post: Post) -> Result<(), StorageError> {
        if !self.posts.contains_key(&post.id) {
            return Err(StorageError::PostMissing(post.id));
        }
        self.posts.insert(post.id, post);
        Ok(())
    }

    async fn remove_post(&self, id: Uuid) -> Result<(), StorageError> {
        self.posts.remove(&id);
        self.insertion_log
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|entry| *entry != id);
        Ok(())
    }

    async fn posts_page(
        &self,
        page: usize,
        per_page: usize,
    ) -> Result<(Vec<Post>, usize), StorageError> {
        let log = self
            .insertion_log
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let total = log.len();
        let posts = log
            .iter()
            .rev()
            .skip(page.saturating_sub(1) * per_page)
            .take(per_page)
            // A lingering log entry for a removed post resolves to nothing.
            .filter_map(|id| self.posts.get(id).map(|p| p.clone()))
            .collect();
        Ok((posts, total))
    }
}
