use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    dto::{
        CreatePostInput, CreatorView, MessageResponse, PostCreatedResponse, PostListResponse,
        PostResponse, PostView, UpdatePostInput,
    },
    errors::{ApiError, FieldError},
    models::Post,
    notifier::FeedEvent,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: usize,
}

fn default_page() -> usize {
    1
}

pub(crate) struct ImageUpload {
    pub data: Bytes,
    pub content_type: String,
}

/// Fields of the create/update multipart form. Absent fields stay `None`;
/// the workflows decide what absence means.
pub(crate) struct PostForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image: Option<ImageUpload>,
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, ApiError> {
    let mut form = PostForm {
        title: None,
        content: None,
        image: None,
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(ApiError::Validation(vec![FieldError::new(
                    "body",
                    &format!("Malformed multipart body: {e}"),
                )]));
            }
        };
        let malformed = |e| {
            ApiError::Validation(vec![FieldError::new(
                "body",
                &format!("Malformed multipart body: {e}"),
            )])
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("title") => form.title = Some(field.text().await.map_err(malformed)?),
            Some("content") => form.content = Some(field.text().await.map_err(malformed)?),
            Some("image") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(malformed)?;
                form.image = Some(ImageUpload { data, content_type });
            }
            _ => {}
        }
    }

    Ok(form)
}

fn post_not_found() -> ApiError {
    ApiError::NotFound("Post not found".into())
}

async fn resolve_creator(state: &AppState, id: Uuid) -> Result<CreatorView, ApiError> {
    match state.store.user(id).await? {
        Some(user) => Ok(CreatorView::of(&user)),
        None => {
            // Users are never deleted, so this is drift, not a user error.
            // Serve the page anyway.
            warn!("Post creator {} has no user record", id);
            Ok(CreatorView {
                id,
                name: "unknown".into(),
            })
        }
    }
}

/// GET /feed/posts?page=1
/// Headers: Authorization: Bearer <token>
pub async fn list_posts(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PostListResponse>, ApiError> {
    let response = list_posts_inner(&state, params.page).await?;
    Ok(Json(response))
}

pub(crate) async fn list_posts_inner(
    state: &AppState,
    page: usize,
) -> Result<PostListResponse, ApiError> {
    let page = page.max(1);
    let (posts, total_items) = state.store.posts_page(page, state.page_size).await?;

    let mut views = Vec::with_capacity(posts.len());
    for post in posts {
        let creator = resolve_creator(state, post.creator).await?;
        views.push(PostView::new(post, creator));
    }

    Ok(PostListResponse {
        message: "Fetched posts successfully".into(),
        posts: views,
        total_items,
    })
}

/// POST /feed/post
/// Headers: Authorization: Bearer <token>
/// Body: multipart form with title, content, image
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<PostCreatedResponse>), ApiError> {
    let form = read_post_form(multipart).await?;
    let response = create_post_inner(&state, user_id, form).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// The create workflow. Side effects are cumulative and ordered: image
/// upload, then post insert, then the owner back-reference, then the
/// broadcast. A failure aborts the remaining steps; committed steps are
/// not rolled back.
pub(crate) async fn create_post_inner(
    state: &AppState,
    user_id: Uuid,
    form: PostForm,
) -> Result<PostCreatedResponse, ApiError> {
    let input = CreatePostInput {
        title: form.title.unwrap_or_default().trim().to_string(),
        content: form.content.unwrap_or_default().trim().to_string(),
    };
    input.validate().map_err(ApiError::from_validation)?;

    let image = form.image.ok_or_else(|| {
        ApiError::Validation(vec![FieldError::new("image", "No image provided")])
    })?;

    let creator = state
        .store
        .user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let stored = state.images.upload(image.data, &image.content_type).await?;

    let now = Utc::now();
    let post = Post {
        id: Uuid::new_v4(),
        title: input.title,
        content: input.content,
        image_url: stored.url,
        image_id: stored.delete_id,
        creator: user_id,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_post(post.clone()).await?;

    if let Err(err) = state.store.attach_post(user_id, post.id).await {
        // The post document exists but its owner does not reference it.
        // Logged loudly so the drift can be repaired out of band.
        error!(
            "INCONSISTENCY: post {} not recorded on user {}: {}",
            post.id, user_id, err
        );
        return Err(err.into());
    }

    let view = PostView::new(post, CreatorView::of(&creator));
    state.notifier.publish(FeedEvent::PostCreated { post: view.clone() });
    info!("Post {} created by user {}", view.id, user_id);

    Ok(PostCreatedResponse {
        message: "Post created successfully!".into(),
        creator: view.creator.clone(),
        post: view,
    })
}

/// GET /feed/post/{id}
/// Headers: Authorization: Bearer <token>
pub async fn get_post(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state.store.post(id).await?.ok_or_else(post_not_found)?;
    let creator = resolve_creator(&state, post.creator).await?;
    Ok(Json(PostResponse {
        message: "Post fetched".into(),
        post: PostView::new(post, creator),
    }))
}

/// PUT /feed/post/{id}
/// Headers: Authorization: Bearer <token>
/// Body: multipart form; every field optional, omission means unchanged
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<PostResponse>, ApiError> {
    let form = read_post_form(multipart).await?;
    let response = update_post_inner(&state, user_id, id, form).await?;
    Ok(Json(response))
}

pub(crate) async fn update_post_inner(
    state: &AppState,
    user_id: Uuid,
    post_id: Uuid,
    form: PostForm,
) -> Result<PostResponse, ApiError> {
    let input = UpdatePostInput {
        title: form.title.map(|t| t.trim().to_string()),
        content: form.content.map(|c| c.trim().to_string()),
    };
    input.validate().map_err(ApiError::from_validation)?;

    let mut post = state.store.post(post_id).await?.ok_or_else(post_not_found)?;
    if post.creator != user_id {
        return Err(ApiError::Authorization(
            "Not authorized to edit this post".into(),
        ));
    }

    if let Some(image) = form.image {
        // New image first; the old one goes away only once the replacement
        // exists, so the post never points at nothing.
        let stored = state.images.upload(image.data, &image.content_type).await?;
        if let Err(err) = state.images.delete(&post.image_id).await {
            warn!("Failed to delete replaced image {}: {}", post.image_id, err);
        }
        post.image_url = stored.url;
        post.image_id = stored.delete_id;
    }

    if let Some(title) = input.title {
        post.title = title;
    }
    if let Some(content) = input.content {
        post.content = content;
    }
    post.updated_at = Utc::now();

    state.store.update_post(post.clone()).await?;
    info!("Post {} updated by user {}", post_id, user_id);

    let creator = resolve_creator(state, post.creator).await?;
    Ok(PostResponse {
        message: "Post updated!".into(),
        post: PostView::new(post, creator),
    })
}

/// DELETE /feed/post/{id}
/// Headers: Authorization: Bearer <token>
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let response = delete_post_inner(&state, user_id, id).await?;
    Ok(Json(response))
}

/// Image delete is attempted first but never blocks the document delete;
/// the document goes before the back-reference so the worst drift is a
/// dangling id in a list, which the feed filters out.
pub(crate) async fn delete_post_inner(
    state: &AppState,
    user_id: Uuid,
    post_id: Uuid,
) -> Result<MessageResponse, ApiError> {
    let post = state.store.post(post_id).await?.ok_or_else(post_not_found)?;
    if post.creator != user_id {
        return Err(ApiError::Authorization(
            "Not authorized to delete this post".into(),
        ));
    }

    if let Err(err) = state.images.delete(&post.image_id).await {
        warn!(
            "Failed to delete image {} for post {}: {}",
            post.image_id, post_id, err
        );
    }

    state.store.remove_post(post_id).await?;
    state.store.detach_post(user_id, post_id).await?;

    info!("Post {} deleted by user {}", post_id, user_id);
    Ok(MessageResponse {
        message: "Post deleted".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::{
        images::{ImageStore, ImageStoreError, StoredImage},
        models::User,
        notifier::Notifier,
        storage::{DocumentStore, MemoryStore, StorageError},
    };

    /// Image store double that records the order of calls.
    #[derive(Default)]
    struct RecordingImages {
        calls: Mutex<Vec<String>>,
        fail_upload: bool,
        fail_delete: bool,
    }

    impl RecordingImages {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ImageStore for RecordingImages {
        async fn upload(
            &self,
            _bytes: Bytes,
            _content_type: &str,
        ) -> Result<StoredImage, ImageStoreError> {
            self.calls.lock().unwrap().push("upload".into());
            if self.fail_upload {
                return Err(ImageStoreError::Rejected("injected upload failure".into()));
            }
            let id = Uuid::new_v4().to_string();
            Ok(StoredImage {
                url: format!("http://img.test/{id}"),
                delete_id: id,
            })
        }

        async fn delete(&self, delete_id: &str) -> Result<(), ImageStoreError> {
            self.calls.lock().unwrap().push(format!("delete {delete_id}"));
            if self.fail_delete {
                return Err(ImageStoreError::Rejected("injected delete failure".into()));
            }
            Ok(())
        }
    }

    /// Store double that fails selected operations, delegating the rest.
    struct FailingStore {
        inner: MemoryStore,
        fail_insert_post: bool,
        fail_attach: bool,
    }

    impl FailingStore {
        fn new(fail_insert_post: bool, fail_attach: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_insert_post,
                fail_attach,
            }
        }

        fn injected() -> StorageError {
            StorageError::Unavailable("injected write failure".into())
        }
    }

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn insert_user(&self, user: User) -> Result<(), StorageError> {
            self.inner.insert_user(user).await
        }
        async fn user(&self, id: Uuid) -> Result<Option<User>, StorageError> {
            self.inner.user(id).await
        }
        async fn user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
            self.inner.user_by_email(email).await
        }
        async fn attach_post(&self, user_id: Uuid, post_id: Uuid) -> Result<(), StorageError> {
            if self.fail_attach {
                return Err(Self::injected());
            }
            self.inner.attach_post(user_id, post_id).await
        }
        async fn detach_post(&self, user_id: Uuid, post_id: Uuid) -> Result<(), StorageError> {
            self.inner.detach_post(user_id, post_id).await
        }
        async fn insert_post(&self, post: Post) -> Result<(), StorageError> {
            if self.fail_insert_post {
                return Err(Self::injected());
            }
            self.inner.insert_post(post).await
        }
        async fn post(&self, id: Uuid) -> Result<Option<Post>, StorageError> {
            self.inner.post(id).await
        }
        async fn update_post(&self, post: Post) -> Result<(), StorageError> {
            self.inner.update_post(post).await
        }
        async fn remove_post(&self, id: Uuid) -> Result<(), StorageError> {
            self.inner.remove_post(id).await
        }
        async fn posts_page(
            &self,
            page: usize,
            per_page: usize,
        ) -> Result<(Vec<Post>, usize), StorageError> {
            self.inner.posts_page(page, per_page).await
        }
    }

    fn test_state(store: Arc<dyn DocumentStore>, images: Arc<dyn ImageStore>) -> AppState {
        AppState {
            store,
            images,
            notifier: Notifier::new(16),
            jwt_secret: "test-secret".into(),
            page_size: 2,
        }
    }

    async fn seeded_user(state: &AppState, name: &str, email: &str) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            posts: Vec::new(),
            created_at: Utc::now(),
        };
        let id = user.id;
        state.store.insert_user(user).await.unwrap();
        id
    }

    fn form(title: Option<&str>, content: Option<&str>, with_image: bool) -> PostForm {
        PostForm {
            title: title.map(str::to_string),
            content: content.map(str::to_string),
            image: with_image.then(|| ImageUpload {
                data: Bytes::from_static(b"fake image bytes"),
                content_type: "image/png".into(),
            }),
        }
    }

    fn valid_form() -> PostForm {
        form(Some("First post"), Some("This is the first post!"), true)
    }

    #[tokio::test]
    async fn create_sets_creator_and_back_reference() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingImages::default()),
        );
        let user_id = seeded_user(&state, "Shem", "shem@example.com").await;
        let mut events = state.notifier.subscribe();

        let created = create_post_inner(&state, user_id, valid_form())
            .await
            .unwrap();

        assert_eq!(created.post.creator.id, user_id);
        assert_eq!(created.creator.name, "Shem");

        let owner = state.store.user(user_id).await.unwrap().unwrap();
        assert_eq!(owner.posts, vec![created.post.id]);

        let FeedEvent::PostCreated { post } = events.try_recv().unwrap();
        assert_eq!(post.id, created.post.id);
    }

    #[tokio::test]
    async fn short_title_is_rejected_before_any_side_effect() {
        let images = Arc::new(RecordingImages::default());
        let state = test_state(Arc::new(MemoryStore::new()), images.clone());
        let user_id = seeded_user(&state, "Shem", "shem@example.com").await;

        let err = create_post_inner(&state, user_id, form(Some("Hi"), Some("long enough"), true))
            .await
            .unwrap_err();

        match err {
            ApiError::Validation(fields) => {
                assert!(fields.iter().any(|f| f.field == "title"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(images.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_image_is_rejected() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingImages::default()),
        );
        let user_id = seeded_user(&state, "Shem", "shem@example.com").await;

        let err = create_post_inner(&state, user_id, form(Some("First post"), Some("content!"), false))
            .await
            .unwrap_err();

        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields, vec![FieldError::new("image", "No image provided")]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_failure_persists_nothing() {
        let images = Arc::new(RecordingImages {
            fail_upload: true,
            ..Default::default()
        });
        let state = test_state(Arc::new(MemoryStore::new()), images);
        let user_id = seeded_user(&state, "Shem", "shem@example.com").await;

        let err = create_post_inner(&state, user_id, valid_form())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Upload(_)));

        let (posts, total) = state.store.posts_page(1, 10).await.unwrap();
        assert!(posts.is_empty());
        assert_eq!(total, 0);
        assert!(state.store.user(user_id).await.unwrap().unwrap().posts.is_empty());
    }

    #[tokio::test]
    async fn document_write_failure_publishes_no_event() {
        let state = test_state(
            Arc::new(FailingStore::new(true, false)),
            Arc::new(RecordingImages::default()),
        );
        let user_id = seeded_user(&state, "Shem", "shem@example.com").await;
        let mut events = state.notifier.subscribe();

        let err = create_post_inner(&state, user_id, valid_form())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn back_reference_failure_is_surfaced_without_broadcast() {
        let state = test_state(
            Arc::new(FailingStore::new(false, true)),
            Arc::new(RecordingImages::default()),
        );
        let user_id = seeded_user(&state, "Shem", "shem@example.com").await;
        let mut events = state.notifier.subscribe();

        let err = create_post_inner(&state, user_id, valid_form())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        // The orphaned document is still there: no rollback is attempted.
        let (_, total) = state.store.posts_page(1, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn non_owner_update_is_forbidden_and_post_unchanged() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingImages::default()),
        );
        let owner = seeded_user(&state, "Shem", "shem@example.com").await;
        let intruder = seeded_user(&state, "Maya", "maya@example.com").await;
        let created = create_post_inner(&state, owner, valid_form()).await.unwrap();

        let err = update_post_inner(
            &state,
            intruder,
            created.post.id,
            form(Some("Hijacked title"), None, false),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));

        let post = state.store.post(created.post.id).await.unwrap().unwrap();
        assert_eq!(post.title, "First post");
    }

    #[tokio::test]
    async fn update_uploads_new_image_before_dropping_old() {
        let images = Arc::new(RecordingImages {
            fail_delete: true,
            ..Default::default()
        });
        let state = test_state(Arc::new(MemoryStore::new()), images.clone());
        let owner = seeded_user(&state, "Shem", "shem@example.com").await;
        let created = create_post_inner(&state, owner, valid_form()).await.unwrap();
        let old_image = state
            .store
            .post(created.post.id)
            .await
            .unwrap()
            .unwrap()
            .image_id;

        // Delete of the old image fails; the update must still succeed.
        let updated = update_post_inner(&state, owner, created.post.id, form(None, None, true))
            .await
            .unwrap();
        assert_ne!(updated.post.image_url, created.post.image_url);

        let calls = images.calls();
        assert_eq!(
            calls,
            vec![
                "upload".to_string(),
                "upload".to_string(),
                format!("delete {old_image}"),
            ]
        );
    }

    #[tokio::test]
    async fn update_with_no_fields_only_bumps_updated_at() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingImages::default()),
        );
        let owner = seeded_user(&state, "Shem", "shem@example.com").await;
        let created = create_post_inner(&state, owner, valid_form()).await.unwrap();
        let before = state.store.post(created.post.id).await.unwrap().unwrap();

        let updated = update_post_inner(&state, owner, created.post.id, form(None, None, false))
            .await
            .unwrap();

        assert_eq!(updated.post.title, before.title);
        assert_eq!(updated.post.content, before.content);
        assert_eq!(updated.post.image_url, before.image_url);
        assert_eq!(updated.post.created_at, before.created_at);
        assert!(updated.post.updated_at >= before.updated_at);
    }

    #[tokio::test]
    async fn delete_removes_post_image_and_back_reference() {
        let images = Arc::new(RecordingImages::default());
        let state = test_state(Arc::new(MemoryStore::new()), images.clone());
        let owner = seeded_user(&state, "Shem", "shem@example.com").await;
        let created = create_post_inner(&state, owner, valid_form()).await.unwrap();
        let image_id = state
            .store
            .post(created.post.id)
            .await
            .unwrap()
            .unwrap()
            .image_id;

        delete_post_inner(&state, owner, created.post.id).await.unwrap();

        assert!(state.store.post(created.post.id).await.unwrap().is_none());
        assert!(state.store.user(owner).await.unwrap().unwrap().posts.is_empty());
        assert!(images.calls().contains(&format!("delete {image_id}")));

        let err = delete_post_inner(&state, owner, created.post.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_proceeds_when_image_delete_fails() {
        let images = Arc::new(RecordingImages {
            fail_delete: true,
            ..Default::default()
        });
        let state = test_state(Arc::new(MemoryStore::new()), images);
        let owner = seeded_user(&state, "Shem", "shem@example.com").await;
        let created = create_post_inner(&state, owner, valid_form()).await.unwrap();

        delete_post_inner(&state, owner, created.post.id).await.unwrap();
        assert!(state.store.post(created.post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_owner_delete_is_forbidden_and_post_survives() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingImages::default()),
        );
        let owner = seeded_user(&state, "Shem", "shem@example.com").await;
        let intruder = seeded_user(&state, "Maya", "maya@example.com").await;
        let created = create_post_inner(&state, owner, valid_form()).await.unwrap();

        let err = delete_post_inner(&state, intruder, created.post.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Authorization(_)));
        assert!(state.store.post(created.post.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_paginates_newest_first_with_resolved_creators() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingImages::default()),
        );
        let owner = seeded_user(&state, "Shem", "shem@example.com").await;

        let mut ids = Vec::new();
        for i in 0..3 {
            let f = form(Some(&format!("Post number {i}")), Some("some content"), true);
            ids.push(create_post_inner(&state, owner, f).await.unwrap().post.id);
        }

        let page1 = list_posts_inner(&state, 1).await.unwrap();
        assert_eq!(page1.total_items, 3);
        assert_eq!(page1.posts.len(), 2);
        assert_eq!(page1.posts[0].id, ids[2]);
        assert_eq!(page1.posts[0].creator.name, "Shem");

        let page2 = list_posts_inner(&state, 2).await.unwrap();
        assert_eq!(page2.posts.len(), 1);
        assert_eq!(page2.posts[0].id, ids[0]);

        let page3 = list_posts_inner(&state, 3).await.unwrap();
        assert!(page3.posts.is_empty());

        // Page 0 clamps to the first page instead of erroring.
        let clamped = list_posts_inner(&state, 0).await.unwrap();
        assert_eq!(clamped.posts[0].id, ids[2]);
    }
}
