use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("image write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("image host request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("image host rejected request: {0}")]
    Rejected(String),
}

/// Upload result: a durable public URL plus the identifier needed to
/// delete the object later.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub url: String,
    pub delete_id: String,
}

/// Durable host for uploaded images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredImage, ImageStoreError>;
    async fn delete(&self, delete_id: &str) -> Result<(), ImageStoreError>;
}

/// Stores images on the local filesystem. The directory is served
/// read-only under `/images` by the router.
pub struct LocalImageStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalImageStore {
    pub fn new(dir: PathBuf, public_base: String) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpeg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredImage, ImageStoreError> {
        let name = format!("{}.{}", Uuid::new_v4(), extension_for(content_type));
        tokio::fs::write(self.dir.join(&name), &bytes).await?;
        info!("Stored image {} ({} bytes)", name, bytes.len());
        Ok(StoredImage {
            url: format!("{}/images/{}", self.public_base, name),
            delete_id: name,
        })
    }

    async fn delete(&self, delete_id: &str) -> Result<(), ImageStoreError> {
        // Identifiers are flat file names; anything else never came from us.
        if delete_id.contains('/') || delete_id.contains("..") {
            return Err(ImageStoreError::Rejected(format!(
                "invalid image identifier: {delete_id}"
            )));
        }
        tokio::fs::remove_file(self.dir.join(delete_id)).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    url: String,
    id: String,
}

/// Client for a cloud image host: raw upload body in, `{url, id}` out,
/// delete by id.
pub struct RemoteImageStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RemoteImageStore {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ImageStore for RemoteImageStore {
    async fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StoredImage, ImageStoreError> {
        let response = self
            .http
            .post(format!("{}/v1/images", self.base_url))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ImageStoreError::Rejected(format!("{status}: {body}")));
        }

        let reply: UploadReply = response.json().await?;
        Ok(StoredImage {
            url: reply.url,
            delete_id: reply.id,
        })
    }

    async fn delete(&self, delete_id: &str) -> Result<(), ImageStoreError> {
        let response = self
            .http
            .delete(format!("{}/v1/images/{}", self.base_url, delete_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImageStoreError::Rejected(response.status().to_string()));
        }
        Ok(())
    }
}
