use std::sync::Arc;

use crate::{images::ImageStore, notifier::Notifier, storage::DocumentStore};

/// Shared data across all requests. Cloned per handler invocation; the
/// notifier handle is set once at startup and only read afterwards.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub images: Arc<dyn ImageStore>,
    pub notifier: Notifier,
    pub jwt_secret: String,
    pub page_size: usize,
}
