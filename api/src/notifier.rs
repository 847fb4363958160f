use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::dto::PostView;

/// Events pushed to connected feed listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum FeedEvent {
    #[serde(rename = "post.created")]
    PostCreated { post: PostView },
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("realtime notifier already initialized")]
    AlreadyInitialized,
    #[error("realtime notifier not initialized")]
    NotInitialized,
}

/// Handle on the process-wide broadcast channel. Cheap to clone; every
/// clone publishes into and subscribes from the same channel.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<FeedEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget delivery, at most once per connected listener.
    /// Zero listeners is not an error.
    pub fn publish(&self, event: FeedEvent) {
        let delivered = self.tx.send(event).unwrap_or(0);
        debug!("Broadcast feed event to {} listener(s)", delivered);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }
}

static NOTIFIER: OnceLock<Notifier> = OnceLock::new();

/// Initializes the process-wide notifier. Must run exactly once at
/// startup, before the router is built.
pub fn init(capacity: usize) -> Result<&'static Notifier, NotifierError> {
    NOTIFIER
        .set(Notifier::new(capacity))
        .map_err(|_| NotifierError::AlreadyInitialized)?;
    get()
}

/// Publishing before `init` is a configuration error, not a silent no-op.
pub fn get() -> Result<&'static Notifier, NotifierError> {
    NOTIFIER.get().ok_or(NotifierError::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::dto::CreatorView;

    fn event() -> FeedEvent {
        let now = Utc::now();
        FeedEvent::PostCreated {
            post: PostView {
                id: Uuid::new_v4(),
                title: "hello world".into(),
                content: "first post".into(),
                image_url: "http://localhost/images/a.png".into(),
                creator: CreatorView {
                    id: Uuid::new_v4(),
                    name: "Shem".into(),
                },
                created_at: now,
                updated_at: now,
            },
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish(event());

        let received = rx.recv().await.unwrap();
        let FeedEvent::PostCreated { post } = received;
        assert_eq!(post.title, "hello world");
    }

    #[tokio::test]
    async fn publish_without_listeners_is_fine() {
        let notifier = Notifier::new(8);
        notifier.publish(event());
    }

    #[test]
    fn event_wire_format_is_tagged() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["event"], "post.created");
        assert_eq!(json["post"]["title"], "hello world");
    }

    #[test]
    fn global_initializes_exactly_once() {
        // First init in this process wins; a second must fail.
        let first = init(4);
        match first {
            Ok(_) => {}
            // Another test in the same process may have gotten there first.
            Err(NotifierError::AlreadyInitialized) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert!(get().is_ok());
        assert!(matches!(init(4), Err(NotifierError::AlreadyInitialized)));
    }
}
