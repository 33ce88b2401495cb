//! Per-user event fan-out.
//!
//! One `tokio::sync::broadcast` channel carries every event; subscribers
//! filter on their own user id. Events are fire-and-forget: emitting with no
//! subscriber is fine, and a subscriber that falls behind skips what it
//! missed.

use serde::Serialize;
use tokio::sync::broadcast;

use marketstall_core::UserId;

/// Emitted after a cart merge commits. Payload: the merged cart.
pub const CART_UPDATED: &str = "cart.updated";

const CHANNEL_CAPACITY: usize = 1024;

/// An event addressed to one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserEvent {
    #[serde(skip)]
    pub user_id: UserId,
    pub event: &'static str,
    pub payload: serde_json::Value,
}

/// Broadcast hub for user events.
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<UserEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Send `event` to every subscription of `user_id`.
    pub fn emit_to_user(&self, user_id: UserId, event: &'static str, payload: &impl Serialize) {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, event, "Failed to serialize event payload");
                return;
            }
        };

        let delivered = self
            .sender
            .send(UserEvent {
                user_id,
                event,
                payload,
            })
            .unwrap_or(0);
        tracing::debug!(user_id = %user_id, event, delivered, "Event emitted");
    }

    /// Subscribe to the events of one user.
    #[must_use]
    pub fn subscribe(&self, user_id: UserId) -> UserEvents {
        UserEvents {
            user_id,
            receiver: self.sender.subscribe(),
        }
    }
}

/// A subscription to one user's events.
pub struct UserEvents {
    user_id: UserId,
    receiver: broadcast::Receiver<UserEvent>,
}

impl UserEvents {
    /// Wait for the next event of this user. `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<UserEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.user_id == self.user_id => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %self.user_id, skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
