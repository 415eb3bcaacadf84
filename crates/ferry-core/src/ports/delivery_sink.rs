//! DeliverySink port - the external durable queue.
//!
//! One call is one logical send. The coordinator never batches sends, even
//! though it drains the outbox in batches.

use async_trait::async_trait;

use crate::domain::DeliveryError;

/// Acknowledgement from the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Queue-assigned message id, when the transport provides one.
    pub message_id: Option<String>,
}

impl Ack {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            message_id: Some(id.into()),
        }
    }
}

/// Resolves `destination` to a physical address and sends `payload` verbatim.
///
/// Implementations classify failures; the caller applies its own timeout
/// around `send`.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, destination: &str, payload: &[u8]) -> Result<Ack, DeliveryError>;
}
