//! InMemorySink - delivery sink for development and tests.
//!
//! - one FIFO per destination holding delivered payloads
//! - scripted failures consumed one per send, plus an optional fallback
//!   failure applied when the script is empty
//! - optional set of known destinations; anything else fails permanently
//! - optional per-send latency (tokio time, so paused-clock tests work)

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DeliveryError;
use crate::ports::{Ack, DeliverySink};

#[derive(Default)]
struct SinkState {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    script: VecDeque<DeliveryError>,
    fallback: Option<DeliveryError>,
    known: Option<HashSet<String>>,
    attempts: u64,
}

/// # Usage
/// ```ignore
/// let sink = InMemorySink::new();
/// sink.push_failure(DeliveryError::transient("throttled"));
/// // first send fails, second lands in the "orders" queue
/// ```
#[derive(Clone, Default)]
pub struct InMemorySink {
    state: Arc<Mutex<SinkState>>,
    latency: Duration,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Restrict sends to these destinations.
    pub fn with_destinations<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().known = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Fail the next send that has no earlier scripted failure.
    pub fn push_failure(&self, err: DeliveryError) {
        self.lock().script.push_back(err);
    }

    /// Fail every send once the script is exhausted.
    pub fn fail_always(&self, err: DeliveryError) {
        self.lock().fallback = Some(err);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.script.clear();
        state.fallback = None;
    }

    /// Number of `send` calls, successful or not.
    pub fn send_count(&self) -> u64 {
        self.lock().attempts
    }

    /// Payloads delivered to `destination`, oldest first.
    pub fn delivered(&self, destination: &str) -> Vec<Vec<u8>> {
        self.lock()
            .queues
            .get(destination)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn delivered_total(&self) -> usize {
        self.lock().queues.values().map(VecDeque::len).sum()
    }

    /// Consume the oldest payload, like a queue consumer would.
    pub fn pop(&self, destination: &str) -> Option<Vec<u8>> {
        self.lock().queues.get_mut(destination)?.pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl DeliverySink for InMemorySink {
    async fn send(&self, destination: &str, payload: &[u8]) -> Result<Ack, DeliveryError> {
        self.lock().attempts += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        if let Some(known) = &state.known
            && !known.contains(destination)
        {
            return Err(DeliveryError::permanent(format!(
                "unknown destination '{destination}'"
            )));
        }
        if let Some(err) = state.script.pop_front() {
            return Err(err);
        }
        if let Some(err) = &state.fallback {
            return Err(err.clone());
        }

        let queue = state.queues.entry(destination.to_string()).or_default();
        queue.push_back(payload.to_vec());
        Ok(Ack::with_id(format!("{destination}-{}", queue.len())))
    }
}
