//! Fixed-delay scheduler around a `PublisherLoop`.
//!
//! The next tick is scheduled after the previous cycle finished, so a slow
//! batch never overlaps the next tick of the same instance.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::publisher_loop::PublisherLoop;

/// Running scheduler task.
/// - `shutdown` stops new cycles, waits for the in-flight one up to a
///   deadline, then releases the lock
/// - dropping the handle without `shutdown` also stops the task after the
///   current cycle, but leaves the lock to expire
pub struct PublisherHandle {
    publisher: Arc<PublisherLoop>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PublisherHandle {
    /// Start ticking. The first cycle runs immediately.
    pub fn spawn(publisher: Arc<PublisherLoop>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run(Arc::clone(&publisher), shutdown_rx));
        Self {
            publisher,
            shutdown_tx,
            join,
        }
    }

    pub fn publisher(&self) -> &Arc<PublisherLoop> {
        &self.publisher
    }

    /// Stop taking new ticks without waiting.
    pub fn request_shutdown(&self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop, wait at most `deadline` for the current cycle, then release the
    /// lock. Entries abandoned by a forced stop stay PENDING.
    pub async fn shutdown(self, deadline: Duration) {
        self.request_shutdown();

        let mut join = self.join;
        match tokio::time::timeout(deadline, &mut join).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "publisher task ended abnormally"),
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "cycle still running at shutdown deadline, abandoning it"
                );
                join.abort();
                let _ = join.await;
            }
        }

        if let Err(e) = self.publisher.release().await {
            warn!(error = %e, "could not release lock, it will expire on its own");
        }
        info!("publisher stopped");
    }
}

async fn run(publisher: Arc<PublisherLoop>, mut shutdown_rx: watch::Receiver<bool>) {
    let interval = publisher.config().poll_interval;
    info!(
        lock = %publisher.config().lock_name,
        instance = %publisher.lock().owner(),
        poll_interval_ms = interval.as_millis() as u64,
        "publisher started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // storage failures are logged inside the loop; next tick starts over
        let _ = publisher.run_cycle().await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
