//! Graceful shutdown signalling.
//!
//! A single [`ShutdownTx`] can stop any number of pipelines. Pipelines only check the
//! signal between batches, so a batch that has started is always written and
//! checkpointed before the pipeline stops.

use tokio::sync::watch;

/// Receiver side of the shutdown channel. `true` once shutdown was requested.
pub type ShutdownRx = watch::Receiver<bool>;

/// Sender side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests shutdown of every subscribed receiver.
    pub fn shutdown(&self) {
        // Sending only fails when every receiver is gone, which means nothing is left to stop.
        let _ = self.0.send(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel in the running state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), rx)
}

/// Returns `true` if shutdown was requested on `rx`.
pub fn is_shutdown_requested(rx: &ShutdownRx) -> bool {
    *rx.borrow()
}

/// Resolves once shutdown is requested or the sender is dropped.
pub async fn wait_for_shutdown(rx: &mut ShutdownRx) {
    // A dropped sender can never request shutdown again, so treat it as a request.
    let _ = rx.wait_for(|requested| *requested).await;
}
