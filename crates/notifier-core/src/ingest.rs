//! The ingest queue between event producers and the dispatcher.
//!
//! Many producers, one consumer. Payloads are raw JSON values; decoding and
//! validation happen on the consumer side so a bad payload never fails a
//! producer. The queue is unbounded, so producers never wait on matching.

use serde_json::Value;
use tokio::sync::mpsc;

/// Errors raised when submitting to the ingest queue.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The dispatcher has stopped.
    #[error("ingest queue is closed")]
    Closed,
}

/// Producer handle. Clone one per producer.
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::UnboundedSender<Value>,
}

impl IngestSender {
    /// Enqueue one raw payload. FIFO per sender.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Closed`] if the receiver has been dropped.
    pub fn submit(&self, payload: Value) -> Result<(), IngestError> {
        if self.tx.send(payload).is_err() {
            return Err(IngestError::Closed);
        }
        Ok(())
    }

    /// Whether the receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer handle, owned by the dispatcher.
#[derive(Debug)]
pub struct IngestReceiver {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl IngestReceiver {
    /// Wait for the next payload; `None` once every sender is dropped and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

/// Create the ingest queue.
pub fn ingest_channel() -> (IngestSender, IngestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IngestSender { tx }, IngestReceiver { rx })
}
