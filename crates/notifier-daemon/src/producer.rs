//! JSON-lines producer feeding the ingest queue.
//!
//! Each non-blank line is one webhook payload. Lines that are not JSON are
//! logged and skipped here; everything else is left for the dispatcher to
//! validate.

use notifier_core::ingest::IngestSender;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::error::DaemonError;

/// What a producer did before its input ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Payloads submitted.
    pub submitted: u64,
    /// Lines that were not JSON.
    pub rejected: u64,
}

/// Forward every line of `reader` until end of input or until the ingest
/// queue closes. Dropping `ingest` on return lets the dispatcher finish.
///
/// # Errors
///
/// Returns [`DaemonError::Io`] if reading fails.
pub async fn forward_lines<R: AsyncBufRead + Unpin>(
    reader: R,
    ingest: IngestSender,
) -> Result<ProducerStats, DaemonError> {
    let mut stats = ProducerStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0_u64;

    while let Some(line) = lines.next_line().await? {
        line_no = line_no.saturating_add(1);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let payload = match serde_json::from_str(line) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(line = line_no, error = %e, "input line is not JSON, skipping");
                stats.rejected = stats.rejected.saturating_add(1);
                continue;
            }
        };
        if ingest.submit(payload).is_err() {
            debug!("ingest queue closed, producer stopping");
            break;
        }
        stats.submitted = stats.submitted.saturating_add(1);
    }
    drop(ingest);

    info!(
        submitted = stats.submitted,
        rejected = stats.rejected,
        "input exhausted"
    );
    Ok(stats)
}
