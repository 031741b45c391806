//! Fan-out writes to peer connections.
//!
//! Each peer gets its own write future and all run concurrently, so a slow
//! or broken peer cannot hold up delivery to the others.

use std::sync::Arc;

use ballot_types::PeerAddress;
use futures_util::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// Shared write half of a peer connection.
pub type PeerWriter = Arc<Mutex<OwnedWriteHalf>>;

/// Outcome of a broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    pub sent: usize,
    pub failed: usize,
}

/// Write one already-delimited frame.
pub async fn write_frame(writer: &Mutex<OwnedWriteHalf>, frame: &[u8]) -> std::io::Result<()> {
    let mut w = writer.lock().await;
    w.write_all(frame).await?;
    w.flush().await?;
    Ok(())
}

/// Write `frame` to every target concurrently. Failures are logged and counted.
pub async fn broadcast_frame(targets: Vec<(PeerAddress, PeerWriter)>, frame: &[u8]) -> BroadcastResult {
    let writes = targets.into_iter().map(|(address, writer)| async move {
        let outcome = write_frame(&writer, frame).await;
        (address, outcome)
    });

    let mut result = BroadcastResult::default();
    for (address, outcome) in join_all(writes).await {
        match outcome {
            Ok(()) => result.sent += 1,
            Err(e) => {
                tracing::debug!(peer = %address, error = %e, "broadcast write failed");
                result.failed += 1;
            }
        }
    }
    result
}
