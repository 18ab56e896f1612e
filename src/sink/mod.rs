pub mod redis;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::Record;

pub use self::redis::RedisSink;

/// Destination for flushed batches.
///
/// Writes are dispatched from background tasks and may overlap: batch K+1
/// can be handed to `write` before the write of batch K has returned.
/// Implementations must tolerate that (or serialize internally) and are
/// responsible for bounding their own latency.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Persist one batch. Records are in submission order.
    async fn write(&self, batch: Vec<Record>) -> Result<()>;

    /// Short label used in log lines.
    fn name(&self) -> &str {
        "sink"
    }
}
