use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::Sink;
use crate::error::{RelayError, Result};
use crate::record::Record;

/// Appends batches to a Redis list named after the series.
///
/// `ConnectionManager` is cheaply cloneable and multiplexes every clone over
/// one TCP connection, so concurrent writes need no extra locking.
#[derive(Clone)]
pub struct RedisSink {
    conn: ConnectionManager,
    series: String,
    max_len: Option<usize>,
}

impl RedisSink {
    /// Opens a `ConnectionManager` that auto-reconnects on failure.
    pub async fn connect(
        url: &str,
        series: impl Into<String>,
        max_len: Option<usize>,
    ) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(conn, series, max_len))
    }

    pub fn from_connection(
        conn: ConnectionManager,
        series: impl Into<String>,
        max_len: Option<usize>,
    ) -> Self {
        Self {
            conn,
            series: series.into(),
            max_len,
        }
    }

    pub fn series(&self) -> &str {
        &self.series
    }
}

/// One atomic pipeline: RPUSH the whole batch, then optionally LTRIM so the
/// list keeps only the newest `max_len` entries.
fn build_pipeline(
    series: &str,
    batch: &[Record],
    max_len: Option<usize>,
) -> Result<redis::Pipeline> {
    let mut rows = Vec::with_capacity(batch.len());
    for record in batch {
        rows.push(serde_json::to_string(record)?);
    }

    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe.cmd("RPUSH").arg(series).arg(rows).ignore();
    if let Some(max) = max_len.filter(|m| *m > 0) {
        let start = -(i64::try_from(max).unwrap_or(i64::MAX));
        pipe.cmd("LTRIM").arg(series).arg(start).arg(-1).ignore();
    }
    Ok(pipe)
}

#[async_trait]
impl Sink for RedisSink {
    async fn write(&self, batch: Vec<Record>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let pipe = build_pipeline(&self.series, &batch, self.max_len)?;
        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| RelayError::SinkWrite(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(url: &str) -> Record {
        Record::new(Duration::from_millis(1), 200, url, "GET")
    }

    #[test]
    fn pipeline_pushes_whole_batch_in_one_command() {
        let batch = vec![record("/a"), record("/b")];
        let pipe = build_pipeline("resp_time", &batch, None).unwrap();
        let packed = String::from_utf8_lossy(&pipe.get_packed_pipeline()).to_string();

        assert!(packed.contains("RPUSH"));
        assert!(packed.contains("resp_time"));
        assert!(packed.contains("\"/a\""));
        assert!(packed.contains("\"/b\""));
        assert!(!packed.contains("LTRIM"));
    }

    #[test]
    fn pipeline_trims_when_capped() {
        let batch = vec![record("/a")];
        let pipe = build_pipeline("resp_time", &batch, Some(1_000)).unwrap();
        let packed = String::from_utf8_lossy(&pipe.get_packed_pipeline()).to_string();

        assert!(packed.contains("LTRIM"));
        assert!(packed.contains("-1000"));
    }
}
