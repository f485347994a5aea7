//! Logbook Bulk Import
//!
//! Loads newline-delimited delta JSON into the point store, gated by the
//! same sampling encoder as live ingestion and written in batches.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use logbook_common::{Delta, Point, Result};
use logbook_timeseries::{PointStore, SamplingEncoder};
use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub lines: u64,
    pub deltas: u64,
    pub skipped: u64,
    pub points: u64,
    pub batches: u64,
}

/// Import a delta log file.
pub async fn import_file(
    path: &Path,
    encoder: &SamplingEncoder,
    store: &dyn PointStore,
    batch_size: usize,
) -> Result<ImportStats> {
    let file = tokio::fs::File::open(path).await?;
    tracing::info!(path = %path.display(), "importing delta log");
    import_deltas(BufReader::new(file), encoder, store, batch_size).await
}

/// Import deltas from any line-oriented reader. Blank lines are ignored and
/// malformed lines are logged and skipped; a failed batch write aborts.
pub async fn import_deltas<R>(
    reader: R,
    encoder: &SamplingEncoder,
    store: &dyn PointStore,
    batch_size: usize,
) -> Result<ImportStats>
where
    R: AsyncBufRead + Unpin,
{
    let batch_size = batch_size.max(1);
    let self_context = encoder.config().self_context.clone();
    let mut stats = ImportStats::default();
    let mut batch: Vec<Point> = Vec::with_capacity(batch_size);

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        stats.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut delta: Delta = match serde_json::from_str(line) {
            Ok(delta) => delta,
            Err(e) => {
                tracing::warn!(line = stats.lines, error = %e, "skipping malformed delta");
                stats.skipped += 1;
                continue;
            }
        };
        delta.normalize_context(&self_context);
        stats.deltas += 1;

        batch.extend(encoder.encode_delta(&delta));
        while batch.len() >= batch_size {
            let rest = batch.split_off(batch_size);
            flush(store, std::mem::replace(&mut batch, rest), &mut stats).await?;
        }
    }

    if !batch.is_empty() {
        flush(store, batch, &mut stats).await?;
    }

    tracing::info!(
        deltas = stats.deltas,
        points = stats.points,
        skipped = stats.skipped,
        "import complete"
    );
    Ok(stats)
}

async fn flush(store: &dyn PointStore, batch: Vec<Point>, stats: &mut ImportStats) -> Result<()> {
    let count = batch.len() as u64;
    store.write_points(batch).await?;
    stats.points += count;
    stats.batches += 1;
    Ok(())
}
