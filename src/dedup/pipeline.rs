//! Per-key orchestration: load, group, select, assemble, audit, persist.

use std::path::PathBuf;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::config::{BatchKey, StorageLayout, Thresholds};
use crate::error::{DedupError, Result};
use crate::similarity::SimilarityOracle;
use crate::storage;
use crate::TARGET_DEDUP;

use super::{assemble, group_by_title, render_audit_log, select_representative};

/// Everything one invocation needs, passed explicitly; there is no
/// process-wide pipeline state.
#[derive(Debug, Clone)]
pub struct DedupRequest {
    pub key: BatchKey,
    pub thresholds: Thresholds,
}

/// Counts and artifact locations reported back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupSummary {
    pub category: String,
    pub period: String,
    pub date: String,
    pub total_count: usize,
    pub deduplicated_count: usize,
    pub related_count: usize,
    pub group_count: usize,
    pub dedup_file: PathBuf,
    pub related_file: PathBuf,
    pub log_file: PathBuf,
}

fn check_cancelled(cancel: &watch::Receiver<bool>) -> Result<()> {
    if *cancel.borrow() {
        return Err(DedupError::Cancelled);
    }
    Ok(())
}

/// Runs the whole dedup pipeline for one `(category, period, date)` key.
///
/// Groups are independent, so representative selection fans out across the
/// rayon pool; results are merged back in group-discovery order, keeping
/// the audit log and related-edge order reproducible regardless of which
/// worker finished first. Cancellation is honored at the oracle call and at
/// every group boundary. Any oracle failure aborts the run before artifacts
/// are written, so no partial per-group output is ever persisted.
///
/// Concurrent runs for the same key race at the storage boundary; admission
/// control belongs to the caller (see `crate::api`), not the engine.
pub fn run_dedup(
    request: &DedupRequest,
    layout: &StorageLayout,
    oracle: &dyn SimilarityOracle,
    cancel: &watch::Receiver<bool>,
) -> Result<DedupSummary> {
    let started = Instant::now();
    let key = &request.key;
    let thresholds = &request.thresholds;

    info!(
        target: TARGET_DEDUP,
        key = %key,
        backend = oracle.name(),
        title_threshold = thresholds.title,
        content_threshold = thresholds.content,
        related_min_threshold = thresholds.related_min,
        "dedup run starting"
    );

    let batch = storage::load_batch(&layout.input_file(key))?;

    check_cancelled(cancel)?;
    let (groups, pairs) = group_by_title(&batch.articles, oracle, thresholds.title)?;
    info!(
        target: TARGET_DEDUP,
        key = %key,
        pairs = pairs.len(),
        groups = groups.len(),
        "title grouping produced {} similar pairs",
        pairs.len()
    );

    let decisions = groups
        .par_iter()
        .map(|group| {
            check_cancelled(cancel)?;
            select_representative(group, &batch.articles, oracle, thresholds)
        })
        .collect::<Result<Vec<_>>>()?;

    let result = assemble(&batch.articles, &groups, &decisions);
    let audit = render_audit_log(&batch.articles, &groups, &decisions);

    check_cancelled(cancel)?;
    storage::ensure_output_dir(&layout.output_dir(key))?;
    let dedup_file = layout.dedup_file(key);
    let related_file = layout.related_file(key);
    let log_file = layout.log_file(key);
    storage::write_dedup_csv(&dedup_file, &batch, &result)?;
    storage::write_related_csv(&related_file, &result)?;
    storage::write_audit_log(&log_file, &audit)?;

    info!(
        target: TARGET_DEDUP,
        key = %key,
        total = batch.articles.len(),
        kept = result.kept.len(),
        related = result.related.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "dedup run finished"
    );

    Ok(DedupSummary {
        category: key.category.clone(),
        period: key.period.clone(),
        date: key.date.clone(),
        total_count: batch.articles.len(),
        deduplicated_count: result.kept.len(),
        related_count: result.related.len(),
        group_count: groups.len(),
        dedup_file,
        related_file,
        log_file,
    })
}
