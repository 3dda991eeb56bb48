//! CSV loading and artifact persistence at the pipeline boundary.
//!
//! Input rows keep all of their columns; the deduplicated output appends a
//! `dedup_state` column and drops removed rows. Related edges and the audit
//! log are written alongside. Output directories are created on demand.

use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::info;

use crate::dedup::{Article, ArticleId, ArticleState, DedupResult};
use crate::error::{DedupError, Result};
use crate::TARGET_STORAGE;

pub const TITLE_COLUMN: &str = "title";
pub const CONTENT_COLUMN: &str = "content";
pub const STABLE_ID_COLUMN: &str = "oid_aid";
pub const STATE_COLUMN: &str = "dedup_state";

/// One loaded input CSV: original headers and rows, plus the articles
/// extracted from them. Row order is load order and never changes.
#[derive(Debug)]
pub struct LoadedBatch {
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
    pub articles: Vec<Article>,
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn field(record: &StringRecord, index: Option<usize>) -> String {
    // Absent values normalize to the empty string, never to an error.
    index
        .and_then(|i| record.get(i))
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Loads the input CSV for one batch key.
///
/// A missing file is `NotFound` and nothing downstream runs. The `oid_aid`
/// column, when present and non-empty, becomes the article's stable id;
/// otherwise the zero-based row position stands in.
pub fn load_batch(path: &Path) -> Result<LoadedBatch> {
    if !path.exists() {
        return Err(DedupError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let title_at = column_index(&headers, TITLE_COLUMN);
    let content_at = column_index(&headers, CONTENT_COLUMN);
    let stable_at = column_index(&headers, STABLE_ID_COLUMN);

    let mut records = Vec::new();
    let mut articles = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let stable = field(&record, stable_at);
        let id = if stable.is_empty() {
            ArticleId::Row(index)
        } else {
            ArticleId::Stable(stable)
        };
        articles.push(Article {
            index,
            id,
            title: field(&record, title_at),
            content: field(&record, content_at),
        });
        records.push(record);
    }

    info!(
        target: TARGET_STORAGE,
        path = %path.display(),
        articles = articles.len(),
        "loaded input batch"
    );
    Ok(LoadedBatch {
        headers,
        records,
        articles,
    })
}

/// Writes the deduplicated CSV: every kept row with its original columns
/// plus the `dedup_state` column. Removed rows are never present.
pub fn write_dedup_csv(path: &Path, batch: &LoadedBatch, result: &DedupResult) -> Result<()> {
    let mut writer = WriterBuilder::new().flexible(true).from_path(path)?;

    let mut headers = batch.headers.clone();
    headers.push_field(STATE_COLUMN);
    writer.write_record(&headers)?;

    for &index in &result.kept {
        let mut record = batch.records[index].clone();
        record.push_field(result.states[index].as_str());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the related-edges CSV: `rep_id,related_id,similarity`, similarity
/// to four decimal places.
pub fn write_related_csv(path: &Path, result: &DedupResult) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    writer.write_record(["rep_id", "related_id", "similarity"])?;
    for edge in &result.related {
        writer.write_record([
            edge.rep.to_string(),
            edge.related.to_string(),
            format!("{:.4}", edge.similarity),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the UTF-8 audit log.
pub fn write_audit_log(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text)?;
    Ok(())
}

/// Creates the artifact directory if needed. Idempotent.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}
