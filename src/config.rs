use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::environment::{get_env_var_as_vec, get_env_var_or};

pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.3;
pub const DEFAULT_CONTENT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_RELATED_MIN_THRESHOLD: f64 = 0.4;

/// Similarity cutoffs for one dedup invocation. Passed explicitly into the
/// pipeline; there is no process-wide threshold state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum title similarity for two articles to land in the same group.
    pub title: f64,
    /// Content similarity at or above which a member is a true duplicate.
    pub content: f64,
    /// Content similarity at or above which a non-duplicate member is still
    /// linked to the representative.
    pub related_min: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_THRESHOLD,
            content: DEFAULT_CONTENT_THRESHOLD,
            related_min: DEFAULT_RELATED_MIN_THRESHOLD,
        }
    }
}

/// The `(category, period, date)` key identifying one scraped batch.
/// `period` is `am` or `pm`; `date` is `YYYY-MM-DD`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchKey {
    pub category: String,
    pub period: String,
    pub date: String,
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.category, self.period, self.date)
    }
}

/// Directory layout for scraped inputs and dedup artifacts.
///
/// Inputs live under `{base}/{period}/{date}_{period}/detail/`, artifacts
/// under `{base}/{period}/{date}_{period}/deduplicated-related/`.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    base: PathBuf,
}

impl StorageLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Builds the layout from `DEDUP_BASE_DIR`, defaulting to `./storage`.
    pub fn from_env() -> Self {
        Self::new(get_env_var_or("DEDUP_BASE_DIR", "./storage"))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn date_dir(&self, key: &BatchKey) -> PathBuf {
        self.base
            .join(&key.period)
            .join(format!("{}_{}", key.date, key.period))
    }

    pub fn input_file(&self, key: &BatchKey) -> PathBuf {
        self.date_dir(key).join("detail").join(format!(
            "news_{}_{}_detailed.csv",
            key.category, key.period
        ))
    }

    pub fn output_dir(&self, key: &BatchKey) -> PathBuf {
        self.date_dir(key).join("deduplicated-related")
    }

    pub fn dedup_file(&self, key: &BatchKey) -> PathBuf {
        self.output_dir(key).join(format!(
            "deduplicated_{}_{}_{}.csv",
            key.category, key.date, key.period
        ))
    }

    pub fn related_file(&self, key: &BatchKey) -> PathBuf {
        self.output_dir(key).join(format!(
            "related_{}_{}_{}.csv",
            key.category, key.date, key.period
        ))
    }

    pub fn log_file(&self, key: &BatchKey) -> PathBuf {
        self.output_dir(key).join(format!(
            "logs_{}_{}_{}.txt",
            key.category, key.date, key.period
        ))
    }
}

/// Categories to process in batch mode, from `CATEGORIES` (`;`-separated).
pub fn configured_categories() -> Vec<String> {
    get_env_var_as_vec("CATEGORIES", ';')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_follow_key() {
        let layout = StorageLayout::new("/data");
        let key = BatchKey {
            category: "politics".into(),
            period: "am".into(),
            date: "2026-08-07".into(),
        };
        assert_eq!(
            layout.input_file(&key),
            PathBuf::from("/data/am/2026-08-07_am/detail/news_politics_am_detailed.csv")
        );
        assert_eq!(
            layout.dedup_file(&key),
            PathBuf::from(
                "/data/am/2026-08-07_am/deduplicated-related/deduplicated_politics_2026-08-07_am.csv"
            )
        );
        assert_eq!(
            layout.related_file(&key),
            PathBuf::from(
                "/data/am/2026-08-07_am/deduplicated-related/related_politics_2026-08-07_am.csv"
            )
        );
        assert_eq!(
            layout.log_file(&key),
            PathBuf::from(
                "/data/am/2026-08-07_am/deduplicated-related/logs_politics_2026-08-07_am.txt"
            )
        );
    }

    #[test]
    fn default_thresholds() {
        let t = Thresholds::default();
        assert_eq!(t.title, 0.3);
        assert_eq!(t.content, 0.8);
        assert_eq!(t.related_min, 0.4);
    }
}
