// Module declarations
pub mod assemble;
pub mod audit;
pub mod grouping;
pub mod pipeline;
pub mod select;
#[cfg(test)]
mod tests;
pub mod types;

pub use assemble::assemble;
pub use audit::render_audit_log;
pub use grouping::{group_by_title, UnionFind};
pub use pipeline::{run_dedup, DedupRequest, DedupSummary};
pub use select::select_representative;
pub use types::*;

/// Decimal places kept on related-edge similarity scores.
pub const SCORE_DECIMALS: u32 = 4;

/// Rounds a similarity score to [`SCORE_DECIMALS`] places, so the engine
/// result, the related CSV, and the audit log all carry the same value.
pub fn round_score(score: f64) -> f64 {
    let factor = 10f64.powi(SCORE_DECIMALS as i32);
    (score * factor).round() / factor
}
