//! Content-similarity representative selection and per-member
//! classification.

use tracing::debug;

use crate::config::Thresholds;
use crate::error::Result;
use crate::normalize::normalize_content;
use crate::similarity::SimilarityOracle;
use crate::TARGET_DEDUP;

use super::round_score;
use super::types::{Article, RepresentativeDecision, TitleGroup};

/// Picks the representative of one title group and classifies the rest.
///
/// The representative is the member with the highest mean content
/// similarity across the group (the unit diagonal is included in every row
/// mean, so the ranking is unaffected); exact ties break to the smallest
/// article index. Every other member is then classified against its
/// similarity `s` to the representative alone:
///
/// - `s >= thresholds.content` — removed, a true duplicate,
/// - `thresholds.related_min <= s < thresholds.content` — related,
/// - `s < thresholds.related_min` — kept as an independent article.
///
/// A single group may yield all three classes at once. When content
/// normalization produces no usable signal for any member, similarity is
/// undefined and the group is left untouched (`representative == None`).
pub fn select_representative(
    group: &TitleGroup,
    articles: &[Article],
    oracle: &dyn SimilarityOracle,
    thresholds: &Thresholds,
) -> Result<RepresentativeDecision> {
    let members = &group.members;
    if members.len() == 1 {
        return Ok(RepresentativeDecision::solo(members[0]));
    }

    let docs: Vec<String> = members
        .iter()
        .map(|&i| normalize_content(&articles[i].content))
        .collect();

    if docs.iter().all(|d| d.is_empty()) {
        debug!(
            target: TARGET_DEDUP,
            members = members.len(),
            "group content normalized to nothing; leaving group untouched"
        );
        return Ok(RepresentativeDecision::untouched(vec![format!(
            "Content similarity group: {:?} - no usable content, group retained as-is",
            members.iter().map(|&i| i + 1).collect::<Vec<_>>()
        )]));
    }

    let matrix = oracle.similarity_matrix(&docs)?;

    let mut evidence = Vec::new();
    evidence.push(format!(
        "Content similarity group: {:?}",
        members.iter().map(|&i| i + 1).collect::<Vec<_>>()
    ));
    for a in 0..members.len() {
        for b in (a + 1)..members.len() {
            evidence.push(format!(
                " - ({}, {}) content similarity: {:.4}",
                members[a] + 1,
                members[b] + 1,
                matrix.get(a, b)
            ));
            evidence.push(format!("   (1) {}", articles[members[a]].title));
            evidence.push(format!("   (2) {}", articles[members[b]].title));
        }
    }

    // Centrality: row mean over the matrix, members ascending, so the first
    // maximum is also the smallest article index on exact ties.
    let mut rep_pos = 0;
    let mut best_mean = f64::MIN;
    for pos in 0..members.len() {
        let mean: f64 = (0..members.len())
            .map(|other| matrix.get(pos, other))
            .sum::<f64>()
            / members.len() as f64;
        if mean > best_mean {
            best_mean = mean;
            rep_pos = pos;
        }
    }
    let representative = members[rep_pos];

    let mut removed = Vec::new();
    let mut related = Vec::new();
    for (pos, &member) in members.iter().enumerate() {
        if pos == rep_pos {
            continue;
        }
        let score = matrix.get(pos, rep_pos);
        if score >= thresholds.content {
            removed.push(member);
        } else if score >= thresholds.related_min {
            related.push((representative, member, round_score(score)));
        }
        // Below related_min the member simply stays kept.
    }

    debug!(
        target: TARGET_DEDUP,
        representative,
        removed = removed.len(),
        related = related.len(),
        kept = members.len() - 1 - removed.len() - related.len(),
        "representative selected"
    );

    Ok(RepresentativeDecision {
        representative: Some(representative),
        removed,
        related,
        evidence,
    })
}
