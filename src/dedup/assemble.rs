//! Merges per-group decisions and ungrouped singletons into the terminal
//! [`DedupResult`].

use tracing::info;

use crate::TARGET_DEDUP;

use super::types::{
    Article, ArticleState, DedupResult, RelatedEdge, RepresentativeDecision, TitleGroup,
};

/// Assembles the final kept set, related-edge list, and per-article state.
///
/// Every article starts `Kept`. Groups with a representative mark it
/// `Representative`, duplicates `Removed`, and linked members `Related`;
/// groups without one leave all members `Kept`, as do articles that never
/// entered a group. `kept` lists every non-removed index ascending; edges
/// are concatenated in group-processing order with indices resolved to
/// stable article ids, since row positions do not survive re-loads.
pub fn assemble(
    articles: &[Article],
    groups: &[TitleGroup],
    decisions: &[RepresentativeDecision],
) -> DedupResult {
    debug_assert_eq!(groups.len(), decisions.len());

    let mut states = vec![ArticleState::Kept; articles.len()];
    let mut related = Vec::new();

    for decision in decisions {
        let Some(representative) = decision.representative else {
            continue;
        };
        states[representative] = ArticleState::Representative;
        for &index in &decision.removed {
            states[index] = ArticleState::Removed;
        }
        for &(rep, member, score) in &decision.related {
            states[member] = ArticleState::Related;
            related.push(RelatedEdge {
                rep: articles[rep].id.clone(),
                related: articles[member].id.clone(),
                similarity: score,
            });
        }
    }

    let kept: Vec<usize> = (0..articles.len())
        .filter(|&i| states[i] != ArticleState::Removed)
        .collect();

    debug_assert_eq!(
        kept.len() + states.iter().filter(|s| **s == ArticleState::Removed).count(),
        articles.len()
    );

    info!(
        target: TARGET_DEDUP,
        total = articles.len(),
        kept = kept.len(),
        removed = articles.len() - kept.len(),
        related = related.len(),
        "assembly complete"
    );

    DedupResult {
        kept,
        related,
        states,
    }
}
