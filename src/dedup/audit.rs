//! Human-readable transcript of every group's decisions and similarity
//! evidence. Reporting only; the assembled result never depends on it.

use std::fmt::Write;

use super::types::{Article, ArticleState, RepresentativeDecision, TitleGroup};

const DELIMITER: &str = "=======================================================";

fn member_state(index: usize, decision: &RepresentativeDecision) -> ArticleState {
    match decision.representative {
        None => ArticleState::Kept,
        Some(rep) if rep == index => ArticleState::Representative,
        Some(_) => {
            if decision.removed.contains(&index) {
                ArticleState::Removed
            } else if decision.related.iter().any(|&(_, m, _)| m == index) {
                ArticleState::Related
            } else {
                ArticleState::Kept
            }
        }
    }
}

/// Renders one section per group, in discovery order: a delimiter, the group
/// size, each member's title annotated with its resolved marking, then the
/// raw similarity evidence captured during representative selection.
pub fn render_audit_log(
    articles: &[Article],
    groups: &[TitleGroup],
    decisions: &[RepresentativeDecision],
) -> String {
    let mut out = String::new();
    for (number, (group, decision)) in groups.iter().zip(decisions.iter()).enumerate() {
        writeln!(out, "{DELIMITER}").unwrap();
        writeln!(out, "[Group {} - {} articles]", number + 1, group.len()).unwrap();

        for &index in &group.members {
            writeln!(
                out,
                " - [{}] {}",
                member_state(index, decision),
                articles[index].title
            )
            .unwrap();
        }

        for line in &decision.evidence {
            writeln!(out, "{line}").unwrap();
        }
    }
    out
}
