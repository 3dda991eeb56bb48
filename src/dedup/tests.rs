use tokio::sync::watch;

use crate::config::{BatchKey, StorageLayout, Thresholds};
use crate::error::DedupError;
use crate::similarity::{SimilarityMatrix, SimilarityOracle, TfIdfOracle};

use super::*;

/// Oracle returning a fixed matrix, for exercising the engine against
/// hand-written similarity evidence.
struct StubOracle {
    matrix: SimilarityMatrix,
}

impl StubOracle {
    fn from_pairs(n: usize, pairs: &[(usize, usize, f64)]) -> Self {
        Self {
            matrix: SimilarityMatrix::from_pairs(n, pairs),
        }
    }
}

impl SimilarityOracle for StubOracle {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn similarity_matrix(&self, docs: &[String]) -> crate::error::Result<SimilarityMatrix> {
        assert_eq!(docs.len(), self.matrix.len(), "stub matrix size mismatch");
        Ok(self.matrix.clone())
    }
}

struct FailingOracle;

impl SimilarityOracle for FailingOracle {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn similarity_matrix(&self, _docs: &[String]) -> crate::error::Result<SimilarityMatrix> {
        Err(DedupError::Compute("backend unavailable".into()))
    }
}

fn articles(n: usize) -> Vec<Article> {
    (0..n)
        .map(|i| Article {
            index: i,
            id: ArticleId::Row(i),
            title: format!("headline number {i}"),
            content: format!("body text number {i}"),
        })
        .collect()
}

fn thresholds() -> Thresholds {
    Thresholds::default()
}

#[test]
fn near_duplicate_titles_form_one_group() {
    let articles = articles(3);
    let oracle = StubOracle::from_pairs(3, &[(0, 1, 0.9), (0, 2, 0.1), (1, 2, 0.15)]);

    let (groups, pairs) = group_by_title(&articles, &oracle, 0.5).unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members, vec![0, 1]);
    assert_eq!(pairs.len(), 1);
    assert_eq!((pairs[0].a, pairs[0].b), (0, 1));

    // Article 2 never entered a group and stays kept.
    let decisions = vec![RepresentativeDecision::solo(0)];
    let result = assemble(&articles, &groups, &decisions);
    assert_eq!(result.states[2], ArticleState::Kept);
}

#[test]
fn pairs_are_ascending_and_title_threshold_is_monotone() {
    let articles = articles(4);
    let scores = [
        (0, 1, 0.9),
        (0, 2, 0.6),
        (0, 3, 0.4),
        (1, 2, 0.35),
        (2, 3, 0.8),
    ];
    let oracle = StubOracle::from_pairs(4, &scores);

    let (_, loose) = group_by_title(&articles, &oracle, 0.3).unwrap();
    let (_, mid) = group_by_title(&articles, &oracle, 0.5).unwrap();
    let (_, strict) = group_by_title(&articles, &oracle, 0.85).unwrap();

    assert!(loose.len() >= mid.len() && mid.len() >= strict.len());
    assert_eq!(loose.len(), 5);
    assert_eq!(strict.len(), 1);

    for window in loose.windows(2) {
        assert!((window[0].a, window[0].b) < (window[1].a, window[1].b));
    }
}

#[test]
fn transitive_pairs_form_one_component() {
    let articles = articles(5);
    let oracle = StubOracle::from_pairs(5, &[(0, 1, 0.9), (1, 2, 0.9), (3, 4, 0.9)]);

    let (groups, _) = group_by_title(&articles, &oracle, 0.5).unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].members, vec![0, 1, 2]);
    assert_eq!(groups[1].members, vec![3, 4]);
}

#[test]
fn singleton_group_is_its_own_representative() {
    let articles = articles(3);
    let group = TitleGroup { members: vec![2] };

    let decision =
        select_representative(&group, &articles, &FailingOracle, &thresholds()).unwrap();

    assert_eq!(decision.representative, Some(2));
    assert!(decision.removed.is_empty());
    assert!(decision.related.is_empty());
    assert!(decision.evidence.is_empty());
}

#[test]
fn duplicate_member_is_removed() {
    let articles = articles(2);
    let group = TitleGroup {
        members: vec![0, 1],
    };
    let oracle = StubOracle::from_pairs(2, &[(0, 1, 0.85)]);

    let decision = select_representative(&group, &articles, &oracle, &thresholds()).unwrap();

    assert_eq!(decision.representative, Some(0));
    assert_eq!(decision.removed, vec![1]);
    assert!(decision.related.is_empty());
}

#[test]
fn mid_similarity_member_is_related() {
    let articles = articles(2);
    let group = TitleGroup {
        members: vec![0, 1],
    };
    let oracle = StubOracle::from_pairs(2, &[(0, 1, 0.55)]);

    let decision = select_representative(&group, &articles, &oracle, &thresholds()).unwrap();

    assert_eq!(decision.representative, Some(0));
    assert!(decision.removed.is_empty());
    assert_eq!(decision.related, vec![(0, 1, 0.55)]);
}

#[test]
fn low_similarity_member_stays_kept_despite_grouping() {
    let articles = articles(2);
    let group = TitleGroup {
        members: vec![0, 1],
    };
    let oracle = StubOracle::from_pairs(2, &[(0, 1, 0.2)]);

    let decision = select_representative(&group, &articles, &oracle, &thresholds()).unwrap();
    let result = assemble(
        &articles,
        &[group],
        std::slice::from_ref(&decision),
    );

    assert_eq!(decision.representative, Some(0));
    assert!(decision.related.is_empty());
    assert_eq!(result.states[1], ArticleState::Kept);
    assert!(result.related.is_empty());
}

#[test]
fn one_group_can_yield_all_three_classes() {
    let articles = articles(4);
    let group = TitleGroup {
        members: vec![0, 1, 2, 3],
    };
    // Member 0 is the most central row; 1 duplicates it, 2 is adjacent,
    // 3 only ever matched on the title.
    let oracle = StubOracle::from_pairs(
        4,
        &[
            (0, 1, 0.9),
            (0, 2, 0.6),
            (0, 3, 0.2),
            (1, 2, 0.5),
            (1, 3, 0.1),
            (2, 3, 0.1),
        ],
    );

    let decision = select_representative(&group, &articles, &oracle, &thresholds()).unwrap();

    assert_eq!(decision.representative, Some(0));
    assert_eq!(decision.removed, vec![1]);
    assert_eq!(decision.related, vec![(0, 2, 0.6)]);

    let result = assemble(
        &articles,
        &[group],
        std::slice::from_ref(&decision),
    );
    assert_eq!(
        result.states,
        vec![
            ArticleState::Representative,
            ArticleState::Removed,
            ArticleState::Related,
            ArticleState::Kept,
        ]
    );
    assert_eq!(result.kept, vec![0, 2, 3]);
}

#[test]
fn exact_centrality_tie_breaks_to_smallest_index() {
    let articles = articles(5);
    let group = TitleGroup {
        members: vec![1, 2, 3],
    };
    // Fully symmetric similarities: every row mean is identical.
    let oracle = StubOracle::from_pairs(3, &[(0, 1, 0.5), (0, 2, 0.5), (1, 2, 0.5)]);

    let decision = select_representative(&group, &articles, &oracle, &thresholds()).unwrap();

    assert_eq!(decision.representative, Some(1));
}

#[test]
fn empty_content_group_is_left_untouched() {
    let mut articles = articles(3);
    for article in &mut articles {
        article.content = "12 34 !!".to_string();
    }
    let group = TitleGroup {
        members: vec![0, 1, 2],
    };

    let decision =
        select_representative(&group, &articles, &FailingOracle, &thresholds()).unwrap();
    let result = assemble(
        &articles,
        &[group],
        std::slice::from_ref(&decision),
    );

    assert_eq!(decision.representative, None);
    assert!(result.states.iter().all(|s| *s == ArticleState::Kept));
    assert_eq!(result.kept, vec![0, 1, 2]);
}

#[test]
fn related_scores_are_rounded_to_four_decimals() {
    let articles = articles(2);
    let group = TitleGroup {
        members: vec![0, 1],
    };
    let oracle = StubOracle::from_pairs(2, &[(0, 1, 0.555_549)]);

    let decision = select_representative(&group, &articles, &oracle, &thresholds()).unwrap();

    assert_eq!(decision.related, vec![(0, 1, 0.5555)]);
}

#[test]
fn assembly_resolves_stable_identifiers() {
    let mut articles = articles(3);
    articles[0].id = ArticleId::Stable("100-555".into());
    articles[2].id = ArticleId::Stable("100-777".into());

    let groups = vec![TitleGroup {
        members: vec![0, 2],
    }];
    let decisions = vec![RepresentativeDecision {
        representative: Some(0),
        removed: vec![],
        related: vec![(0, 2, 0.61)],
        evidence: vec![],
    }];

    let result = assemble(&articles, &groups, &decisions);

    assert_eq!(result.related.len(), 1);
    assert_eq!(result.related[0].rep, ArticleId::Stable("100-555".into()));
    assert_eq!(result.related[0].related, ArticleId::Stable("100-777".into()));
}

#[test]
fn every_article_gets_exactly_one_state() {
    let articles = articles(6);
    let oracle = StubOracle::from_pairs(6, &[(0, 1, 0.9), (3, 4, 0.7)]);
    let (groups, _) = group_by_title(&articles, &oracle, 0.5).unwrap();

    let content = StubOracle::from_pairs(2, &[(0, 1, 0.85)]);
    let decisions: Vec<_> = groups
        .iter()
        .map(|g| select_representative(g, &articles, &content, &thresholds()).unwrap())
        .collect();
    let result = assemble(&articles, &groups, &decisions);

    assert_eq!(result.states.len(), articles.len());
    assert_eq!(
        result.kept.len() + result.removed_count(),
        articles.len()
    );
    // kept is ascending and removed rows are excluded
    assert!(result.kept.windows(2).all(|w| w[0] < w[1]));
    for &index in &result.kept {
        assert_ne!(result.states[index], ArticleState::Removed);
    }
}

#[test]
fn content_threshold_is_monotone_on_removed_count() {
    let articles = articles(3);
    let group = TitleGroup {
        members: vec![0, 1, 2],
    };
    let oracle = StubOracle::from_pairs(3, &[(0, 1, 0.85), (0, 2, 0.7), (1, 2, 0.6)]);

    let removed_at = |content: f64| {
        let t = Thresholds {
            title: 0.3,
            content,
            related_min: 0.4,
        };
        select_representative(&group, &articles, &oracle, &t)
            .unwrap()
            .removed
            .len()
    };

    assert!(removed_at(0.6) >= removed_at(0.8));
    assert!(removed_at(0.8) >= removed_at(0.95));
}

#[test]
fn repeated_runs_are_identical() {
    let articles = articles(5);
    let title = StubOracle::from_pairs(5, &[(0, 1, 0.9), (1, 2, 0.6), (3, 4, 0.5)]);
    let content = StubOracle::from_pairs(3, &[(0, 1, 0.9), (0, 2, 0.5), (1, 2, 0.5)]);
    let content_small = StubOracle::from_pairs(2, &[(0, 1, 0.5)]);

    let run = || {
        let (groups, _) = group_by_title(&articles, &title, 0.5).unwrap();
        let decisions: Vec<_> = groups
            .iter()
            .map(|g| {
                let oracle: &dyn SimilarityOracle = if g.len() == 3 {
                    &content
                } else {
                    &content_small
                };
                select_representative(g, &articles, oracle, &thresholds()).unwrap()
            })
            .collect();
        assemble(&articles, &groups, &decisions)
    };

    let first = run();
    let second = run();
    assert_eq!(first.kept, second.kept);
    assert_eq!(first.states, second.states);
    assert_eq!(first.related, second.related);
}

#[test]
fn oracle_failure_aborts_grouping() {
    let articles = articles(3);
    let err = group_by_title(&articles, &FailingOracle, 0.5).unwrap_err();
    assert!(matches!(err, DedupError::Compute(_)));
}

#[test]
fn audit_log_reports_groups_and_evidence() {
    let articles = articles(3);
    let group = TitleGroup {
        members: vec![0, 1],
    };
    let oracle = StubOracle::from_pairs(2, &[(0, 1, 0.85)]);
    let decision = select_representative(&group, &articles, &oracle, &thresholds()).unwrap();

    let log = render_audit_log(&articles, &[group], &[decision]);

    assert!(log.contains("[Group 1 - 2 articles]"));
    assert!(log.contains(" - [REPRESENTATIVE] headline number 0"));
    assert!(log.contains(" - [REMOVED] headline number 1"));
    assert!(log.contains("content similarity: 0.8500"));
    // The ungrouped article never shows up.
    assert!(!log.contains("headline number 2"));
}

fn write_sample_input(layout: &StorageLayout, key: &BatchKey) {
    let input = layout.input_file(key);
    std::fs::create_dir_all(input.parent().unwrap()).unwrap();
    std::fs::write(
        &input,
        "oid_aid,title,content\n\
         010-1,Central bank raises rates,The central bank raised interest rates sharply citing inflation pressure\n\
         010-2,Central bank raises rates again,The central bank raised interest rates sharply citing inflation pressure\n\
         010-3,Local team wins championship,The local team won the championship after a dramatic final match\n",
    )
    .unwrap();
}

#[test]
fn pipeline_end_to_end_with_lexical_backend() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let key = BatchKey {
        category: "economy".into(),
        period: "am".into(),
        date: "2026-08-07".into(),
    };
    write_sample_input(&layout, &key);

    let request = DedupRequest {
        key: key.clone(),
        thresholds: thresholds(),
    };
    let (_tx, cancel) = watch::channel(false);
    let summary = run_dedup(&request, &layout, &TfIdfOracle, &cancel).unwrap();

    assert_eq!(summary.total_count, 3);
    assert_eq!(summary.deduplicated_count, 2);
    assert_eq!(summary.group_count, 1);
    assert!(summary.dedup_file.exists());
    assert!(summary.related_file.exists());
    assert!(summary.log_file.exists());

    let dedup = std::fs::read_to_string(&summary.dedup_file).unwrap();
    assert!(dedup.contains("010-1"));
    assert!(!dedup.contains("010-2"));
    assert!(dedup.contains("010-3"));
}

#[test]
fn pipeline_missing_input_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let key = BatchKey {
        category: "economy".into(),
        period: "pm".into(),
        date: "2026-08-07".into(),
    };

    let request = DedupRequest {
        key: key.clone(),
        thresholds: thresholds(),
    };
    let (_tx, cancel) = watch::channel(false);
    let err = run_dedup(&request, &layout, &TfIdfOracle, &cancel).unwrap_err();

    assert!(matches!(err, DedupError::NotFound { .. }));
    assert!(!layout.output_dir(&key).exists());
}

#[test]
fn pipeline_honors_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let key = BatchKey {
        category: "economy".into(),
        period: "am".into(),
        date: "2026-08-07".into(),
    };
    write_sample_input(&layout, &key);

    let request = DedupRequest {
        key: key.clone(),
        thresholds: thresholds(),
    };
    let (tx, cancel) = watch::channel(true);
    let err = run_dedup(&request, &layout, &TfIdfOracle, &cancel).unwrap_err();
    drop(tx);

    assert!(matches!(err, DedupError::Cancelled));
    assert!(!layout.output_dir(&key).exists());
}
