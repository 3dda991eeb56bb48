//! Title-similarity grouping: pairwise scoring over normalized titles,
//! then connected components via union-find.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::normalize::normalize_title;
use crate::similarity::SimilarityOracle;
use crate::TARGET_DEDUP;

use super::types::{Article, SimilarityPair, TitleGroup};

/// Disjoint-set forest with path compression and union by size.
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Unions the components of `x` and `y`; a same-root union is a no-op.
    pub fn union(&mut self, x: usize, y: usize) {
        let (root_x, root_y) = (self.find(x), self.find(y));
        if root_x == root_y {
            return;
        }
        let (big, small) = if self.size[root_x] >= self.size[root_y] {
            (root_x, root_y)
        } else {
            (root_y, root_x)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
    }
}

/// Clusters articles whose titles restate the same event.
///
/// Emits a [`SimilarityPair`] for every unordered index pair at or above
/// `title_threshold`, ascending by `(a, b)`, then unions the paired indices
/// into disjoint components. Indices that never appear in a qualifying pair
/// stay out of every group and pass through to assembly as kept singletons.
///
/// Groups are reported with ascending members, ordered by smallest member,
/// so discovery order is reproducible for a fixed matrix.
pub fn group_by_title(
    articles: &[Article],
    oracle: &dyn SimilarityOracle,
    title_threshold: f64,
) -> Result<(Vec<TitleGroup>, Vec<SimilarityPair>)> {
    let titles: Vec<String> = articles
        .iter()
        .map(|a| normalize_title(&a.title))
        .collect();
    let matrix = oracle.similarity_matrix(&titles)?;

    let mut pairs = Vec::new();
    for i in 0..articles.len() {
        for j in (i + 1)..articles.len() {
            let score = matrix.get(i, j);
            if score >= title_threshold {
                pairs.push(SimilarityPair { a: i, b: j, score });
            }
        }
    }

    let mut forest = UnionFind::new(articles.len());
    let mut in_pair = vec![false; articles.len()];
    for pair in &pairs {
        in_pair[pair.a] = true;
        in_pair[pair.b] = true;
        forest.union(pair.a, pair.b);
    }

    // Members land in ascending order because the scan is ascending; the
    // final sort puts groups in smallest-member order regardless of which
    // index ended up as the component root.
    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..articles.len() {
        if in_pair[index] {
            let root = forest.find(index);
            components.entry(root).or_default().push(index);
        }
    }

    let mut groups: Vec<TitleGroup> = components
        .into_values()
        .filter(|members| members.len() >= 2)
        .map(|members| TitleGroup { members })
        .collect();
    groups.sort_by_key(|g| g.members[0]);

    debug!(
        target: TARGET_DEDUP,
        articles = articles.len(),
        pairs = pairs.len(),
        groups = groups.len(),
        "title grouping complete"
    );
    Ok((groups, pairs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_find_components() {
        let mut forest = UnionFind::new(6);
        forest.union(0, 1);
        forest.union(1, 2);
        forest.union(4, 5);
        assert_eq!(forest.find(0), forest.find(2));
        assert_eq!(forest.find(4), forest.find(5));
        assert_ne!(forest.find(0), forest.find(4));
        assert_ne!(forest.find(3), forest.find(0));
    }

    #[test]
    fn same_root_union_is_noop() {
        let mut forest = UnionFind::new(3);
        forest.union(0, 1);
        let root = forest.find(0);
        forest.union(1, 0);
        assert_eq!(forest.find(0), root);
        assert_eq!(forest.find(1), root);
    }
}
