use anyhow::{ensure, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::UnknownVariant;

/// How title groups and body groups combine into clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Title OR body similarity links articles, transitively
    #[default]
    Or,
    /// Articles share a cluster only when they share both a title and a body group
    And,
}

impl FromStr for MergeMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "or" => Ok(MergeMode::Or),
            "and" => Ok(MergeMode::And),
            _ => Err(UnknownVariant {
                kind: "merge mode",
                value: s.to_string(),
                expected: "or, and",
            }),
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeMode::Or => write!(f, "or"),
            MergeMode::And => write!(f, "and"),
        }
    }
}

/// Disjoint sets over `0..len` with path compression.
#[derive(Debug)]
pub struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Assigns dense ids in order of first appearance.
fn dense_labels<K: std::hash::Hash + Eq>(keys: impl Iterator<Item = K>) -> Vec<usize> {
    let mut seen: HashMap<K, usize> = HashMap::new();
    keys.map(|key| {
        let next = seen.len();
        *seen.entry(key).or_insert(next)
    })
    .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterMerger {
    mode: MergeMode,
}

impl ClusterMerger {
    pub fn new(mode: MergeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Returns one cluster id per article, numbered from 0 by first appearance.
    pub fn merge(&self, title_groups: &[usize], body_groups: &[usize]) -> Result<Vec<usize>> {
        ensure!(
            title_groups.len() == body_groups.len(),
            "title groups ({}) and body groups ({}) must cover the same articles",
            title_groups.len(),
            body_groups.len()
        );

        match self.mode {
            MergeMode::Or => {
                let n = title_groups.len();
                let mut uf = UnionFind::new(n);
                for groups in [title_groups, body_groups] {
                    let mut first_member: HashMap<usize, usize> = HashMap::new();
                    for (index, group) in groups.iter().enumerate() {
                        match first_member.get(group) {
                            Some(&first) => uf.union(first, index),
                            None => {
                                first_member.insert(*group, index);
                            }
                        }
                    }
                }
                let roots: Vec<usize> = (0..n).map(|i| uf.find(i)).collect();
                Ok(dense_labels(roots.into_iter()))
            }
            MergeMode::And => Ok(dense_labels(
                title_groups.iter().copied().zip(body_groups.iter().copied()),
            )),
        }
    }
}
