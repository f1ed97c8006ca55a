use std::collections::HashSet;

use serde::Serialize;

use super::{lookup, Link};
use crate::error::Result;
use crate::graph::Graph;

/// Referrers of an object, level by level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Owners {
    pub target: u64,
    /// `levels[0]` holds direct referrers of `target`; `levels[n]` holds the
    /// referrers of the objects first seen at level `n - 1`.
    pub levels: Vec<Vec<Link>>,
}

impl Owners {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Distinct owner addresses across all levels.
    pub fn count(&self) -> usize {
        self.levels
            .iter()
            .flatten()
            .map(|link| link.from)
            .collect::<HashSet<_>>()
            .len()
    }
}

impl Graph {
    /// Referrers of `address` up to `depth` extra levels up.
    ///
    /// Depth 0 reports only direct referrers. Each owner appears once, at the
    /// shallowest level it was found.
    pub fn owners(&self, address: u64, depth: usize) -> Result<Owners> {
        let target = lookup(self, address)?.address;
        let mut seen = HashSet::from([target]);
        let mut frontier = vec![target];
        let mut levels = Vec::new();

        for _ in 0..=depth {
            let mut level = Vec::new();
            let mut next = Vec::new();
            let mut found = HashSet::new();
            for &node in &frontier {
                for &referrer in self.referrers(node) {
                    if referrer == node {
                        continue;
                    }
                    if seen.insert(referrer) {
                        found.insert(referrer);
                        next.push(referrer);
                    } else if !found.contains(&referrer) {
                        continue;
                    }
                    level.push(Link::between(self, referrer, node));
                }
            }
            if level.is_empty() {
                break;
            }
            level.sort_unstable();
            level.dedup();
            levels.push(level);
            frontier = next;
        }

        Ok(Owners { target, levels })
    }
}
