use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use super::{lookup, Link};
use crate::error::Result;
use crate::graph::{Graph, Root};

/// A root keeping an object alive and the shortest path from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anchor<'g> {
    pub root: &'g Root,
    /// Links from the root's object down to the queried object; empty when the
    /// root points at it directly.
    pub chain: Vec<Link>,
}

impl Graph {
    /// Roots that transitively keep the object at `address` alive.
    ///
    /// Walks reverse edges breadth-first and stops at every object a root
    /// points to, so each chain is a shortest one. An unreachable object
    /// yields an empty list.
    pub fn anchors(&self, address: u64) -> Result<Vec<Anchor<'_>>> {
        let start = lookup(self, address)?.address;

        // node -> the neighbour one step closer to `start`
        let mut toward: HashMap<u64, u64> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        toward.insert(start, start);

        let mut anchors = Vec::new();
        while let Some(node) = queue.pop_front() {
            if self.is_rooted(node) {
                let chain = self.chain_from(node, start, &toward);
                anchors.extend(self.roots_of(node).map(|root| Anchor {
                    root,
                    chain: chain.clone(),
                }));
                continue;
            }
            for &referrer in self.referrers(node) {
                if !toward.contains_key(&referrer) {
                    toward.insert(referrer, node);
                    queue.push_back(referrer);
                }
            }
        }

        tracing::debug!(
            address = format_args!("{start:#x}"),
            anchors = anchors.len(),
            visited = toward.len(),
            "Anchors resolved"
        );
        Ok(anchors)
    }

    fn chain_from(&self, mut node: u64, start: u64, toward: &HashMap<u64, u64>) -> Vec<Link> {
        let mut chain = Vec::new();
        while node != start {
            let Some(&next) = toward.get(&node) else {
                break;
            };
            chain.push(Link::between(self, node, next));
            node = next;
        }
        chain
    }
}
