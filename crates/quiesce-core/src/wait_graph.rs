//! Wait-for graph used by the lock manager to detect deadlocks.
//!
//! Every session blocked on a lock contributes edges `waiter → holder` to
//! each session whose granted lock keeps it waiting. A path from a session
//! back to itself means nobody on that path can make progress.

use crate::types::SessionId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct WaitForGraph {
    /// Adjacency list: waiter → sessions it is waiting on.
    edges: HashMap<SessionId, HashSet<SessionId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of sessions `waiter` is blocked by.
    pub fn set_waits(&mut self, waiter: SessionId, holders: impl IntoIterator<Item = SessionId>) {
        let holders: HashSet<SessionId> = holders.into_iter().filter(|h| *h != waiter).collect();
        if holders.is_empty() {
            self.edges.remove(&waiter);
        } else {
            self.edges.insert(waiter, holders);
        }
    }

    /// Forget that `waiter` is waiting (it was granted, gave up or was killed).
    pub fn clear_waiter(&mut self, waiter: SessionId) {
        self.edges.remove(&waiter);
    }

    /// Find a cycle that passes through `start`, returned as the sessions on
    /// it beginning with `start`.
    pub fn cycle_through(&self, start: SessionId) -> Option<Vec<SessionId>> {
        // Iterative DFS; each stack frame is a node plus the holders still to visit.
        let mut visited: HashSet<SessionId> = HashSet::new();
        let mut path: Vec<SessionId> = vec![start];
        let mut stack: Vec<Vec<SessionId>> = vec![self.holders_of(start)];
        visited.insert(start);

        while let Some(pending) = stack.last_mut() {
            match pending.pop() {
                Some(next) if next == start => return Some(path),
                Some(next) => {
                    if visited.insert(next) {
                        path.push(next);
                        let holders = self.holders_of(next);
                        stack.push(holders);
                    }
                }
                None => {
                    stack.pop();
                    path.pop();
                }
            }
        }
        None
    }

    pub fn is_waiting(&self, session: SessionId) -> bool {
        self.edges.contains_key(&session)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum()
    }

    fn holders_of(&self, session: SessionId) -> Vec<SessionId> {
        let mut holders: Vec<SessionId> = self
            .edges
            .get(&session)
            .map(|h| h.iter().copied().collect())
            .unwrap_or_default();
        // Deterministic order keeps reported cycles stable.
        holders.sort_unstable_by(|a, b| b.cmp(a));
        holders
    }
}
