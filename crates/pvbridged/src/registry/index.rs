//! Bidirectional subscription index.
//!
//! Two maps kept mutually consistent:
//! - variable -> subscribers watching it
//! - subscriber -> variables it watches
//!
//! `s ∈ by_variable[v]` iff `v ∈ by_subscriber[s]`, and neither map keeps an
//! empty set around. The 0→1 and 1→0 transitions of a variable's subscriber
//! set are reported to the caller, which owns the upstream side effects.

use std::collections::{HashMap, HashSet};

use pvbridge_core::{SubscriberId, VariableName};

/// Counts exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub variables: usize,
    pub subscribers: usize,
    pub pairs: usize,
}

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    by_variable: HashMap<VariableName, HashSet<SubscriberId>>,
    by_subscriber: HashMap<SubscriberId, HashSet<VariableName>>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the pair. Returns true if `subscriber` is the variable's first.
    ///
    /// Idempotent: re-adding an existing pair returns false.
    pub fn subscribe(&mut self, subscriber: SubscriberId, variable: VariableName) -> bool {
        let watchers = self.by_variable.entry(variable.clone()).or_default();
        let was_empty = watchers.is_empty();
        if !watchers.insert(subscriber) {
            return false;
        }

        self.by_subscriber
            .entry(subscriber)
            .or_default()
            .insert(variable);

        was_empty
    }

    /// Removes the pair. Returns true if `subscriber` was the variable's last.
    ///
    /// Idempotent: removing a missing pair returns false.
    pub fn unsubscribe(&mut self, subscriber: SubscriberId, variable: &VariableName) -> bool {
        let Some(watchers) = self.by_variable.get_mut(variable) else {
            return false;
        };
        if !watchers.remove(&subscriber) {
            return false;
        }

        let emptied = watchers.is_empty();
        if emptied {
            self.by_variable.remove(variable);
        }

        if let Some(watched) = self.by_subscriber.get_mut(&subscriber) {
            watched.remove(variable);
            if watched.is_empty() {
                self.by_subscriber.remove(&subscriber);
            }
        }

        emptied
    }

    /// Removes `subscriber` everywhere. Returns the variables left without
    /// subscribers, sorted by name. Unknown subscribers are a no-op.
    pub fn unsubscribe_all(&mut self, subscriber: SubscriberId) -> Vec<VariableName> {
        let Some(watched) = self.by_subscriber.remove(&subscriber) else {
            return Vec::new();
        };

        let mut emptied: Vec<VariableName> = watched
            .into_iter()
            .filter(|variable| {
                let Some(watchers) = self.by_variable.get_mut(variable) else {
                    return false;
                };
                watchers.remove(&subscriber);
                if watchers.is_empty() {
                    self.by_variable.remove(variable);
                    true
                } else {
                    false
                }
            })
            .collect();

        emptied.sort();
        emptied
    }

    /// Snapshot of the subscribers currently watching `variable`.
    pub fn subscribers(&self, variable: &VariableName) -> Vec<SubscriberId> {
        self.by_variable
            .get(variable)
            .map(|watchers| watchers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Variables watched by `subscriber`, sorted by name.
    pub fn subscriptions(&self, subscriber: SubscriberId) -> Vec<VariableName> {
        let mut watched: Vec<VariableName> = self
            .by_subscriber
            .get(&subscriber)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        watched.sort();
        watched
    }

    /// Whether anyone watches `variable`.
    pub fn is_watched(&self, variable: &VariableName) -> bool {
        self.by_variable.contains_key(variable)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            variables: self.by_variable.len(),
            subscribers: self.by_subscriber.len(),
            pairs: self.by_variable.values().map(HashSet::len).sum(),
        }
    }

    /// Verifies both maps describe the same set of pairs.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let forward = self.by_variable.iter().all(|(variable, watchers)| {
            !watchers.is_empty()
                && watchers.iter().all(|s| {
                    self.by_subscriber
                        .get(s)
                        .is_some_and(|watched| watched.contains(variable))
                })
        });
        let backward = self.by_subscriber.iter().all(|(subscriber, watched)| {
            !watched.is_empty()
                && watched.iter().all(|v| {
                    self.by_variable
                        .get(v)
                        .is_some_and(|watchers| watchers.contains(subscriber))
                })
        });
        forward && backward
    }
}
