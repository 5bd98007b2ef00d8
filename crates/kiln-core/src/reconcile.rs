//! Name-keyed diff between the previous and the freshly generated children
//! of one level (objects, geos, or parts).
//!
//! The planner is pure: it looks only at keys and names and returns a
//! [`ReconcilePlan`]. Each level applies the plan to its own arena, which
//! keeps matching policy in one place.
//!
//! # Policy
//!
//! 1. Exactly one previous entry and exactly one fresh entry: they are the
//!    same logical entity whatever their names are.
//! 2. Otherwise entries match by exact name. When names repeat, the first
//!    unmatched previous entry with that name wins, in previous order.
//! 3. Unmatched previous entries are removed.
//! 4. Unmatched fresh entries are created.
//!
//! A rename is observed as remove + create.

use std::collections::{HashMap, VecDeque};

/// What to do with one fresh descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match<K> {
    /// Reuse the previous record `K`.
    Kept(K),
    /// Create a new record.
    Create,
}

/// Result of [`plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan<K> {
    /// One entry per fresh descriptor, in fresh order.
    pub matches: Vec<Match<K>>,
    /// Previous records with no fresh counterpart, in previous order.
    pub removed: Vec<K>,
    /// Whether the singleton rule matched regardless of name.
    pub positional: bool,
}

impl<K: Copy> ReconcilePlan<K> {
    pub fn kept(&self) -> impl Iterator<Item = (usize, K)> + '_ {
        self.matches.iter().enumerate().filter_map(|(i, m)| match m {
            Match::Kept(k) => Some((i, *k)),
            Match::Create => None,
        })
    }

    pub fn kept_count(&self) -> usize {
        self.kept().count()
    }

    pub fn created_count(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| matches!(m, Match::Create))
            .count()
    }
}

/// Plan the reconciliation of `previous` (record key, name) against the
/// names of the fresh descriptors.
pub fn plan<K, P, F>(previous: &[(K, P)], fresh: &[F]) -> ReconcilePlan<K>
where
    K: Copy,
    P: AsRef<str>,
    F: AsRef<str>,
{
    if previous.len() == 1 && fresh.len() == 1 {
        return ReconcilePlan {
            matches: vec![Match::Kept(previous[0].0)],
            removed: Vec::new(),
            positional: true,
        };
    }

    let mut by_name: HashMap<&str, VecDeque<usize>> = HashMap::with_capacity(previous.len());
    for (index, (_, name)) in previous.iter().enumerate() {
        by_name.entry(name.as_ref()).or_default().push_back(index);
    }

    let mut taken = vec![false; previous.len()];
    let matches = fresh
        .iter()
        .map(|name| {
            match by_name
                .get_mut(name.as_ref())
                .and_then(VecDeque::pop_front)
            {
                Some(index) => {
                    taken[index] = true;
                    Match::Kept(previous[index].0)
                }
                None => Match::Create,
            }
        })
        .collect();

    let removed = previous
        .iter()
        .zip(&taken)
        .filter(|(_, taken)| !**taken)
        .map(|((key, _), _)| *key)
        .collect();

    ReconcilePlan {
        matches,
        removed,
        positional: false,
    }
}
