use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::PairId;

/// The set of ambulance/hospital pairs that currently have a detailed resolution scheduled
/// or in flight.
///
/// Membership is handed out as a [`PendingGuard`]. The pair leaves the set when the guard is
/// dropped, which ties removal to the lifetime of the work itself: it happens when the outcome
/// is delivered, and also when the work is cancelled before it ever ran. Every insertion is
/// therefore matched by exactly one removal.
#[derive(Clone, Debug, Default)]
pub struct PendingSet {
    pairs: Arc<Mutex<HashSet<PairId>>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `pair` as pending.
    ///
    /// Returns `None` if the pair is already pending, in which case no new work must be
    /// started for it.
    pub fn try_insert(&self, pair: &PairId) -> Option<PendingGuard> {
        let inserted = self.lock().insert(pair.clone());
        inserted.then(|| PendingGuard {
            pairs: Arc::clone(&self.pairs),
            pair: pair.clone(),
        })
    }

    pub fn contains(&self, pair: &PairId) -> bool {
        self.lock().contains(pair)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PairId>> {
        // The set stays consistent even if a holder panicked, as every critical section is a
        // single insert/remove/lookup.
        self.pairs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership of one pair in a [`PendingSet`]. Removes the pair when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    pairs: Arc<Mutex<HashSet<PairId>>>,
    pair: PairId,
}

impl PendingGuard {
    pub fn pair(&self) -> &PairId {
        &self.pair
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pairs = self.pairs.lock().unwrap_or_else(PoisonError::into_inner);
        pairs.remove(&self.pair);
    }
}
