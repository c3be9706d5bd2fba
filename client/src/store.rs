//! Deduplicating flag queue between harvesters and the delivery loop.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use crate::core::types::FlagRecord;
use crate::sync::lock;

#[derive(Debug, Default)]
struct StoreInner {
    /// Every flag ever queued. Never shrinks.
    seen: HashSet<String>,
    /// Flags awaiting delivery, oldest first.
    pending: VecDeque<FlagRecord>,
}

/// Many-producer, single-consumer flag queue.
///
/// Any thread may [`add`](Self::add). Exactly one consumer at a time may call
/// [`peek_batch`](Self::peek_batch) followed by [`commit`](Self::commit);
/// `commit` must not remove more than the preceding peek returned.
#[derive(Debug, Default)]
pub struct FlagStore {
    inner: Mutex<StoreInner>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every flag not seen before, tagged with `team`.
    ///
    /// Returns how many records were queued. A flag seen earlier is dropped,
    /// even if it now comes from another team.
    pub fn add<I, S>(&self, flags: I, team: &str) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = lock(&self.inner);
        let mut added = 0;
        for flag in flags {
            let flag = flag.as_ref();
            if inner.seen.insert(flag.to_string()) {
                inner.pending.push_back(FlagRecord::new(flag, team));
                added += 1;
            }
        }
        added
    }

    /// Up to `limit` oldest pending records, left in the queue.
    pub fn peek_batch(&self, limit: usize) -> Vec<FlagRecord> {
        lock(&self.inner).pending.iter().take(limit).cloned().collect()
    }

    /// Drop the `count` oldest pending records.
    pub fn commit(&self, count: usize) {
        let mut inner = lock(&self.inner);
        let count = count.min(inner.pending.len());
        inner.pending.drain(..count);
    }

    pub fn pending_size(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    pub fn seen_size(&self) -> usize {
        lock(&self.inner).seen.len()
    }
}
