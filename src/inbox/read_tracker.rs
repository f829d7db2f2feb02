use std::collections::HashSet;

/// Message ids this session has already asked the server to mark as read.
///
/// An id stays claimed while its call is in flight and after it succeeds, so
/// overlapping polls never issue the same call twice. A failed call releases
/// the id so the next poll that still sees it unread tries again.
#[derive(Debug, Default)]
pub struct ReadTracker {
    issued: HashSet<i64>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> &HashSet<i64> {
        &self.issued
    }

    /// Returns the ids that were not claimed yet, in input order.
    pub fn claim(&mut self, ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
        ids.into_iter().filter(|id| self.issued.insert(*id)).collect()
    }

    pub fn release(&mut self, id: i64) {
        self.issued.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_skips_ids_already_issued() {
        let mut tracker = ReadTracker::new();

        assert_eq!(tracker.claim([3, 4, 5]), vec![3, 4, 5]);
        assert_eq!(tracker.claim([4, 5, 6]), vec![6]);
        assert_eq!(tracker.claim([6, 6]), Vec::<i64>::new());
    }

    #[test]
    fn test_release_allows_retry() {
        let mut tracker = ReadTracker::new();
        tracker.claim([7]);

        tracker.release(7);

        assert!(!tracker.issued().contains(&7));
        assert_eq!(tracker.claim([7]), vec![7]);
    }
}
