//! Correlation id allocation.

use std::sync::atomic::{AtomicI64, Ordering};

/// First correlation id handed out; 0 is reserved for heartbeats.
pub const FIRST_CORRELATION_ID: i64 = 1;

/// Hands out monotonically increasing correlation ids.
///
/// After `i64::MAX` the sequence restarts at [`FIRST_CORRELATION_ID`]. Callers
/// skip ids that are still in flight, see
/// [`PendingTable::register`](super::PendingTable::register).
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    next: AtomicI64,
}

impl CorrelationIdGenerator {
    /// Creates a generator starting at [`FIRST_CORRELATION_ID`].
    pub fn new() -> Self {
        Self::starting_at(FIRST_CORRELATION_ID)
    }

    /// Creates a generator whose first id is `first`.
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first.max(FIRST_CORRELATION_ID)),
        }
    }

    /// Returns the next id in sequence.
    pub fn next_id(&self) -> i64 {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            let following = if current == i64::MAX {
                FIRST_CORRELATION_ID
            } else {
                current + 1
            };
            match self
                .next
                .compare_exchange_weak(current, following, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one() {
        let generator = CorrelationIdGenerator::new();
        assert_eq!(generator.next_id(), 1);
        assert_eq!(generator.next_id(), 2);
        assert_eq!(generator.next_id(), 3);
    }

    #[test]
    fn test_wraps_to_one() {
        let generator = CorrelationIdGenerator::starting_at(i64::MAX - 1);
        assert_eq!(generator.next_id(), i64::MAX - 1);
        assert_eq!(generator.next_id(), i64::MAX);
        assert_eq!(generator.next_id(), 1);
        assert_eq!(generator.next_id(), 2);
    }

    #[test]
    fn test_never_issues_reserved_ids() {
        let generator = CorrelationIdGenerator::starting_at(-5);
        assert_eq!(generator.next_id(), 1);
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(CorrelationIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..1000).map(|_| generator.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
