use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Issues strictly increasing epoch-millisecond keys.
///
/// Snapshot keys double as store path segments, so two captures landing in
/// the same millisecond must not share a key. When the wall clock has not
/// advanced (or stepped backwards) the previous key is bumped by one.
#[derive(Debug, Default)]
pub struct MonotonicMillis {
    last: AtomicI64,
}

impl MonotonicMillis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&self, now: DateTime<Utc>) -> i64 {
        let wall = now.timestamp_millis();
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let candidate = if wall > current { wall } else { current + 1 };
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_instant_yields_distinct_keys() {
        let clock = MonotonicMillis::new();
        let now = Utc::now();
        let a = clock.next_key(now);
        let b = clock.next_key(now);
        let c = clock.next_key(now);
        assert_eq!(a, now.timestamp_millis());
        assert_eq!(b, a + 1);
        assert_eq!(c, a + 2);
    }

    #[test]
    fn clock_step_backwards_never_reuses_a_key() {
        let clock = MonotonicMillis::new();
        let now = Utc::now();
        let first = clock.next_key(now);
        let earlier = now - chrono::Duration::seconds(5);
        assert!(clock.next_key(earlier) > first);
    }
}
