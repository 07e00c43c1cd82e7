//! Rolling-window admission log for a single key.
//!
//! Entries at or before `now - WINDOW` are evicted on every admission
//! attempt. Admission stops once `rate_limit` entries remain, so a ledger
//! only outgrows its limit when the limit is lowered after the fact.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Length of the rolling window in seconds.
pub const WINDOW_SECS: i64 = 3600;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call was recorded; `remaining` slots are left in the window.
    Admitted { remaining: u32 },
    /// The window is full. Nothing was recorded.
    RateLimited { retry_after: std::time::Duration },
}

/// Ordered log of admitted-call timestamps.
#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    calls: VecDeque<DateTime<Utc>>,
}

fn window() -> Duration {
    Duration::seconds(WINDOW_SECS)
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry that has left the window.
    pub fn evict(&mut self, now: DateTime<Utc>) {
        let window_start = now - window();
        while self.calls.front().is_some_and(|t| *t <= window_start) {
            self.calls.pop_front();
        }
    }

    /// Evict, then admit if the window has room.
    ///
    /// Callers must hold the owning record exclusively so the check and
    /// the append happen as one step.
    pub fn try_admit(&mut self, now: DateTime<Utc>, rate_limit: u32) -> Admission {
        self.evict(now);

        let used = self.calls.len();
        if used >= rate_limit as usize {
            return Admission::RateLimited {
                retry_after: self.retry_after(now, rate_limit),
            };
        }

        // Keep the log ordered even if the wall clock steps backwards.
        let at = self.calls.back().map_or(now, |last| now.max(*last));
        self.calls.push_back(at);

        Admission::Admitted {
            remaining: rate_limit - used as u32 - 1,
        }
    }

    /// Undo the most recent admission.
    pub fn revoke_last(&mut self) {
        self.calls.pop_back();
    }

    /// Calls inside the window ending at `now`. Does not mutate.
    pub fn calls_in_window(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - window();
        self.calls
            .iter()
            .filter(|t| **t > window_start && **t <= now)
            .count()
    }

    /// Time until the window has room for one more call under
    /// `rate_limit`, at least one second.
    ///
    /// A slot opens once `len - rate_limit + 1` entries have aged out, so
    /// the wait runs from entry `len - rate_limit`. With a full window that
    /// is the oldest entry.
    pub fn retry_after(&self, now: DateTime<Utc>, rate_limit: u32) -> std::time::Duration {
        let min = std::time::Duration::from_secs(1);
        self.calls
            .len()
            .checked_sub(rate_limit as usize)
            .and_then(|blocking| self.calls.get(blocking))
            .and_then(|entry| (*entry + window() - now).to_std().ok())
            .map_or(min, |wait| wait.max(min))
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_admits_up_to_limit() {
        let mut ledger = UsageLedger::new();
        let now = t0();
        assert_eq!(ledger.try_admit(now, 3), Admission::Admitted { remaining: 2 });
        assert_eq!(ledger.try_admit(now, 3), Admission::Admitted { remaining: 1 });
        assert_eq!(ledger.try_admit(now, 3), Admission::Admitted { remaining: 0 });
        assert!(matches!(
            ledger.try_admit(now, 3),
            Admission::RateLimited { .. }
        ));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_rejection_does_not_mutate() {
        let mut ledger = UsageLedger::new();
        ledger.try_admit(t0(), 1);
        for _ in 0..5 {
            ledger.try_admit(t0() + Duration::minutes(1), 1);
        }
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_retry_after_counts_from_oldest_entry() {
        let mut ledger = UsageLedger::new();
        ledger.try_admit(t0(), 2);
        ledger.try_admit(t0() + Duration::minutes(10), 2);
        let denied = ledger.try_admit(t0() + Duration::minutes(20), 2);
        assert_eq!(
            denied,
            Admission::RateLimited {
                retry_after: std::time::Duration::from_secs(40 * 60)
            }
        );
    }

    #[test]
    fn test_window_boundary_evicts_exactly_one_hour_old_entries() {
        let mut ledger = UsageLedger::new();
        ledger.try_admit(t0(), 1);

        let just_before = t0() + Duration::seconds(WINDOW_SECS - 1);
        assert!(matches!(
            ledger.try_admit(just_before, 1),
            Admission::RateLimited { .. }
        ));
        assert_eq!(ledger.calls_in_window(just_before), 1);

        let boundary = t0() + Duration::seconds(WINDOW_SECS);
        assert_eq!(ledger.calls_in_window(boundary), 0);
        assert_eq!(ledger.try_admit(boundary, 1), Admission::Admitted { remaining: 0 });
    }

    #[test]
    fn test_calls_in_window_is_read_only() {
        let mut ledger = UsageLedger::new();
        ledger.try_admit(t0(), 5);
        ledger.try_admit(t0() + Duration::minutes(40), 5);
        let later = t0() + Duration::minutes(90);
        assert_eq!(ledger.calls_in_window(later), 1);
        assert_eq!(ledger.len(), 2);
        ledger.evict(later);
        assert_eq!(ledger.len(), 1);

        // An entry exactly one window old no longer counts.
        let boundary = t0() + Duration::minutes(100);
        assert_eq!(ledger.calls_in_window(boundary), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_retry_after_with_lowered_limit() {
        let mut ledger = UsageLedger::new();
        for minutes in [0, 10, 20, 30] {
            ledger.try_admit(t0() + Duration::minutes(minutes), 4);
        }

        // Three of the four entries must age out before a slot opens.
        let now = t0() + Duration::minutes(40);
        assert_eq!(
            ledger.try_admit(now, 2),
            Admission::RateLimited {
                retry_after: std::time::Duration::from_secs(40 * 60)
            }
        );

        let retry_at = t0() + Duration::minutes(80);
        assert!(matches!(
            ledger.try_admit(retry_at - Duration::seconds(1), 2),
            Admission::RateLimited { .. }
        ));
        assert_eq!(ledger.try_admit(retry_at, 2), Admission::Admitted { remaining: 0 });
    }

    #[test]
    fn test_retry_after_never_below_one_second() {
        let ledger = UsageLedger::new();
        assert_eq!(ledger.retry_after(t0(), 1), std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_clock_step_backwards_keeps_order() {
        let mut ledger = UsageLedger::new();
        ledger.try_admit(t0(), 5);
        ledger.try_admit(t0() - Duration::minutes(5), 5);
        ledger.evict(t0() + Duration::seconds(WINDOW_SECS));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_revoke_last() {
        let mut ledger = UsageLedger::new();
        ledger.try_admit(t0(), 1);
        ledger.revoke_last();
        assert_eq!(ledger.try_admit(t0(), 1), Admission::Admitted { remaining: 0 });
    }
}
