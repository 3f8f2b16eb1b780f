//! Shared rate-limit circuit breaker.
//!
//! One breaker is owned by the app context and consulted by every job. Fail
//! counts accumulate across jobs; a breach anywhere locks everything. The
//! lockout is a deadline rather than a spawned timer: `is_locked` resets the
//! breaker once the deadline passes, which keeps the state machine free of
//! background tasks.

use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Active,
    Locked,
}

#[derive(Debug, Default)]
pub struct Breaker {
    fails: AtomicU32,
    locked_until: Mutex<Option<Instant>>,
}

impl Breaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a qualifying failure (transport error or non-2xx status).
    /// Trips the breaker once the count reaches `max_fails`; `max_fails == 0`
    /// disables the breaker entirely.
    pub fn record_failure(&self, max_fails: u32, lockout_minutes: RangeInclusive<i64>) {
        let fails = self.fails.fetch_add(1, Ordering::SeqCst) + 1;
        if max_fails == 0 || fails < max_fails {
            return;
        }
        self.trip(lockout_minutes);
    }

    /// A completed round trip means the channel works; transient failures
    /// below the threshold self-heal.
    pub fn record_success(&self) {
        self.fails.store(0, Ordering::SeqCst);
    }

    pub fn fail_count(&self) -> u32 {
        self.fails.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BreakerState {
        if self.is_locked() {
            BreakerState::Locked
        } else {
            BreakerState::Active
        }
    }

    /// Every job must call this at least once per iteration. Once the
    /// cool-down deadline elapses the fail count resets and the breaker
    /// returns to `Active`.
    pub fn is_locked(&self) -> bool {
        let mut locked_until = self.locked_until.lock().unwrap_or_else(|e| e.into_inner());
        match *locked_until {
            Some(deadline) if Instant::now() < deadline => true,
            Some(_) => {
                *locked_until = None;
                self.fails.store(0, Ordering::SeqCst);
                info!("breaker cool-down elapsed, resuming");
                false
            }
            None => false,
        }
    }

    fn trip(&self, lockout_minutes: RangeInclusive<i64>) {
        let minutes = draw_minutes(lockout_minutes);
        let cool_down = Duration::from_secs(minutes.saturating_mul(60));
        let mut locked_until = self.locked_until.lock().unwrap_or_else(|e| e.into_inner());
        // A concurrent trip may have already set a deadline; keep the later one.
        let deadline = Instant::now() + cool_down;
        if locked_until.map_or(true, |existing| deadline > existing) {
            *locked_until = Some(deadline);
            warn!(minutes, "too many api failures, locking all jobs");
        }
    }

    #[cfg(test)]
    fn force_deadline(&self, deadline: Instant) {
        *self.locked_until.lock().unwrap() = Some(deadline);
    }
}

fn draw_minutes(range: RangeInclusive<i64>) -> u64 {
    let min = (*range.start()).max(0) as u64;
    let max = (*range.end()).max(0).max(min as i64) as u64;
    if min >= max {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_exactly_max_fails() {
        let breaker = Breaker::new();
        for _ in 0..4 {
            breaker.record_failure(5, 1..=1);
            assert_eq!(breaker.state(), BreakerState::Active);
        }
        breaker.record_failure(5, 1..=1);
        assert_eq!(breaker.state(), BreakerState::Locked);
    }

    #[test]
    fn success_resets_the_count() {
        let breaker = Breaker::new();
        for _ in 0..4 {
            breaker.record_failure(5, 1..=1);
        }
        breaker.record_success();
        assert_eq!(breaker.fail_count(), 0);
        breaker.record_failure(5, 1..=1);
        assert_eq!(breaker.state(), BreakerState::Active);
    }

    #[test]
    fn zero_max_fails_disables_the_breaker() {
        let breaker = Breaker::new();
        for _ in 0..100 {
            breaker.record_failure(0, 1..=1);
        }
        assert_eq!(breaker.state(), BreakerState::Active);
    }

    #[test]
    fn cool_down_elapse_resets_and_unlocks() {
        let breaker = Breaker::new();
        for _ in 0..3 {
            breaker.record_failure(3, 1..=1);
        }
        assert_eq!(breaker.state(), BreakerState::Locked);

        breaker.force_deadline(Instant::now() - Duration::from_secs(1));
        assert_eq!(breaker.state(), BreakerState::Active);
        assert_eq!(breaker.fail_count(), 0);
    }

    #[test]
    fn lockout_draw_stays_in_bounds() {
        for _ in 0..50 {
            let minutes = draw_minutes(2..=8);
            assert!((2..=8).contains(&minutes));
        }
    }
}
