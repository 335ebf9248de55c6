//! Reconnect delay policy.
//!
//! After a failed broker connection the driver waits before trying again,
//! and each consecutive failure doubles the wait up to a cap, where the
//! schedule saturates: an unattended node keeps retrying at the capped
//! delay for as long as the outage lasts. An explicit attempt limit can be
//! configured for deployments that prefer to give up.
//!
//! With the defaults (1 s initial, 60 s cap, factor 2.0) the schedule is
//! 1, 2, 4, 8, 16, 32, 60, 60, 60, ...

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackoffError {
    /// The configured attempt limit is spent.
    #[error("reconnect attempt budget exhausted after {0} attempts")]
    BudgetExhausted(u32),
}

/// Exponential delay schedule between reconnect attempts.
///
/// `next_delay` hands out the current delay and advances the schedule;
/// `reset` is called by the driver whenever a connection succeeds so the next
/// outage starts from the initial delay again.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    current: Duration,
    cap: Duration,
    factor: f64,
    attempt: u32,
    /// Hard attempt limit. `None` retries forever at the capped delay.
    attempt_limit: Option<u32>,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration, factor: f64) -> Self {
        Self {
            initial,
            current: initial,
            cap,
            factor,
            attempt: 0,
            attempt_limit: None,
        }
    }

    /// Bounds the schedule to a hard attempt limit.
    pub fn set_attempt_limit(&mut self, limit: u32) {
        self.attempt_limit = Some(limit);
    }

    /// Returns the schedule to its initial state. Called on every successful
    /// connect so transient blips do not shorten the next outage's ramp.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempt = 0;
    }

    /// Hands out the delay to sleep before the next attempt and advances the
    /// schedule. Fails only when a configured attempt limit is exceeded.
    pub fn next_delay(&mut self) -> Result<Duration, BackoffError> {
        self.attempt += 1;
        if let Some(limit) = self.attempt_limit {
            if self.attempt > limit {
                return Err(BackoffError::BudgetExhausted(limit));
            }
        }

        let delay = self.current;
        let grown = Duration::from_secs_f64(self.current.as_secs_f64() * self.factor);
        self.current = grown.min(self.cap);
        Ok(delay)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn current_delay(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    /// 1 s initial, 60 s cap, doubling: quick recovery from blips, gentle on
    /// a broker that is restarting.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60), 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_cap() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(16));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(32));
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn default_schedule_never_exhausts() {
        // An unattended node must keep retrying through an arbitrarily long
        // outage; the schedule saturates at the cap instead of giving up.
        let mut backoff = Backoff::default();
        for _ in 0..100 {
            backoff.next_delay().unwrap();
        }
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(60));
        assert_eq!(backoff.current_delay(), Duration::from_secs(60));
        assert_eq!(backoff.attempt(), 101);
    }

    #[test]
    fn reset_restores_initial_delay() {
        let mut backoff = Backoff::default();
        backoff.next_delay().unwrap();
        backoff.next_delay().unwrap();
        assert_eq!(backoff.attempt(), 2);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn explicit_limit_bounds_the_schedule() {
        let mut backoff = Backoff::default();
        backoff.set_attempt_limit(2);
        backoff.next_delay().unwrap();
        backoff.next_delay().unwrap();
        assert!(matches!(
            backoff.next_delay(),
            Err(BackoffError::BudgetExhausted(2))
        ));
    }

    #[test]
    fn flat_schedule_stays_at_its_single_delay() {
        let mut flat = Backoff::new(Duration::from_secs(5), Duration::from_secs(5), 2.0);
        assert_eq!(flat.next_delay().unwrap(), Duration::from_secs(5));
        assert_eq!(flat.next_delay().unwrap(), Duration::from_secs(5));
    }
}
