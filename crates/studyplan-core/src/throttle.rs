//! Per-user sliding-window limit on generation calls.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("generation limit reached, retry in {}s", .retry_after.as_secs())]
pub struct Throttled {
    pub retry_after: Duration,
}

/// In-process rate limiter. State is lost on restart.
///
/// Users whose calls have all aged out are swept at most once per window,
/// so the map only holds users active within the last two windows.
#[derive(Debug)]
pub struct GenerationThrottle {
    limit: usize,
    window: Duration,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    hits: HashMap<Uuid, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl State {
    fn sweep(&mut self, now: Instant, window: Duration) {
        let due = self
            .last_sweep
            .is_none_or(|last| now.saturating_duration_since(last) >= window);
        if !due {
            return;
        }
        self.hits.retain(|_, calls| {
            calls
                .back()
                .is_some_and(|&last| now.saturating_duration_since(last) < window)
        });
        self.last_sweep = Some(now);
    }
}

impl Default for GenerationThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW)
    }
}

impl GenerationThrottle {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(State::default()),
        }
    }

    /// Record a call for `user_id`, or refuse it if the window is full.
    pub fn check(&self, user_id: Uuid) -> Result<(), Throttled> {
        self.check_at(user_id, Instant::now())
    }

    pub fn check_at(&self, user_id: Uuid, now: Instant) -> Result<(), Throttled> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sweep(now, self.window);
        let calls = state.hits.entry(user_id).or_default();

        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.limit {
            let oldest = calls.front().copied().unwrap_or(now);
            let retry_after = self
                .window
                .saturating_sub(now.saturating_duration_since(oldest));
            return Err(Throttled { retry_after });
        }

        calls.push_back(now);
        Ok(())
    }

    /// Number of users currently holding throttle state.
    pub fn tracked_users(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .hits
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_limit_then_rejects() {
        let throttle = GenerationThrottle::default();
        let user = Uuid::new_v4();
        let start = Instant::now();

        for i in 0..10 {
            throttle
                .check_at(user, start + Duration::from_secs(i))
                .unwrap_or_else(|e| panic!("call {i} rejected: {e}"));
        }
        let err = throttle
            .check_at(user, start + Duration::from_secs(10))
            .unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(3590));
    }

    #[test]
    fn window_slides() {
        let throttle = GenerationThrottle::new(2, Duration::from_secs(60));
        let user = Uuid::new_v4();
        let start = Instant::now();

        throttle.check_at(user, start).unwrap();
        throttle.check_at(user, start + Duration::from_secs(30)).unwrap();
        assert!(throttle.check_at(user, start + Duration::from_secs(59)).is_err());
        // The first call has aged out.
        throttle.check_at(user, start + Duration::from_secs(60)).unwrap();
        assert!(throttle.check_at(user, start + Duration::from_secs(61)).is_err());
    }

    #[test]
    fn users_are_independent() {
        let throttle = GenerationThrottle::new(1, Duration::from_secs(60));
        let now = Instant::now();
        throttle.check_at(Uuid::new_v4(), now).unwrap();
        throttle.check_at(Uuid::new_v4(), now).unwrap();
    }

    #[test]
    fn idle_users_are_forgotten() {
        let throttle = GenerationThrottle::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..5 {
            throttle.check_at(Uuid::new_v4(), start + Duration::from_secs(i)).unwrap();
        }
        assert_eq!(throttle.tracked_users(), 5);

        let active = Uuid::new_v4();
        throttle.check_at(active, start + Duration::from_secs(120)).unwrap();
        assert_eq!(throttle.tracked_users(), 1);

        // Still within the window: nothing else to sweep, the active user stays.
        throttle.check_at(active, start + Duration::from_secs(150)).unwrap();
        assert_eq!(throttle.tracked_users(), 1);
    }

    #[test]
    fn sweep_keeps_users_with_live_calls() {
        let throttle = GenerationThrottle::new(1, Duration::from_secs(60));
        let start = Instant::now();
        let busy = Uuid::new_v4();

        throttle.check_at(Uuid::new_v4(), start).unwrap();
        throttle.check_at(busy, start + Duration::from_secs(50)).unwrap();
        throttle.check_at(Uuid::new_v4(), start + Duration::from_secs(70)).unwrap();

        assert_eq!(throttle.tracked_users(), 2);
        assert!(throttle.check_at(busy, start + Duration::from_secs(80)).is_err());
    }

    #[test]
    fn rejected_calls_do_not_extend_the_window() {
        let throttle = GenerationThrottle::new(1, Duration::from_secs(60));
        let user = Uuid::new_v4();
        let start = Instant::now();

        throttle.check_at(user, start).unwrap();
        for s in 1..60 {
            assert!(throttle.check_at(user, start + Duration::from_secs(s)).is_err());
        }
        throttle.check_at(user, start + Duration::from_secs(60)).unwrap();
    }
}
