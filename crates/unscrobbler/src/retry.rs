//! Retry policies for login and per-record deletion.

use std::time::Duration;

/// Login attempts before the run is declared structurally broken.
pub const LOGIN_MAX_ATTEMPTS: u32 = 12;

const LOGIN_PAUSE: Duration = Duration::from_secs(10);
const DELETE_PAUSE: Duration = Duration::from_millis(100);

/// How many times to try an action and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    pause: Duration,
}

impl RetryPolicy {
    /// Give up after `max_attempts` tries in total.
    pub fn bounded(max_attempts: u32, pause: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            pause,
        }
    }

    /// Keep trying until the action succeeds or the run is cancelled.
    pub fn unbounded(pause: Duration) -> Self {
        Self {
            max_attempts: None,
            pause,
        }
    }

    /// Default for getting past the login page.
    pub fn login() -> Self {
        Self::bounded(LOGIN_MAX_ATTEMPTS, LOGIN_PAUSE)
    }

    /// Default for a flaky delete action.
    pub fn deletion() -> Self {
        Self::unbounded(DELETE_PAUSE)
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Whether another try is allowed after `attempts_made` failed ones.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts_made < max)
    }
}

/// Blocks the control loop between attempts.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
