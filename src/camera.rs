// src/camera.rs - Camera feed retry state machine
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraState {
    /// First load in flight.
    Loading,
    Live,
    Retrying { attempt: u32, delay: Duration },
    /// Retries exhausted; the feed stays hidden until `reset`.
    GaveUp,
}

/// Tracks camera load failures and computes exponential backoff.
#[derive(Debug, Clone)]
pub struct CameraRetry {
    state: CameraState,
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl CameraRetry {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: CameraState::Loading,
            attempts: 0,
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self.state, CameraState::GaveUp)
    }

    /// The feed loaded: clear the failure count.
    pub fn on_loaded(&mut self) {
        if self.attempts > 0 {
            tracing::info!("Camera feed recovered after {} attempts", self.attempts);
        }
        self.attempts = 0;
        self.state = CameraState::Live;
    }

    /// The feed failed. Returns how long to wait before the next attempt,
    /// or `None` once the retry budget is spent.
    pub fn on_error(&mut self) -> Option<Duration> {
        if self.state == CameraState::GaveUp {
            return None;
        }
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            tracing::warn!("Camera feed unavailable, giving up after {} attempts", self.max_attempts);
            self.state = CameraState::GaveUp;
            return None;
        }
        let delay = self.backoff(self.attempts);
        tracing::debug!("Camera feed error, retry {} in {:?}", self.attempts, delay);
        self.state = CameraState::Retrying {
            attempt: self.attempts,
            delay,
        };
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.state = CameraState::Loading;
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Append a cache-busting parameter so the browser refetches the frame.
pub fn frame_url(base: &str, stamp: i64) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}t={stamp}")
}
