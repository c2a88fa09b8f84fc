//! Sliding-window query rate limiter.
//!
//! Once more than `max_queries_before_activation` queries arrive within
//! `check_interval`, every query is refused for `duration`. The limiter is
//! global to the bot, not per user.

use std::collections::VecDeque;
use std::time::Duration;

use lorebot_config::CooldownConfig;
use lorebot_core::error::Error;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct LimiterState {
    /// Arrival times, oldest first, at most `max + 1` long.
    history: VecDeque<Instant>,
    cooldown_start: Option<Instant>,
}

#[derive(Debug)]
pub struct RateLimiter {
    duration: Duration,
    check_interval: Duration,
    max_before_activation: usize,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(
        duration: Duration,
        check_interval: Duration,
        max_before_activation: u32,
    ) -> Result<Self, Error> {
        if duration.is_zero() {
            return Err(Error::config("Invalid cooldown duration provided: 0"));
        }
        if check_interval.is_zero() {
            return Err(Error::config("Invalid cooldown check interval provided: 0"));
        }
        if max_before_activation == 0 {
            return Err(Error::config(
                "Invalid maximum queries before cooldown activation provided: 0",
            ));
        }
        Ok(Self {
            duration,
            check_interval,
            max_before_activation: max_before_activation as usize,
            state: Mutex::new(LimiterState::default()),
        })
    }

    /// Build the limiter from config, or `None` when cooldowns are disabled.
    pub fn from_config(config: &CooldownConfig) -> Result<Option<Self>, Error> {
        if !config.is_enabled() {
            info!("Cooldown disabled");
            return Ok(None);
        }
        let secs = |v: f64, what: &str| {
            Duration::try_from_secs_f64(v)
                .map_err(|e| Error::config(format!("Invalid cooldown {what} provided: {v} ({e})")))
        };
        let duration = secs(config.duration_secs.unwrap_or_default(), "duration")?;
        let interval = secs(config.check_interval_secs, "check interval")?;
        Self::new(duration, interval, config.max_queries_before_activation).map(Some)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Record one query attempt and return how long the caller must wait.
    ///
    /// `Duration::ZERO` means the query is admitted. Call exactly once per
    /// attempt, before any other side effect.
    pub fn check_and_record(&self) -> Duration {
        self.check_and_record_at(Instant::now())
    }

    pub fn check_and_record_at(&self, now: Instant) -> Duration {
        let mut state = self.state.lock();

        if let Some(start) = state.cooldown_start {
            let elapsed = now.saturating_duration_since(start);
            if elapsed >= self.duration {
                state.cooldown_start = None;
                debug!("Cooldown elapsed");
                return Duration::ZERO;
            }
            return self.duration - elapsed;
        }

        state.history.push_back(now);
        while state.history.len() > self.max_before_activation + 1 {
            state.history.pop_front();
        }

        let window_full = state.history.len() > self.max_before_activation;
        let span = match (state.history.front(), state.history.back()) {
            (Some(oldest), Some(newest)) => newest.saturating_duration_since(*oldest),
            _ => Duration::ZERO,
        };
        if !window_full || span >= self.check_interval {
            return Duration::ZERO;
        }

        state.cooldown_start = Some(now);
        info!(
            duration_secs = self.duration.as_secs_f64(),
            "Query rate exceeded, cooldown started"
        );
        self.duration
    }
}
