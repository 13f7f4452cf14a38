//! Lag-adaptive pacing.
//!
//! The throttle controller runs beside the writer and feeds it pacing tokens
//! through a bounded queue. Every 800ms it reads the freshest lag sample,
//! converts it into a sleep duration (or a pause sentinel when lag crosses
//! the configured ceiling), and offers the token without blocking. A full
//! queue drops the token; the writer only ever wants the latest anyway.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;

use crate::lag::ReplicaMonitor;
use crate::state::RunState;

/// Cadence of both the lag-poll loop and the token-emit loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(800);

/// Capacity of the token queue between controller and writer.
pub const TOKEN_QUEUE_CAPACITY: usize = 500;

/// Added to the standing correction each time the run pauses.
const CORRECTION_PAUSE_BUMP: u64 = 50;

/// The correction decays one millisecond per cycle down to this floor.
const CORRECTION_DECAY_FLOOR: u64 = 300;

/// Lag slot value meaning no sample has been observed yet.
const NO_SAMPLE: i64 = -1;

/// A pacing instruction for the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleToken {
    /// Sleep this many milliseconds before the next transaction.
    Sleep(u64),
    /// Lag crossed the ceiling; hold off and re-check.
    Pause,
}

/// Throttle parameters of a run.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Baseline sleep per chunk in milliseconds.
    pub sleep_ms: u64,
    /// Lag in seconds at which to pause. Zero disables pausing.
    pub max_lag_secs: i64,
    /// Scale sleep directly from lag instead of the dampened curve.
    pub no_consider_lag: bool,
}

/// Emits pacing tokens until the run finishes.
pub struct ThrottleController {
    config: ThrottleConfig,
    state: Arc<RunState>,
    tokens: mpsc::Sender<ThrottleToken>,
    correction: u64,
}

impl ThrottleController {
    /// Creates a controller feeding the given token queue.
    pub fn new(
        config: ThrottleConfig,
        state: Arc<RunState>,
        tokens: mpsc::Sender<ThrottleToken>,
    ) -> Self {
        Self {
            config,
            state,
            tokens,
            correction: 0,
        }
    }

    /// Runs the poll and emit loops until the run state reports finished.
    ///
    /// With no monitor the controller emits jittered baseline sleeps, the
    /// same treatment a run gets when every replica poll fails.
    pub async fn run(mut self, monitor: Option<ReplicaMonitor>) {
        let lag_slot = Arc::new(AtomicI64::new(NO_SAMPLE));

        let poller = monitor.map(|mut monitor| {
            let lag_slot = Arc::clone(&lag_slot);
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                while !state.is_finished() {
                    let max = monitor.poll_once().await;
                    lag_slot.store(max, Ordering::Relaxed);
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                debug!("lag polling stopped");
            })
        });

        while !self.state.is_finished() {
            let observed = lag_slot.load(Ordering::Relaxed);
            let token = self.next_token(observed);
            if token == ThrottleToken::Pause {
                debug!(lag = observed, "lag over ceiling, pausing writer");
            }
            self.offer(token);
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        if let Some(handle) = poller {
            let _ = handle.await;
        }
    }

    /// Turns the freshest lag observation into a pacing token.
    ///
    /// A negative observation means no sample yet. Pausing bumps the standing
    /// correction; every emitted sleep carries it, and it decays one
    /// millisecond per cycle while above the floor.
    fn next_token(&mut self, observed: i64) -> ThrottleToken {
        if self.config.max_lag_secs > 0 && observed >= self.config.max_lag_secs {
            self.correction += CORRECTION_PAUSE_BUMP;
            return ThrottleToken::Pause;
        }
        let base = if observed > 0 {
            lag_delay(&self.config, observed)
        } else {
            jitter(self.config.sleep_ms)
        };
        let token = ThrottleToken::Sleep(base + self.correction);
        if self.correction > CORRECTION_DECAY_FLOOR {
            self.correction -= 1;
        }
        token
    }

    fn offer(&self, token: ThrottleToken) {
        if self.tokens.try_send(token).is_err() {
            debug!("token queue full, dropping token");
        }
    }
}

/// Sleep in milliseconds for an observed positive lag.
fn lag_delay(config: &ThrottleConfig, lag: i64) -> u64 {
    let sleep_secs = (config.sleep_ms / 1000) as i64;
    if config.no_consider_lag {
        if lag <= sleep_secs {
            return (lag as u64) * 1000;
        }
        return config.sleep_ms;
    }
    if lag <= sleep_secs || lag + 60 <= sleep_secs {
        return (lag as u64) * 1000;
    }
    let surplus = (lag - sleep_secs) / 60;
    ((sleep_secs + surplus) as u64) * 1000
}

/// Jittered baseline sleep: uniform over the second below `sleep_ms`.
fn jitter(sleep_ms: u64) -> u64 {
    if sleep_ms == 0 {
        return 0;
    }
    let low = sleep_ms.saturating_sub(1000);
    rand::thread_rng().gen_range(low..sleep_ms)
}
