//! Timer engine for the meditation timer.
//!
//! This module provides the core countdown functionality:
//! - State transitions (Idle → Running ⇄ Paused → Completed)
//! - A cancellable one-second tick task driven by a [`Clock`]
//! - Persistence of every snapshot through a [`StateStore`]
//! - Fan-out of every snapshot to subscribers
//!
//! All commands and ticks are serialized by one mutex. The tick task is the
//! only thing that waits; commands return immediately.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::error::TimerError;
use super::persist;
use super::store::StateStore;
use super::subscription::{Subscribers, Subscription};
use crate::types::{TimerConfig, TimerPhase, TimerState};

// ============================================================================
// TimerEvent
// ============================================================================

/// Timer events for notifications and external integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Session length changed
    DurationChanged {
        /// New session length
        total_seconds: u32,
    },
    /// Countdown started
    Started {
        /// Seconds left at start
        remaining_seconds: u32,
    },
    /// Countdown paused
    Paused {
        /// Seconds left at pause
        remaining_seconds: u32,
    },
    /// Countdown resumed
    Resumed {
        /// Seconds left at resume
        remaining_seconds: u32,
    },
    /// Timer rewound to the full session
    Reset {
        /// Session length
        total_seconds: u32,
    },
    /// Countdown reached zero
    Completed {
        /// Length of the finished session
        total_seconds: u32,
    },
}

// ============================================================================
// Internal state
// ============================================================================

/// The running tick task and the progress it has applied.
struct Ticker {
    generation: u64,
    /// Instant the countdown (re)started
    anchor: Instant,
    /// Whole seconds applied since `anchor`
    applied: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    state: TimerState,
    subscribers: Subscribers,
    ticker: Option<Ticker>,
    generation: u64,
    persist_failed: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn StateStore>,
    events: mpsc::UnboundedSender<TimerEvent>,
    config: TimerConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persists the current snapshot, then publishes it.
    fn commit(&self, inner: &mut Inner) {
        self.persist(inner);
        let snapshot = inner.state;
        inner.subscribers.publish(snapshot);
    }

    /// Writes the current snapshot. Failures only degrade durability.
    fn persist(&self, inner: &mut Inner) {
        match persist::save(self.store.as_ref(), &inner.state) {
            Ok(()) => {
                if inner.persist_failed {
                    info!("State store writable again");
                    inner.persist_failed = false;
                }
            }
            Err(e) => {
                if inner.persist_failed {
                    debug!("Still unable to persist timer state: {}", e);
                } else {
                    warn!("Failed to persist timer state, continuing in memory: {}", e);
                }
                inner.persist_failed = true;
            }
        }
    }

    fn emit(&self, event: TimerEvent) {
        if self.events.send(event).is_err() {
            debug!("No event listener, dropping {:?}", event);
        }
    }

    /// Spawns the tick task and switches to `Running`.
    fn launch(self: &Arc<Self>, inner: &mut Inner) -> Result<(), TimerError> {
        let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;

        Self::cancel(inner);
        inner.generation += 1;
        let generation = inner.generation;

        let handle = runtime.spawn(run_ticker(Arc::clone(self), generation));
        inner.ticker = Some(Ticker {
            generation,
            anchor: self.clock.now(),
            applied: 0,
            handle,
        });
        inner.state.phase = TimerPhase::Running;
        Ok(())
    }

    /// Stops the tick task. No tick is applied after this returns.
    fn cancel(inner: &mut Inner) {
        if let Some(ticker) = inner.ticker.take() {
            ticker.handle.abort();
        }
    }

    /// Applies every whole second elapsed since the ticker's anchor.
    ///
    /// Every second is published on its own, but only the last snapshot of
    /// the run is written, before any of them are published. The stored
    /// remaining time therefore never exceeds what a subscriber has seen.
    /// Returns true if the countdown completed.
    fn catch_up(&self, inner: &mut Inner) -> bool {
        let now = self.clock.now();
        let Some(ticker) = inner.ticker.as_mut() else {
            return false;
        };
        let due = now.saturating_duration_since(ticker.anchor).as_secs();
        if ticker.applied >= due {
            return false;
        }
        let steps = (due - ticker.applied).min(u64::from(inner.state.remaining_seconds));
        ticker.applied = due;

        let mut snapshots = Vec::with_capacity(steps as usize);
        let mut completed = false;
        for _ in 0..steps {
            completed = inner.state.tick();
            snapshots.push(inner.state);
        }
        if snapshots.is_empty() {
            return false;
        }

        if completed {
            Self::cancel(inner);
        }
        self.persist(inner);
        for snapshot in snapshots {
            inner.subscribers.publish(snapshot);
        }

        if completed {
            info!("Session of {}s completed", inner.state.total_seconds);
            self.emit(TimerEvent::Completed {
                total_seconds: inner.state.total_seconds,
            });
            return true;
        }

        debug!("Tick: {}s remaining", inner.state.remaining_seconds);
        false
    }
}

/// Tick task body. Exits when its ticker is cancelled or replaced.
async fn run_ticker(shared: Arc<Shared>, generation: u64) {
    loop {
        let deadline = {
            let inner = shared.lock();
            match &inner.ticker {
                Some(t) if t.generation == generation => {
                    t.anchor + Duration::from_secs(t.applied + 1)
                }
                _ => return,
            }
        };

        shared.clock.sleep_until(deadline).await;

        let mut inner = shared.lock();
        if !matches!(&inner.ticker, Some(t) if t.generation == generation) {
            debug!("Tick task {} cancelled", generation);
            return;
        }
        if shared.catch_up(&mut inner) {
            return;
        }
    }
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Timer engine that owns the countdown state.
///
/// Commands are synchronous and must be issued from within a Tokio runtime
/// when they start the countdown.
pub struct TimerEngine {
    shared: Arc<Shared>,
}

impl TimerEngine {
    /// Creates an engine, restoring the last snapshot from `store`.
    ///
    /// A snapshot taken mid-countdown is restored as paused and written back.
    /// A store that cannot be read is logged and the engine starts from
    /// defaults, as does an invalid `config`.
    pub fn new(
        config: TimerConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn StateStore>,
        event_tx: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Invalid timer configuration ({}), using defaults", e);
                TimerConfig::default()
            }
        };
        let default_total = config.default_seconds().max(1);
        let mut persist_failed = false;

        let (state, write_back) = match persist::load(store.as_ref(), default_total) {
            Ok(Some(restored)) => {
                info!(
                    "Restored timer state: {} {}s/{}s",
                    restored.state.phase.as_str(),
                    restored.state.remaining_seconds,
                    restored.state.total_seconds
                );
                (restored.state, restored.interrupted)
            }
            Ok(None) => (TimerState::idle(default_total), false),
            Err(e) => {
                warn!("Failed to load timer state, starting fresh: {}", e);
                persist_failed = true;
                (TimerState::idle(default_total), false)
            }
        };

        if write_back {
            if let Err(e) = persist::save(store.as_ref(), &state) {
                warn!("Failed to persist restored timer state: {}", e);
                persist_failed = true;
            }
        }

        let inner = Inner {
            state,
            subscribers: Subscribers::new(config.subscriber_buffer),
            ticker: None,
            generation: 0,
            persist_failed,
        };

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                clock,
                store,
                events: event_tx,
                config,
            }),
        }
    }

    /// Sets the session length and rewinds to idle.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `minutes` is zero or above the configured maximum
    /// - `InvalidState` while the countdown is running
    pub fn set_duration(&self, minutes: u32) -> Result<TimerState, TimerError> {
        let max = self.shared.config.max_minutes;
        if minutes == 0 {
            return Err(TimerError::InvalidArgument(
                "duration must be at least 1 minute".to_string(),
            ));
        }
        let total_seconds = match minutes.checked_mul(60) {
            Some(secs) if minutes <= max => secs,
            _ => {
                return Err(TimerError::InvalidArgument(format!(
                    "duration must be at most {max} minutes"
                )))
            }
        };

        let mut inner = self.shared.lock();
        if inner.state.is_running() {
            return Err(TimerError::InvalidState {
                command: "set duration",
                phase: inner.state.phase,
            });
        }

        inner.state.set_total(total_seconds);
        self.shared.commit(&mut inner);
        info!("Session length set to {} minutes", minutes);
        self.shared.emit(TimerEvent::DurationChanged { total_seconds });

        Ok(inner.state)
    }

    /// Starts the countdown. Starting while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if no time remains.
    pub fn start(&self) -> Result<TimerState, TimerError> {
        let mut inner = self.shared.lock();

        match inner.state.phase {
            TimerPhase::Running => {
                debug!("Start ignored, already running");
                return Ok(inner.state);
            }
            _ if inner.state.remaining_seconds == 0 => {
                return Err(TimerError::InvalidArgument(
                    "no time remaining; reset or set a new duration first".to_string(),
                ));
            }
            TimerPhase::Idle | TimerPhase::Paused | TimerPhase::Completed => {}
        }

        self.shared.launch(&mut inner)?;
        self.shared.commit(&mut inner);
        info!("Countdown started with {}s remaining", inner.state.remaining_seconds);
        self.shared.emit(TimerEvent::Started {
            remaining_seconds: inner.state.remaining_seconds,
        });

        Ok(inner.state)
    }

    /// Pauses the countdown. Pausing while not running is a no-op.
    ///
    /// Whole seconds that elapsed before the pause are applied first.
    pub fn pause(&self) -> Result<TimerState, TimerError> {
        let mut inner = self.shared.lock();

        if !inner.state.is_running() {
            debug!("Pause ignored while {}", inner.state.phase.as_str());
            return Ok(inner.state);
        }

        if self.shared.catch_up(&mut inner) {
            return Ok(inner.state);
        }

        Shared::cancel(&mut inner);
        inner.state.phase = TimerPhase::Paused;
        self.shared.commit(&mut inner);
        info!("Countdown paused with {}s remaining", inner.state.remaining_seconds);
        self.shared.emit(TimerEvent::Paused {
            remaining_seconds: inner.state.remaining_seconds,
        });

        Ok(inner.state)
    }

    /// Resumes a paused countdown. Resuming while running is a no-op.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if no time remains
    /// - `InvalidState` if the timer was never started
    pub fn resume(&self) -> Result<TimerState, TimerError> {
        let mut inner = self.shared.lock();

        match inner.state.phase {
            TimerPhase::Running => {
                debug!("Resume ignored, already running");
                return Ok(inner.state);
            }
            _ if inner.state.remaining_seconds == 0 => {
                return Err(TimerError::InvalidArgument(
                    "no time remaining to resume".to_string(),
                ));
            }
            TimerPhase::Paused => {}
            phase @ (TimerPhase::Idle | TimerPhase::Completed) => {
                return Err(TimerError::InvalidState {
                    command: "resume",
                    phase,
                });
            }
        }

        self.shared.launch(&mut inner)?;
        self.shared.commit(&mut inner);
        info!("Countdown resumed with {}s remaining", inner.state.remaining_seconds);
        self.shared.emit(TimerEvent::Resumed {
            remaining_seconds: inner.state.remaining_seconds,
        });

        Ok(inner.state)
    }

    /// Stops any countdown and rewinds to the full session.
    pub fn reset(&self) -> Result<TimerState, TimerError> {
        let mut inner = self.shared.lock();

        Shared::cancel(&mut inner);
        inner.state.reset();
        self.shared.commit(&mut inner);
        info!("Timer reset to {}s", inner.state.total_seconds);
        self.shared.emit(TimerEvent::Reset {
            total_seconds: inner.state.total_seconds,
        });

        Ok(inner.state)
    }

    /// Returns a copy of the current state.
    pub fn current_state(&self) -> TimerState {
        self.shared.lock().state
    }

    /// Registers a subscriber. The current snapshot is delivered first.
    pub fn subscribe(&self) -> Subscription {
        let mut inner = self.shared.lock();
        let current = inner.state;
        inner.subscribers.add(current)
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.lock().subscribers.len()
    }

    /// Returns how many snapshots were dropped because a subscriber lagged.
    pub fn dropped_deliveries(&self) -> u64 {
        self.shared.lock().subscribers.dropped()
    }

    /// Returns true while the last write to the state store failed.
    pub fn durability_degraded(&self) -> bool {
        self.shared.lock().persist_failed
    }

    /// Writes the current snapshot to the store right away.
    ///
    /// Unlike commands, which carry on in memory when the store fails, this
    /// reports the failure. The daemon calls it on shutdown.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store rejects the write.
    pub fn flush(&self) -> Result<TimerState, TimerError> {
        let mut inner = self.shared.lock();
        let result = persist::save(self.shared.store.as_ref(), &inner.state);
        inner.persist_failed = result.is_err();
        result?;
        Ok(inner.state)
    }

    /// Returns true if a tick task is active.
    pub fn is_ticking(&self) -> bool {
        self.shared.lock().ticker.is_some()
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &TimerConfig {
        &self.shared.config
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        Shared::cancel(&mut self.shared.lock());
    }
}

// ============================================================================
// Tests
// ============================================================================
