//! Core data types for the meditation timer.
//!
//! This module defines the data structures used for:
//! - Timer state snapshots
//! - Engine configuration with validation
//! - IPC request/response serialization

use serde::{Deserialize, Serialize};

/// Session length used when nothing has been configured or persisted.
pub const DEFAULT_SESSION_SECONDS: u32 = 900;

// ============================================================================
// TimerPhase
// ============================================================================

/// Represents the current phase of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// Timer is configured but not counting down
    #[default]
    Idle,
    /// Tick loop is active
    Running,
    /// Countdown suspended, remaining time kept
    Paused,
    /// Countdown reached zero
    Completed,
}

impl TimerPhase {
    /// Returns the string representation of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
            TimerPhase::Completed => "completed",
        }
    }

    /// Returns true if the timer is actively counting down.
    pub fn is_active(&self) -> bool {
        matches!(self, TimerPhase::Running)
    }
}

// ============================================================================
// TimerConfig
// ============================================================================

fn default_minutes() -> u32 {
    DEFAULT_SESSION_SECONDS / 60
}

fn default_max_minutes() -> u32 {
    24 * 60
}

fn default_subscriber_buffer() -> usize {
    64
}

/// Upper bound for `max_minutes`, keeps `minutes * 60` well inside `u32`.
const MAX_MINUTES_CEILING: u32 = 10_000;

/// Configuration for the timer engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Session length in minutes when no snapshot is stored
    #[serde(default = "default_minutes")]
    pub default_minutes: u32,
    /// Longest session accepted by `set_duration`
    #[serde(default = "default_max_minutes")]
    pub max_minutes: u32,
    /// Queue depth of each subscriber
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            default_minutes: default_minutes(),
            max_minutes: default_max_minutes(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl TimerConfig {
    /// Creates a new configuration with the specified default session length.
    pub fn with_default_minutes(mut self, minutes: u32) -> Self {
        self.default_minutes = minutes;
        self
    }

    /// Creates a new configuration with the specified maximum session length.
    pub fn with_max_minutes(mut self, minutes: u32) -> Self {
        self.max_minutes = minutes;
        self
    }

    /// Creates a new configuration with the specified subscriber queue depth.
    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer;
        self
    }

    /// Returns the default session length in seconds.
    pub fn default_seconds(&self) -> u32 {
        self.default_minutes.saturating_mul(60)
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_minutes < 1 || self.max_minutes > MAX_MINUTES_CEILING {
            return Err(format!(
                "max_minutes must be between 1 and {MAX_MINUTES_CEILING}"
            ));
        }
        if self.default_minutes < 1 || self.default_minutes > self.max_minutes {
            return Err(format!(
                "default_minutes must be between 1 and {}",
                self.max_minutes
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err("subscriber_buffer must be at least 1".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// TimerState
// ============================================================================

/// Immutable snapshot of the timer.
///
/// The engine keeps its own copy and hands out copies to subscribers and to
/// the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    /// Configured session length
    pub total_seconds: u32,
    /// Time left, never above `total_seconds`
    pub remaining_seconds: u32,
    /// Current phase of the timer
    pub phase: TimerPhase,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::idle(DEFAULT_SESSION_SECONDS)
    }
}

impl TimerState {
    /// Creates an idle state with a full session of `total_seconds`.
    pub fn idle(total_seconds: u32) -> Self {
        let total_seconds = total_seconds.max(1);
        Self {
            total_seconds,
            remaining_seconds: total_seconds,
            phase: TimerPhase::Idle,
        }
    }

    /// Replaces the session length and rewinds to idle.
    pub(crate) fn set_total(&mut self, total_seconds: u32) {
        *self = Self::idle(total_seconds);
    }

    /// Rewinds to idle, keeping the session length.
    pub(crate) fn reset(&mut self) {
        self.remaining_seconds = self.total_seconds;
        self.phase = TimerPhase::Idle;
    }

    /// Decrements the timer by one second.
    ///
    /// Returns true if the timer has completed (reached 0). The phase
    /// becomes `Completed` on that tick.
    pub(crate) fn tick(&mut self) -> bool {
        if self.remaining_seconds > 0 {
            self.remaining_seconds -= 1;
        }
        if self.remaining_seconds == 0 {
            self.phase = TimerPhase::Completed;
            return true;
        }
        false
    }

    /// Returns seconds already counted down in this session.
    pub fn elapsed_seconds(&self) -> u32 {
        self.total_seconds - self.remaining_seconds
    }

    /// Returns true if the timer is actively running.
    pub fn is_running(&self) -> bool {
        self.phase.is_active()
    }

    /// Returns true if the timer is paused.
    pub fn is_paused(&self) -> bool {
        self.phase == TimerPhase::Paused
    }

    /// Returns true if the countdown reached zero.
    pub fn is_completed(&self) -> bool {
        self.phase == TimerPhase::Completed
    }
}

// ============================================================================
// IPC Types
// ============================================================================

/// IPC request from client to daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Change the session length
    SetDuration {
        /// Session length in minutes
        minutes: u32,
    },
    /// Start the countdown
    Start,
    /// Pause the countdown
    Pause,
    /// Resume a paused countdown
    Resume,
    /// Rewind to the full session
    Reset,
    /// Query the current status
    Status,
    /// Stream every state change until the client disconnects
    Watch,
}

/// Response data for IPC responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    /// Current phase
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Remaining seconds
    #[serde(rename = "remainingSeconds", skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u32>,
    /// Session length in seconds
    #[serde(rename = "totalSeconds", skip_serializing_if = "Option::is_none")]
    pub total_seconds: Option<u32>,
}

impl ResponseData {
    /// Creates response data from a timer snapshot.
    pub fn from_timer_state(state: &TimerState) -> Self {
        Self {
            state: Some(state.phase.as_str().to_string()),
            remaining_seconds: Some(state.remaining_seconds),
            total_seconds: Some(state.total_seconds),
        }
    }
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Optional response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    /// Returns true if this is an error response.
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

// ============================================================================
// Tests
// ============================================================================
