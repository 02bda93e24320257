//! Snapshot codec between [`TimerState`] and the key-value [`StateStore`].
//!
//! Layout:
//!
//! | key                 | value   |
//! |---------------------|---------|
//! | `total_seconds`     | integer |
//! | `remaining_seconds` | integer |
//! | `is_running`        | bool    |
//! | `is_paused`         | bool    |
//!
//! A snapshot written while running is loaded as paused: a restarted
//! process never resumes counting down on its own.

use serde_json::Value;
use tracing::{info, warn};

use super::error::StoreError;
use super::store::StateStore;
use crate::types::{TimerPhase, TimerState};

pub const KEY_TOTAL_SECONDS: &str = "total_seconds";
pub const KEY_REMAINING_SECONDS: &str = "remaining_seconds";
pub const KEY_IS_RUNNING: &str = "is_running";
pub const KEY_IS_PAUSED: &str = "is_paused";

/// Writes `state` to the store as one unit.
///
/// # Errors
///
/// Returns the store's error unchanged.
pub fn save(store: &dyn StateStore, state: &TimerState) -> Result<(), StoreError> {
    store.put_many(&[
        (KEY_TOTAL_SECONDS, Value::from(state.total_seconds)),
        (KEY_REMAINING_SECONDS, Value::from(state.remaining_seconds)),
        (KEY_IS_RUNNING, Value::Bool(state.phase == TimerPhase::Running)),
        (KEY_IS_PAUSED, Value::Bool(state.phase == TimerPhase::Paused)),
    ])
}

/// Outcome of [`load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restored {
    /// The state to start from
    pub state: TimerState,
    /// True if the stored snapshot was taken mid-countdown
    pub interrupted: bool,
}

/// Reads the last snapshot, `None` if nothing was ever saved.
///
/// Values are sanitized rather than rejected: a zero or missing total falls
/// back to `default_total`, a remaining above the total is clamped, and a
/// zero remaining always loads as completed.
///
/// # Errors
///
/// Returns an error if the store cannot be read or a value has the wrong
/// type.
pub fn load(store: &dyn StateStore, default_total: u32) -> Result<Option<Restored>, StoreError> {
    let total = read_u32(store, KEY_TOTAL_SECONDS)?;
    let remaining = read_u32(store, KEY_REMAINING_SECONDS)?;
    let is_running = read_bool(store, KEY_IS_RUNNING)?;
    let is_paused = read_bool(store, KEY_IS_PAUSED)?;

    if total.is_none() && remaining.is_none() && is_running.is_none() && is_paused.is_none() {
        return Ok(None);
    }

    let total_seconds = match total {
        Some(t) if t > 0 => t,
        _ => {
            warn!("Stored total_seconds missing or zero, using {}", default_total);
            default_total
        }
    };
    let remaining_seconds = match remaining {
        Some(r) if r > total_seconds => {
            warn!(
                "Stored remaining_seconds {} exceeds total {}, clamping",
                r, total_seconds
            );
            total_seconds
        }
        Some(r) => r,
        None => total_seconds,
    };

    let is_running = is_running.unwrap_or(false);
    let is_paused = is_paused.unwrap_or(false);

    let phase = if remaining_seconds == 0 {
        TimerPhase::Completed
    } else if is_running || is_paused {
        TimerPhase::Paused
    } else {
        TimerPhase::Idle
    };

    let interrupted = is_running && phase == TimerPhase::Paused;
    if interrupted {
        info!(
            "Restored a running session with {}s left as paused",
            remaining_seconds
        );
    }

    Ok(Some(Restored {
        state: TimerState {
            total_seconds,
            remaining_seconds,
            phase,
        },
        interrupted,
    }))
}

fn read_u32(store: &dyn StateStore, key: &str) -> Result<Option<u32>, StoreError> {
    match store.get(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| StoreError::Malformed(format!("{key} is not a u32: {value}"))),
    }
}

fn read_bool(store: &dyn StateStore, key: &str) -> Result<Option<bool>, StoreError> {
    match store.get(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(value) => Err(StoreError::Malformed(format!(
            "{key} is not a bool: {value}"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
