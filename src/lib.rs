//! Meditation Timer Library
//!
//! This library provides the core functionality for the meditation timer.
//! It includes:
//! - Countdown engine with pluggable clock and persistence
//! - Non-blocking fan-out of state snapshots to subscribers
//! - IPC server/client for daemon-CLI communication
//! - CLI command parsing and display utilities
//! - Type definitions for configuration and state

pub mod cli;
pub mod config;
pub mod daemon;
pub mod types;

// Re-export commonly used types for convenience
pub use config::DaemonConfig;
pub use daemon::{
    Clock, JsonFileStore, ManualClock, MemoryStore, StateStore, StoreError, Subscription,
    SystemClock, TimerEngine, TimerError, TimerEvent,
};
pub use types::{IpcRequest, IpcResponse, ResponseData, TimerConfig, TimerPhase, TimerState};
