//! Daemon module for the meditation timer.
//!
//! This module contains the core daemon functionality:
//! - `timer`: Countdown engine with state transitions and ticking
//! - `clock`: Time source abstraction (system and manual)
//! - `store`: Key-value persistence backends
//! - `persist`: Snapshot layout inside the store
//! - `subscription`: Non-blocking fan-out of snapshots
//! - `ipc`: Unix socket request handling
//! - `server`: Daemon process entry point

pub mod clock;
pub mod error;
pub mod ipc;
pub mod persist;
pub mod server;
pub mod store;
pub mod subscription;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, TimerError};
pub use ipc::{IpcError, IpcServer, RequestHandler};
pub use store::{JsonFileStore, MemoryStore, StateStore};
pub use subscription::{SubscriberId, Subscription};
pub use timer::{TimerEngine, TimerEvent};
