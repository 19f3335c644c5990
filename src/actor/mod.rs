//! Actor System for Live Edit
//!
//! One monitor actor owns every processing pass, so passes never overlap:
//!
//! ```text
//! on_edit --> EditQueue --EditQueued--> MonitorActor --> Compiler --> push fan-out
//!   (any thread)    ^                  (debounce, pass)                (task per target)
//!                   |                         |
//!                   +------ requeue_front ----+  (compile cancelled)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types sent to the monitor
//! - `debouncer` - Single re-armed quiet-period deadline
//! - `monitor` - The processing worker
//! - `coordinator` - Builds the monitor and hands out the `DeployMonitor` handle

pub mod coordinator;
mod debouncer;
pub mod messages;
mod monitor;


pub use coordinator::{Coordinator, DeployMonitor};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// The monitor task is gone (shut down or panicked).
    #[error("deploy monitor is not running")]
    Closed,
}
