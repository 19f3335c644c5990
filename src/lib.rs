//! liveedit - push function edits into running apps without restarting them.
//!
//! Edits flow through one monitor per application session:
//!
//! ```text
//! on_edit --> EditQueue --> debounce --> compile --> push to every target --> status
//!                 ^                         |
//!                 +------- cancelled -------+
//! ```
//!
//! Start with [`actor::Coordinator`], which wires a [`compile::Compiler`] and
//! a [`push::Deployer`] into a running [`actor::DeployMonitor`].

pub mod logger;

pub mod actor;
pub mod agent;
pub mod cli;
pub mod compile;
pub mod config;
pub mod edit;
pub mod input;
pub mod push;
pub mod status;
