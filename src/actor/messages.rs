//! Actor Message Definitions
//!
//! ```text
//! DeployMonitor --EditQueued/Bind/Disable/Shutdown--> MonitorActor
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::push::TargetProvider;

/// Application session the monitor pushes into.
#[derive(Clone)]
pub struct SessionInfo {
    pub application_id: String,
    pub targets: Arc<dyn TargetProvider>,
}

impl fmt::Debug for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionInfo")
            .field("application_id", &self.application_id)
            .finish_non_exhaustive()
    }
}

/// Messages to the monitor actor
#[derive(Debug)]
pub enum MonitorMsg {
    /// An edit landed in the queue, re-arm the quiet period
    EditQueued,
    /// Start a fresh session; `done` fires once the store was reset
    Bind {
        session: SessionInfo,
        done: oneshot::Sender<()>,
    },
    /// Drop the session and pending work until the next bind
    Disable,
    Shutdown,
}
