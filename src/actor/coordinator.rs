//! Actor Coordinator - wires up the monitor and hands out its handle.
//!
//! The Coordinator is a thin builder: it creates the queue, the status cell
//! and the channel, spawns the monitor actor, and returns a cloneable
//! [`DeployMonitor`] that producers and observers talk to.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::MonitorError;
use super::messages::{MonitorMsg, SessionInfo};
use super::monitor::MonitorActor;
use crate::compile::Compiler;
use crate::config::ConfigHandle;
use crate::edit::{EditEvent, EditQueue};
use crate::push::{DeployEvents, Deployer, NoEvents, TargetProvider, eligible};
use crate::status::{EditStatus, StatusController, StatusListener};

/// Builder for a running [`DeployMonitor`].
pub struct Coordinator {
    config: ConfigHandle,
    compiler: Arc<dyn Compiler>,
    deployer: Arc<dyn Deployer>,
    events: Arc<dyn DeployEvents>,
    listeners: Vec<Arc<dyn StatusListener>>,
}

impl Coordinator {
    pub fn new(config: ConfigHandle, compiler: Arc<dyn Compiler>, deployer: Arc<dyn Deployer>) -> Self {
        Self {
            config,
            compiler,
            deployer,
            events: Arc::new(NoEvents),
            listeners: Vec::new(),
        }
    }

    /// Set the push lifecycle observer.
    pub fn with_events(mut self, events: Arc<dyn DeployEvents>) -> Self {
        self.events = events;
        self
    }

    /// Add a status listener, registered before the monitor starts.
    pub fn with_listener(mut self, listener: Arc<dyn StatusListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Spawn the monitor actor. Must be called inside a tokio runtime.
    pub fn start(self) -> DeployMonitor {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(EditQueue::new());
        let status = Arc::new(StatusController::new());
        for listener in self.listeners {
            status.subscribe(listener);
        }

        let actor = MonitorActor::new(
            rx,
            Arc::clone(&queue),
            Arc::clone(&status),
            self.compiler,
            self.deployer,
            self.events,
            self.config.clone(),
        );
        crate::debug!("monitor"; "start");
        let task = tokio::spawn(actor.run());

        DeployMonitor {
            queue,
            status,
            tx,
            session: Arc::new(ArcSwapOption::empty()),
            config: self.config,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Handle to a running monitor. Cheap to clone, usable from any thread.
#[derive(Clone)]
pub struct DeployMonitor {
    queue: Arc<EditQueue>,
    status: Arc<StatusController>,
    tx: mpsc::UnboundedSender<MonitorMsg>,
    /// Bound session, read by the derived status view.
    session: Arc<ArcSwapOption<SessionInfo>>,
    config: ConfigHandle,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DeployMonitor {
    /// Report an edit. Never blocks; ignored while disabled.
    ///
    /// Returns whether the edit was accepted.
    pub fn on_edit(&self, event: EditEvent) -> bool {
        if self.status.is_disabled() {
            crate::debug!("monitor"; "disabled, ignoring {}", event);
            return false;
        }
        self.queue.enqueue(event);
        self.tx.send(MonitorMsg::EditQueued).is_ok()
    }

    /// Start a new application session.
    ///
    /// Pending edits and all function state of the previous session are
    /// dropped. Resolves once the monitor switched over.
    pub async fn bind_session(
        &self,
        application_id: impl Into<String>,
        targets: Arc<dyn TargetProvider>,
    ) -> Result<(), MonitorError> {
        let session = SessionInfo {
            application_id: application_id.into(),
            targets,
        };
        self.session.store(Some(Arc::new(session.clone())));

        let (done, ack) = oneshot::channel();
        self.tx
            .send(MonitorMsg::Bind { session, done })
            .map_err(|_| MonitorError::Closed)?;
        ack.await.map_err(|_| MonitorError::Closed)
    }

    /// Status as observers should see it: PAUSED when no eligible target is live.
    pub fn status(&self) -> EditStatus {
        self.status.view(self.has_live_targets())
    }

    /// Raw stored status, without the no-target view.
    pub fn stored_status(&self) -> EditStatus {
        self.status.stored()
    }

    pub fn has_live_targets(&self) -> bool {
        let min_api_level = self.config.load().push.min_api_level;
        self.session.load().as_ref().is_some_and(|session| {
            !eligible(
                session.targets.live_targets(&session.application_id),
                min_api_level,
            )
            .is_empty()
        })
    }

    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) {
        self.status.subscribe(listener);
    }

    /// Turn live edit off until the next `bind_session`.
    pub fn disable(&self) {
        self.status.disable();
        self.queue.clear();
        self.session.store(None);
        let _ = self.tx.send(MonitorMsg::Disable);
    }

    /// Number of edits waiting for the next pass.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Stop the monitor and wait for the running pass to finish.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(MonitorMsg::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
