//! Monitor Actor - the single processing worker.
//!
//! Owns the session store and runs every pass:
//!
//! ```text
//! drain --> prepare --> compile --+--> Compiled --> push to fresh targets --> UP_TO_DATE
//!                                 +--> Cancelled --> requeue_front + re-arm  (no status change)
//!                                 +--> Failed --> report to targets --> PAUSED
//! ```
//!
//! A cancelled compile ends the pass; the retry is a new pass driven by the
//! re-armed debouncer, so there is no recursion and new edits keep merging
//! into the retried batch.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use super::debouncer::Debouncer;
use super::messages::{MonitorMsg, SessionInfo};
use crate::compile::{CompileContext, CompileError, CompileOutcome, Compiler, stage};
use crate::config::ConfigHandle;
use crate::edit::{EditQueue, SessionStore, batch_key};
use crate::push::stage::{push_all, report_compile_failure};
use crate::push::{DeployEvents, Deployer, PushSettings, eligible};
use crate::status::StatusController;

struct ActiveSession {
    info: SessionInfo,
    store: SessionStore,
}

pub(super) struct MonitorActor {
    rx: mpsc::UnboundedReceiver<MonitorMsg>,
    queue: Arc<EditQueue>,
    status: Arc<StatusController>,
    compiler: Arc<dyn Compiler>,
    deployer: Arc<dyn Deployer>,
    events: Arc<dyn DeployEvents>,
    config: ConfigHandle,
    session: Option<ActiveSession>,
    debouncer: Debouncer,
    /// Consecutive cancelled compiles of the current batch.
    retries: u32,
}

impl MonitorActor {
    pub(super) fn new(
        rx: mpsc::UnboundedReceiver<MonitorMsg>,
        queue: Arc<EditQueue>,
        status: Arc<StatusController>,
        compiler: Arc<dyn Compiler>,
        deployer: Arc<dyn Deployer>,
        events: Arc<dyn DeployEvents>,
        config: ConfigHandle,
    ) -> Self {
        let quiet = config.load().debounce.quiet();
        Self {
            rx,
            queue,
            status,
            compiler,
            deployer,
            events,
            config,
            session: None,
            debouncer: Debouncer::new(quiet),
            retries: 0,
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                msg = self.rx.recv() => match msg {
                    Some(MonitorMsg::EditQueued) => {
                        self.debouncer.set_quiet(self.config.load().debounce.quiet());
                        self.debouncer.arm();
                    }
                    Some(MonitorMsg::Bind { session, done }) => {
                        self.bind(session);
                        let _ = done.send(());
                    }
                    Some(MonitorMsg::Disable) => self.disable(),
                    Some(MonitorMsg::Shutdown) | None => break,
                },
                _ = tokio::time::sleep(self.debouncer.sleep_duration()) => {
                    if self.debouncer.take_if_ready() {
                        self.process().await;
                    }
                }
            }
        }
        crate::debug!("monitor"; "stopped");
    }

    fn bind(&mut self, info: SessionInfo) {
        self.queue.clear();
        self.debouncer.disarm();
        self.retries = 0;
        crate::log!("session"; "bound {}", info.application_id);
        self.session = Some(ActiveSession {
            store: SessionStore::new(info.application_id.clone()),
            info,
        });
        self.status.enable();
    }

    fn disable(&mut self) {
        self.queue.clear();
        self.debouncer.disarm();
        self.retries = 0;
        if let Some(session) = self.session.take() {
            crate::log!("session"; "live edit disabled for {}", session.info.application_id);
        }
        self.status.disable();
    }

    /// One processing pass over everything queued so far.
    async fn process(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.queue.clear();
            return;
        };
        let batch = self.queue.drain_all();
        if batch.is_empty() {
            return;
        }

        let config = self.config.load();
        let settings = PushSettings::from(&config.push);
        let key = batch_key(&batch.events);

        self.status.begin_pass();
        crate::debug!("monitor"; "pass {}: {} edits", key, batch.len());

        let inputs = stage::prepare(&mut session.store, &batch.events);
        let ctx = CompileContext::new(Arc::clone(&self.queue), batch.generation, batch.units());
        let compiler = Arc::clone(&self.compiler);

        let started = Instant::now();
        let outcome =
            tokio::task::spawn_blocking(move || stage::compile(compiler.as_ref(), &inputs, &ctx))
                .await
                .unwrap_or_else(|e| {
                    CompileOutcome::Failed(CompileError::Internal(format!(
                        "compiler task failed: {e}"
                    )))
                });
        let compile_ms = started.elapsed().as_millis();

        match outcome {
            CompileOutcome::Cancelled => {
                self.retries += 1;
                crate::debug!(
                    "compile";
                    "{} cancelled after {}ms, retry #{}", key, compile_ms, self.retries
                );
                self.queue.requeue_front(batch.events);
                self.debouncer.arm();
            }
            CompileOutcome::Failed(error) => {
                self.retries = 0;
                crate::log!("compile"; "{}", error);
                let targets = eligible(
                    session.info.targets.live_targets(&session.info.application_id),
                    settings.min_api_level,
                );
                report_compile_failure(self.events.as_ref(), &targets, &key, &error);
                self.status.fail_pass(&error);
            }
            CompileOutcome::Compiled(artifacts) => {
                self.retries = 0;
                // Enumerated per pass, targets come and go between passes
                let targets = eligible(
                    session.info.targets.live_targets(&session.info.application_id),
                    settings.min_api_level,
                );
                let target_count = targets.len();

                let started = Instant::now();
                let report = push_all(
                    Arc::clone(&self.deployer),
                    Arc::clone(&self.events),
                    targets,
                    &artifacts,
                    &settings,
                    &key,
                )
                .await;
                let push_ms = started.elapsed().as_millis();

                crate::debug!(
                    "monitor";
                    "{}: {} artifacts to {} targets (compile: {}ms, push: {}ms)",
                    key, artifacts.len(), target_count, compile_ms, push_ms
                );
                self.status.finish_pass(&report);
            }
        }
    }
}
