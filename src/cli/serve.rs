//! `liveedit serve`: the long-running monitor.
//!
//! ```text
//! stdin (JSON lines) --> DeployMonitor --> CommandCompiler --> AgentHub --> devices
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;

use crate::actor::{Coordinator, DeployMonitor};
use crate::agent::{AgentHub, start_agent_server};
use crate::cli::ServeArgs;
use crate::compile::CommandCompiler;
use crate::config::ConfigHandle;
use crate::push::{DeployEvents, Target};
use crate::status::{EditStatus, StatusListener};
use crate::{debug, input, log, logger};

/// Mirrors the observer view of the monitor into the terminal status block.
///
/// Stored transitions arrive through [`StatusListener`]; agents joining or
/// leaving only change the view, so the serve loop calls [`refresh`] too.
///
/// [`refresh`]: TerminalStatus::refresh
struct TerminalStatus {
    monitor: DeployMonitor,
    shown: Mutex<Option<EditStatus>>,
}

impl TerminalStatus {
    fn new(monitor: DeployMonitor) -> Self {
        Self {
            monitor,
            shown: Mutex::new(None),
        }
    }

    /// Redraw if the view differs from what is on screen.
    fn refresh(&self) -> bool {
        let current = self.monitor.status();
        let mut shown = self.shown.lock();
        if shown.as_ref() == Some(&current) {
            return false;
        }
        logger::status_show(&current);
        *shown = Some(current);
        true
    }
}

impl StatusListener for TerminalStatus {
    fn on_status_changed(&self, _old: &EditStatus, _new: &EditStatus) {
        self.refresh();
    }
}

/// Logs the push lifecycle of every target.
struct LogEvents;

impl DeployEvents for LogEvents {
    fn push_started(&self, target: &Target, key: &str) {
        debug!("push"; "{} -> {}", key, target.label());
    }

    fn pushed(&self, target: &Target, key: &str, problems: &[String]) {
        match problems {
            [] => debug!("push"; "{} done on {}", key, target.id),
            [first, ..] => debug!("push"; "{} on {}: {}", key, target.id, first),
        }
    }
}

pub fn run(args: &ServeArgs, config: ConfigHandle) -> Result<()> {
    apply_overrides(args, &config);
    let snapshot = config.load();

    let Some(compiler) = CommandCompiler::from_config(&snapshot) else {
        bail!(
            "no compiler configured, set `command` in the [compiler] section of {}",
            snapshot.config_path.display()
        );
    };
    let program = compiler.resolve()?;
    debug!("compile"; "using {}", program.display());

    let hub = AgentHub::new(config.clone());
    let port = start_agent_server(snapshot.agent.interface, snapshot.agent.port, hub.clone())?;
    log!("agent"; "listening on ws://{}:{}", snapshot.agent.interface, port);

    // Keep the watcher alive for the whole session
    let _watcher = match config.watch() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            log!("config"; "not watching {}: {}", snapshot.config_path.display(), e);
            None
        }
    };

    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let monitor = Coordinator::new(config.clone(), Arc::new(compiler), Arc::new(hub.clone()))
            .with_events(Arc::new(LogEvents))
            .start();
        let terminal = Arc::new(TerminalStatus::new(monitor.clone()));
        monitor.subscribe(terminal.clone());

        monitor.bind_session(args.app.clone(), Arc::new(hub)).await?;
        log!("session"; "waiting for edits on stdin");
        let reader = input::spawn_stdin_reader(monitor.clone());
        let mut input_open = true;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                log!("session"; "shutting down...");
                break;
            }
            if input_open && reader.is_finished() {
                input_open = false;
                debug!("input"; "stdin closed, still serving agents");
            }
            terminal.refresh();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        monitor.disable();
        monitor.shutdown().await;
        logger::status_detach();
        anyhow::Ok(())
    })
}

/// CLI flags win over the file for this run.
fn apply_overrides(args: &ServeArgs, config: &ConfigHandle) {
    if args.port.is_none() && args.interface.is_none() {
        return;
    }
    let mut updated = (*config.load()).clone();
    if let Some(port) = args.port {
        updated.agent.port = port;
    }
    if let Some(interface) = args.interface {
        updated.agent.interface = interface;
    }
    config.store(updated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{CompileContext, CompileFailure, CompileInput, CompiledArtifact, Compiler};
    use crate::config::MonitorConfig;
    use crate::push::{Deployer, PatchError, PatchSession, TargetSet};

    struct Idle;

    impl Compiler for Idle {
        fn compile(
            &self,
            _inputs: &[CompileInput],
            _ctx: &CompileContext,
        ) -> Result<Vec<CompiledArtifact>, CompileFailure> {
            Ok(Vec::new())
        }
    }

    impl Deployer for Idle {
        fn connect(&self, target: &Target) -> Result<Box<dyn PatchSession>, PatchError> {
            Err(PatchError::Connect {
                target: target.id.clone(),
                reason: "offline".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_terminal_follows_target_presence() {
        let config = ConfigHandle::new(MonitorConfig::default());
        let monitor = Coordinator::new(config, Arc::new(Idle), Arc::new(Idle)).start();
        let terminal = Arc::new(TerminalStatus::new(monitor.clone()));
        monitor.subscribe(terminal.clone());

        let targets = TargetSet::new();
        monitor
            .bind_session("app", Arc::new(targets.clone()))
            .await
            .unwrap();
        // The bind notification already drew the no-target view
        assert_eq!(*terminal.shown.lock(), Some(EditStatus::NO_TARGETS));
        assert!(!terminal.refresh());

        targets.connect(Target::new("pixel", "app", 34));
        assert!(terminal.refresh());
        assert_eq!(*terminal.shown.lock(), Some(EditStatus::UP_TO_DATE));

        targets.disconnect(&Target::new("pixel", "app", 34).id);
        assert!(terminal.refresh());
        assert_eq!(*terminal.shown.lock(), Some(EditStatus::NO_TARGETS));

        monitor.shutdown().await;
    }
}
