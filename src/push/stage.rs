//! Fan-out of one batch to all targets.
//!
//! Every target gets its own blocking task, so a slow or broken device only
//! delays its own report. Errors stay per target; the pass as a whole always
//! completes.

use std::sync::Arc;

use tokio::task::JoinSet;

use super::{DeployEvents, Deployer, PatchError, PatchRequest, PushSettings, Target};
use crate::compile::{CompileError, CompiledArtifact};

/// Outcome of pushing a batch to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: Target,
    /// Number of patches the target accepted.
    pub applied: usize,
    pub errors: Vec<PatchError>,
}

impl TargetReport {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            applied: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn problems(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Outcome of one push stage, ordered by target id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub targets: Vec<TargetReport>,
}

impl PushReport {
    pub fn is_clean(&self) -> bool {
        self.targets.iter().all(TargetReport::is_ok)
    }

    pub fn failed_targets(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|t| !t.is_ok())
    }

    pub fn applied_total(&self) -> usize {
        self.targets.iter().map(|t| t.applied).sum()
    }

    /// Status message for a pass with push errors, `None` when clean.
    pub fn summary(&self) -> Option<String> {
        let failed: Vec<_> = self.failed_targets().collect();
        let first = failed.first()?.errors.first()?;
        Some(format!(
            "Changes applied with errors on {} of {} targets: {}",
            failed.len(),
            self.targets.len(),
            first
        ))
    }
}

/// Push `artifacts` to every target concurrently.
pub async fn push_all(
    deployer: Arc<dyn Deployer>,
    events: Arc<dyn DeployEvents>,
    targets: Vec<Target>,
    artifacts: &[CompiledArtifact],
    settings: &PushSettings,
    key: &str,
) -> PushReport {
    if targets.is_empty() || artifacts.is_empty() {
        return PushReport::default();
    }

    let requests: Arc<Vec<PatchRequest>> = Arc::new(
        artifacts
            .iter()
            .map(|a| PatchRequest::from_artifact(a, settings))
            .collect(),
    );

    let mut tasks = JoinSet::new();
    for target in targets.iter().cloned() {
        let deployer = Arc::clone(&deployer);
        let events = Arc::clone(&events);
        let requests = Arc::clone(&requests);
        let key = key.to_string();
        tasks.spawn_blocking(move || {
            push_target(deployer.as_ref(), events.as_ref(), target, &requests, &key)
        });
    }

    let mut reports = Vec::with_capacity(targets.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => crate::log!("push"; "push task failed: {}", e),
        }
    }

    // A task that died never reported; its target still counts as failed
    for target in targets {
        if !reports.iter().any(|r| r.target.id == target.id) {
            let mut report = TargetReport::new(target);
            report.errors.push(PatchError::Transport {
                target: report.target.id.clone(),
                reason: "push task aborted".into(),
            });
            reports.push(report);
        }
    }

    reports.sort_by(|a, b| a.target.id.cmp(&b.target.id));
    PushReport { targets: reports }
}

/// Deliver every request to one target. Each request is attempted on its own;
/// only a session that reports itself unusable ends the target early.
fn push_target(
    deployer: &dyn Deployer,
    events: &dyn DeployEvents,
    target: Target,
    requests: &[PatchRequest],
    key: &str,
) -> TargetReport {
    events.push_started(&target, key);
    let mut report = TargetReport::new(target);

    match deployer.connect(&report.target) {
        Ok(mut session) => {
            for request in requests {
                match session.apply_patch(request) {
                    Ok(()) => report.applied += 1,
                    Err(e) => report.errors.push(e),
                }
                if !session.is_usable() {
                    let skipped = requests.len() - report.applied - report.errors.len();
                    if skipped > 0 {
                        crate::debug!(
                            "push";
                            "{}: connection lost, {} patches skipped",
                            report.target.label(),
                            skipped
                        );
                    }
                    break;
                }
            }
        }
        Err(e) => report.errors.push(e),
    }

    if report.is_ok() {
        crate::debug!("push"; "{}: applied {} patches", report.target.label(), report.applied);
    } else {
        crate::log!("push"; "{}: {}", report.target.label(), report.errors[0]);
    }
    events.pushed(&report.target, key, &report.problems());
    report
}

/// Tell every target's event sink that the batch failed to compile.
pub fn report_compile_failure(
    events: &dyn DeployEvents,
    targets: &[Target],
    key: &str,
    error: &CompileError,
) {
    let problems = [error.message()];
    for target in targets {
        events.push_started(target, key);
        events.pushed(target, key, &problems);
    }
}
