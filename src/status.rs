//! Live edit status state machine.
//!
//! ```text
//!            bind                     batch accepted
//! DISABLED --------> UP_TO_DATE <-------------------+
//!    ^                   |                          |
//!    | disable           | batch accepted           | push done
//!    |                   v                          |
//!    +-------------- IN_PROGRESS -------------------+
//!                        |
//!                        | compile error
//!                        v
//!                      PAUSED --(batch accepted)--> IN_PROGRESS
//! ```
//!
//! The current status lives in one atomically swapped cell. Every transition
//! is a compare-and-update, and listeners hear about it only when the stored
//! value actually changed. "No targets" is never stored: it is a read-side
//! view computed by [`StatusController::view`].

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;

use crate::compile::CompileError;
use crate::push::PushReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditState {
    /// Feature off, edits are ignored until the next session bind.
    Disabled,
    /// No eligible target, or the last attempt failed.
    Paused,
    /// A pass is compiling or pushing.
    InProgress,
    /// The last pass completed.
    UpToDate,
}

impl EditState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Paused => "paused",
            Self::InProgress => "in progress",
            Self::UpToDate => "up to date",
        }
    }

    /// Precedence when combining the statuses of several monitors.
    fn precedence(self) -> u8 {
        match self {
            Self::Paused => 0,
            Self::InProgress => 1,
            Self::UpToDate => 2,
            Self::Disabled => 3,
        }
    }
}

/// `{state, message}` pair shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditStatus {
    state: EditState,
    message: Cow<'static, str>,
}

impl EditStatus {
    pub const DISABLED: Self = Self::fixed(EditState::Disabled, "");
    pub const UP_TO_DATE: Self = Self::fixed(EditState::UpToDate, "All changes applied.");
    pub const IN_PROGRESS: Self =
        Self::fixed(EditState::InProgress, "Live edit update in progress");
    pub const NO_TARGETS: Self =
        Self::fixed(EditState::Paused, "No apps are ready to receive live edits");

    const fn fixed(state: EditState, message: &'static str) -> Self {
        Self {
            state,
            message: Cow::Borrowed(message),
        }
    }

    pub fn new(state: EditState, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    pub fn paused(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(EditState::Paused, message)
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Combine statuses from several monitors into the one to display.
    pub fn merge<'a>(statuses: impl IntoIterator<Item = &'a EditStatus>) -> EditStatus {
        statuses
            .into_iter()
            .min_by_key(|s| s.state.precedence())
            .cloned()
            .unwrap_or(Self::DISABLED)
    }
}

impl fmt::Display for EditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(self.state.label())
        } else {
            write!(f, "{}: {}", self.state.label(), self.message)
        }
    }
}

/// Observer of stored status transitions.
pub trait StatusListener: Send + Sync {
    fn on_status_changed(&self, old: &EditStatus, new: &EditStatus);
}

impl<F> StatusListener for F
where
    F: Fn(&EditStatus, &EditStatus) + Send + Sync,
{
    fn on_status_changed(&self, old: &EditStatus, new: &EditStatus) {
        self(old, new)
    }
}

/// Owner of the single shared status cell.
pub struct StatusController {
    cell: ArcSwap<EditStatus>,
    listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
}

impl StatusController {
    /// A controller starts disabled: no application session is bound yet.
    pub fn new() -> Self {
        Self {
            cell: ArcSwap::from_pointee(EditStatus::DISABLED),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) {
        self.listeners.write().push(listener);
    }

    /// Raw stored status.
    pub fn stored(&self) -> EditStatus {
        (**self.cell.load()).clone()
    }

    pub fn is_disabled(&self) -> bool {
        self.cell.load().state == EditState::Disabled
    }

    /// Status as observers should see it.
    ///
    /// Without a live target every non-disabled state reads as PAUSED; the
    /// stored value is left alone.
    pub fn view(&self, has_live_targets: bool) -> EditStatus {
        let stored = self.stored();
        if stored.state == EditState::Disabled || has_live_targets {
            stored
        } else {
            EditStatus::NO_TARGETS
        }
    }

    /// A batch was accepted for processing.
    pub fn begin_pass(&self) -> bool {
        self.transition(|current| match current.state {
            EditState::Disabled => current.clone(),
            _ => EditStatus::IN_PROGRESS,
        })
    }

    /// The pass pushed its artifacts; push errors are reported, not fatal.
    pub fn finish_pass(&self, report: &PushReport) -> bool {
        let next = match report.summary() {
            Some(summary) => EditStatus::new(EditState::UpToDate, summary),
            None => EditStatus::UP_TO_DATE,
        };
        self.transition(|current| match current.state {
            EditState::Disabled => current.clone(),
            _ => next.clone(),
        })
    }

    /// The pass hit a hard compile failure.
    pub fn fail_pass(&self, error: &CompileError) -> bool {
        let next = EditStatus::paused(error.message());
        self.transition(|current| match current.state {
            EditState::Disabled => current.clone(),
            _ => next.clone(),
        })
    }

    /// A new application session was bound.
    pub fn enable(&self) -> bool {
        self.transition(|_| EditStatus::UP_TO_DATE)
    }

    pub fn disable(&self) -> bool {
        self.transition(|_| EditStatus::DISABLED)
    }

    /// Compare-and-update the cell, notifying listeners if the value changed.
    fn transition(&self, update: impl Fn(&EditStatus) -> EditStatus) -> bool {
        let mut next = None;
        let old = self.cell.rcu(|current| {
            let value = Arc::new(update(current));
            next = Some(Arc::clone(&value));
            value
        });
        let Some(new) = next else {
            return false;
        };
        if *old == *new {
            return false;
        }

        crate::debug!("status"; "{} -> {}", old.state.label(), new.state.label());
        // Snapshot so a listener may subscribe from inside its callback
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_status_changed(&old, &new);
        }
        true
    }
}

impl Default for StatusController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::push::{Target, TargetReport};

    fn recorder(controller: &StatusController) -> Arc<Mutex<Vec<(EditState, EditState)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        controller.subscribe(Arc::new(move |old: &EditStatus, new: &EditStatus| {
            sink.lock().push((old.state(), new.state()));
        }));
        log
    }

    #[test]
    fn test_starts_disabled_and_ignores_passes() {
        let controller = StatusController::new();
        let log = recorder(&controller);

        assert!(!controller.begin_pass());
        assert!(!controller.fail_pass(&CompileError::Compilation("x".into())));
        assert!(controller.is_disabled());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_pass_lifecycle_notifies_on_change_only() {
        let controller = StatusController::new();
        let log = recorder(&controller);

        controller.enable();
        controller.begin_pass();
        // Already in progress: no second notification
        controller.begin_pass();
        controller.finish_pass(&PushReport::default());

        assert_eq!(
            *log.lock(),
            vec![
                (EditState::Disabled, EditState::UpToDate),
                (EditState::UpToDate, EditState::InProgress),
                (EditState::InProgress, EditState::UpToDate),
            ]
        );
    }

    #[test]
    fn test_compile_failure_pauses_with_message() {
        let controller = StatusController::new();
        controller.enable();
        controller.begin_pass();
        controller.fail_pass(&CompileError::Compilation("unresolved reference: foo".into()));

        let status = controller.stored();
        assert_eq!(status.state(), EditState::Paused);
        assert!(status.message().contains("unresolved reference: foo"));

        // Next accepted batch resumes
        assert!(controller.begin_pass());
        assert_eq!(controller.stored().state(), EditState::InProgress);
    }

    #[test]
    fn test_push_errors_reported_on_up_to_date() {
        let controller = StatusController::new();
        controller.enable();
        controller.begin_pass();

        let mut failed = TargetReport::new(Target::new("emulator-5554", "app", 33));
        failed.errors.push(crate::push::PatchError::Transport {
            target: failed.target.id.clone(),
            reason: "broken pipe".into(),
        });
        let report = PushReport {
            targets: vec![failed, TargetReport::new(Target::new("pixel", "app", 34))],
        };
        controller.finish_pass(&report);

        let status = controller.stored();
        assert_eq!(status.state(), EditState::UpToDate);
        assert!(status.message().contains("broken pipe"));
    }

    #[test]
    fn test_view_without_targets_is_derived() {
        let controller = StatusController::new();
        let log = recorder(&controller);
        controller.enable();

        assert_eq!(controller.view(false), EditStatus::NO_TARGETS);
        assert_eq!(controller.stored(), EditStatus::UP_TO_DATE);
        assert_eq!(controller.view(true), EditStatus::UP_TO_DATE);
        assert!(!log.lock().iter().any(|(_, new)| *new == EditState::Paused));

        controller.disable();
        assert_eq!(controller.view(false), EditStatus::DISABLED);
    }

    #[test]
    fn test_listener_may_subscribe_during_notification() {
        let controller = Arc::new(StatusController::new());
        let late = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&controller);
        let sink = Arc::clone(&late);
        let added = Mutex::new(false);
        controller.subscribe(Arc::new(move |_: &EditStatus, _: &EditStatus| {
            let mut added = added.lock();
            if !*added {
                *added = true;
                let sink = Arc::clone(&sink);
                inner.subscribe(Arc::new(move |_: &EditStatus, new: &EditStatus| {
                    sink.lock().push(new.state());
                }));
            }
        }));

        controller.enable();
        controller.begin_pass();
        // Subscribed during the first transition, hears only the second
        assert_eq!(*late.lock(), vec![EditState::InProgress]);
    }

    #[test]
    fn test_merge_precedence() {
        let paused = EditStatus::paused("boom");
        let all = [EditStatus::UP_TO_DATE, paused.clone(), EditStatus::IN_PROGRESS];
        assert_eq!(EditStatus::merge(&all), paused);
        assert_eq!(
            EditStatus::merge(&[EditStatus::DISABLED, EditStatus::UP_TO_DATE]),
            EditStatus::UP_TO_DATE
        );
        assert_eq!(EditStatus::merge(&[]), EditStatus::DISABLED);
    }
}
