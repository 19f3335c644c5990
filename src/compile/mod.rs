//! Compile stage: edit batches to loadable patch artifacts.
//!
//! The language compiler itself is a collaborator behind the [`Compiler`]
//! trait. This module owns what happens around it:
//!
//! - bookkeeping of the latest edit per function ([`stage::prepare`])
//! - per-function deduplication of the batch
//! - classifying the result as compiled, cancelled (retry) or failed
//!
//! Cancellation is cooperative. A compiler calls
//! [`CompileContext::checkpoint`] between expensive steps and bails out with
//! [`CompileFailure::Cancelled`] once a unit of the batch was edited again.

pub mod command;
pub mod stage;

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::edit::{EditQueue, FunctionId, Offset, UnitId};

pub use command::CommandCompiler;
pub use stage::CompileOutcome;

/// Kind of compiled function, decides whether partial application applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    #[default]
    Plain,
    /// UI function that the runtime can recompose in place.
    Composable,
}

/// One deduplicated compile unit: the latest known edit of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInput {
    pub unit: UnitId,
    pub function: FunctionId,
    /// Sequence number of the edit this input reflects.
    pub seq: u64,
    pub offset: Offset,
    /// Offset of the function when first edited in this session.
    pub initial_offset: Offset,
}

/// Output of compiling one changed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub unit: UnitId,
    pub function: FunctionId,
    /// Internal name of the containing class (`com/example/MainKt`).
    pub class_name: String,
    pub method_name: String,
    /// JVM-style method descriptor, e.g. `(Landroidx/compose/runtime/Composer;I)V`.
    pub method_desc: String,
    pub class_data: Vec<u8>,
    pub kind: FunctionKind,
    pub offset: Offset,
    /// Newly referenced classes (lambdas, singletons) by internal name.
    pub support_classes: BTreeMap<String, Vec<u8>>,
}

impl CompiledArtifact {
    /// `class.method(desc)` form used in logs and patch errors.
    pub fn signature(&self) -> String {
        format!("{}.{}{}", self.class_name, self.method_name, self.method_desc)
    }
}

/// Hard compile failure. Surfaced to the user, never retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("compilation error: {0}")]
    Compilation(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("known issue {id}: {message}")]
    KnownIssue { id: u32, message: String },

    /// A required toolchain piece is missing or disabled.
    #[error("environment not ready: {0}")]
    Environment(String),
}

impl CompileError {
    /// Human readable text for the status line.
    pub fn message(&self) -> String {
        match self {
            Self::Compilation(msg) => format!("Live edit compilation error: {msg}"),
            Self::Analysis(msg) => format!("Live edit analysis error: {msg}"),
            Self::Internal(msg) => format!("Live edit internal error: {msg}"),
            Self::KnownIssue { id, message } => {
                format!("Live edit known issue (issue {id}): {message}")
            }
            Self::Environment(msg) => format!("Live edit unavailable: {msg}"),
        }
    }
}

/// Why a compile produced no artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileFailure {
    /// Invalidated by a concurrent edit. Retried, never reported.
    Cancelled,
    Failed(CompileError),
}

impl From<CompileError> for CompileFailure {
    fn from(error: CompileError) -> Self {
        Self::Failed(error)
    }
}

/// Cancellation view handed to the compiler for one batch.
#[derive(Debug, Clone)]
pub struct CompileContext {
    queue: Option<Arc<EditQueue>>,
    generation: u64,
    units: Arc<FxHashSet<UnitId>>,
}

impl CompileContext {
    /// Context cancelled once any of `units` is enqueued again after `generation`.
    pub fn new(queue: Arc<EditQueue>, generation: u64, units: FxHashSet<UnitId>) -> Self {
        Self {
            queue: Some(queue),
            generation,
            units: Arc::new(units),
        }
    }

    /// Context that is never cancelled (one-shot compiles, tests).
    pub fn detached() -> Self {
        Self {
            queue: None,
            generation: 0,
            units: Arc::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.queue
            .as_ref()
            .is_some_and(|q| q.touched_since(self.generation, &self.units))
    }

    /// Bail out with `Cancelled` if the batch went stale.
    pub fn checkpoint(&self) -> Result<(), CompileFailure> {
        if self.is_cancelled() {
            Err(CompileFailure::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Language compiler collaborator.
///
/// Receives the deduplicated batch and returns one artifact per input, or a
/// failure. Implementations may block; they run on a blocking worker.
pub trait Compiler: Send + Sync + 'static {
    fn compile(
        &self,
        inputs: &[CompileInput],
        ctx: &CompileContext,
    ) -> Result<Vec<CompiledArtifact>, CompileFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::edit;

    #[test]
    fn test_context_cancelled_by_later_edit_to_batch_unit() {
        let queue = Arc::new(EditQueue::new());
        queue.enqueue(edit("A.kt", "f"));
        let batch = queue.drain_all();
        let ctx = CompileContext::new(Arc::clone(&queue), batch.generation, batch.units());

        assert_eq!(ctx.checkpoint(), Ok(()));
        queue.enqueue(edit("A.kt", "f"));
        assert_eq!(ctx.checkpoint(), Err(CompileFailure::Cancelled));
    }

    #[test]
    fn test_detached_context_never_cancels() {
        assert!(!CompileContext::detached().is_cancelled());
    }

    #[test]
    fn test_error_messages() {
        let known = CompileError::KnownIssue {
            id: 201728545,
            message: "top level function in another file".into(),
        };
        assert!(known.message().contains("201728545"));
        assert!(
            CompileError::Environment("compiler plugin missing".into())
                .message()
                .contains("compiler plugin missing")
        );
    }
}
