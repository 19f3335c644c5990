//! Bookkeeping, deduplication and outcome classification around a compile.

use rustc_hash::FxHashSet;

use super::{CompileContext, CompileError, CompileFailure, CompileInput, CompiledArtifact, Compiler};
use crate::edit::{EditEvent, FunctionId, SessionStore, UnitId};

/// Result of the compile step of one processing pass.
#[derive(Debug)]
pub enum CompileOutcome {
    /// Ready to push (may be empty).
    Compiled(Vec<CompiledArtifact>),
    /// A concurrent edit invalidated the compile; re-queue the batch.
    Cancelled,
    /// Hard failure; stop this pass.
    Failed(CompileError),
}

/// Record the batch in the session store and build the deduplicated inputs.
///
/// Several edits of one function collapse into one input that reflects the
/// latest recorded edit. Recording is idempotent, so a re-queued batch can
/// go through here again without rolling state back.
pub fn prepare(store: &mut SessionStore, events: &[EditEvent]) -> Vec<CompileInput> {
    for event in events {
        store.record(event);
    }

    let mut seen: FxHashSet<(&UnitId, &FunctionId)> = FxHashSet::default();
    let mut inputs = Vec::new();
    for event in events {
        if !seen.insert((event.unit(), event.function())) {
            continue;
        }
        let Some(state) = store.unit(event.unit()) else {
            continue;
        };
        let Some(latest) = state.latest(event.function()) else {
            continue;
        };
        inputs.push(CompileInput {
            unit: event.unit().clone(),
            function: event.function().clone(),
            seq: latest.seq,
            offset: latest.offset,
            initial_offset: state
                .initial_offset_of(event.function())
                .unwrap_or(latest.offset),
        });
    }
    inputs
}

/// Run the compiler and classify its result.
///
/// A hard failure on any function fails the whole batch: no partial set of
/// artifacts is pushed.
pub fn compile(
    compiler: &dyn Compiler,
    inputs: &[CompileInput],
    ctx: &CompileContext,
) -> CompileOutcome {
    if inputs.is_empty() {
        return CompileOutcome::Compiled(Vec::new());
    }

    match compiler.compile(inputs, ctx) {
        Ok(artifacts) => CompileOutcome::Compiled(dedup_artifacts(artifacts)),
        Err(CompileFailure::Cancelled) => CompileOutcome::Cancelled,
        Err(CompileFailure::Failed(error)) => CompileOutcome::Failed(error),
    }
}

/// Keep one artifact per function, the last one the compiler produced.
fn dedup_artifacts(artifacts: Vec<CompiledArtifact>) -> Vec<CompiledArtifact> {
    let mut seen = FxHashSet::default();
    let mut kept: Vec<_> = artifacts
        .into_iter()
        .rev()
        .filter(|a| seen.insert((a.unit.clone(), a.function.clone())))
        .collect();
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::compile::FunctionKind;
    use crate::edit::{EditEvent, Offset, edit};

    /// Compiler that echoes one artifact per input and records what it saw.
    #[derive(Default)]
    struct EchoCompiler {
        seen: Mutex<Vec<CompileInput>>,
    }

    impl Compiler for EchoCompiler {
        fn compile(
            &self,
            inputs: &[CompileInput],
            _ctx: &CompileContext,
        ) -> Result<Vec<CompiledArtifact>, CompileFailure> {
            self.seen.lock().extend_from_slice(inputs);
            Ok(inputs.iter().map(artifact_for).collect())
        }
    }

    fn artifact_for(input: &CompileInput) -> CompiledArtifact {
        CompiledArtifact {
            unit: input.unit.clone(),
            function: input.function.clone(),
            class_name: "com/example/MainKt".into(),
            method_name: input.function.to_string(),
            method_desc: "()V".into(),
            class_data: input.seq.to_le_bytes().to_vec(),
            kind: FunctionKind::Plain,
            offset: input.initial_offset,
            support_classes: Default::default(),
        }
    }

    #[test]
    fn test_same_function_collapses_to_latest() {
        let mut store = SessionStore::new("app");
        let x1 = edit("Main.kt", "funcX");
        let x2 = EditEvent::new(
            x1.unit().clone(),
            x1.function().clone(),
            Offset::new(0, 42),
        );
        let y1 = edit("Main.kt", "funcY");

        let inputs = prepare(&mut store, &[x1.clone(), x2.clone(), y1.clone()]);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].function.as_str(), "funcX");
        assert_eq!(inputs[0].seq, x2.seq());
        assert_eq!(inputs[0].offset, Offset::new(0, 42));
        assert_eq!(inputs[1].seq, y1.seq());

        let compiler = EchoCompiler::default();
        let CompileOutcome::Compiled(artifacts) =
            compile(&compiler, &inputs, &CompileContext::detached())
        else {
            panic!("expected artifacts");
        };
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].class_data, x2.seq().to_le_bytes().to_vec());
    }

    #[test]
    fn test_requeued_older_event_reads_latest_state() {
        let mut store = SessionStore::new("app");
        let old = edit("Main.kt", "f");
        let new = edit("Main.kt", "f");

        prepare(&mut store, &[new.clone()]);
        // An older event replayed later still compiles the newest edit
        let inputs = prepare(&mut store, &[old]);
        assert_eq!(inputs[0].seq, new.seq());
    }

    #[test]
    fn test_same_function_name_in_different_units_kept_apart() {
        let mut store = SessionStore::new("app");
        let inputs = prepare(&mut store, &[edit("A.kt", "f"), edit("B.kt", "f")]);
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn test_classifies_failures() {
        struct Failing(CompileFailure);
        impl Compiler for Failing {
            fn compile(
                &self,
                _inputs: &[CompileInput],
                _ctx: &CompileContext,
            ) -> Result<Vec<CompiledArtifact>, CompileFailure> {
                Err(self.0.clone())
            }
        }

        let mut store = SessionStore::new("app");
        let inputs = prepare(&mut store, &[edit("A.kt", "f")]);
        let ctx = CompileContext::detached();

        assert!(matches!(
            compile(&Failing(CompileFailure::Cancelled), &inputs, &ctx),
            CompileOutcome::Cancelled
        ));
        assert!(matches!(
            compile(
                &Failing(CompileError::Analysis("bad".into()).into()),
                &inputs,
                &ctx
            ),
            CompileOutcome::Failed(CompileError::Analysis(_))
        ));
    }

    #[test]
    fn test_duplicate_artifacts_from_compiler_are_dropped() {
        let mut store = SessionStore::new("app");
        let inputs = prepare(&mut store, &[edit("A.kt", "f")]);
        let mut first = artifact_for(&inputs[0]);
        first.class_data = vec![1];
        let mut second = first.clone();
        second.class_data = vec![2];

        let kept = dedup_artifacts(vec![first, second]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class_data, vec![2]);
    }
}
