//! External-process compiler adapter.
//!
//! Runs the configured compiler command once per source unit. The request is
//! written to stdin as JSON and the artifacts are read back from stdout:
//!
//! ```text
//! stdin:  {"unit": "app/Main.kt", "functions": [{"name": "Greeting", "seq": 7, ...}]}
//! stdout: {"artifacts": [{"function": "Greeting", "class_name": "com/example/MainKt",
//!          "method_name": "Greeting", "method_desc": "(...)V", "class_data": "cafebabe...",
//!          "kind": "composable", "support_classes": {"com/example/MainKt$1": "..."}}]}
//! ```
//!
//! Exit status `cancelled_exit_code` means the compile was interrupted and
//! should be retried; any other non-zero status is a compilation error
//! carrying the command's stderr.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{CompileContext, CompileError, CompileFailure, CompileInput, CompiledArtifact, Compiler, FunctionKind};
use crate::config::MonitorConfig;
use crate::edit::{Offset, UnitId};

#[derive(Debug, Serialize)]
struct UnitRequest<'a> {
    unit: &'a str,
    functions: Vec<FunctionRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct FunctionRequest<'a> {
    name: &'a str,
    seq: u64,
    offset: Offset,
    initial_offset: Offset,
}

#[derive(Debug, Deserialize)]
struct UnitResponse {
    #[serde(default)]
    artifacts: Vec<ArtifactRecord>,
}

#[derive(Debug, Deserialize)]
struct ArtifactRecord {
    function: String,
    class_name: String,
    method_name: String,
    method_desc: String,
    /// Hex-encoded class bytes.
    class_data: String,
    #[serde(default)]
    kind: FunctionKind,
    #[serde(default)]
    support_classes: BTreeMap<String, String>,
}

/// Compiler collaborator backed by an external command.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    argv: Vec<String>,
    cwd: PathBuf,
    cancelled_exit_code: i32,
}

impl CommandCompiler {
    pub fn new(argv: Vec<String>, cwd: PathBuf, cancelled_exit_code: i32) -> Self {
        Self {
            argv,
            cwd,
            cancelled_exit_code,
        }
    }

    /// Build from the `[compiler]` section. `None` when no command is set.
    pub fn from_config(config: &MonitorConfig) -> Option<Self> {
        let compiler = &config.compiler;
        if compiler.command.is_empty() {
            return None;
        }
        let argv = compiler
            .command
            .iter()
            .map(|arg| shellexpand::tilde(arg).into_owned())
            .collect();
        Some(Self::new(
            argv,
            config.root_join(&compiler.cwd),
            compiler.cancelled_exit_code,
        ))
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Locate the program on PATH (or as given).
    pub fn resolve(&self) -> Result<PathBuf, CompileError> {
        which::which(self.program()).map_err(|e| {
            CompileError::Environment(format!("compiler `{}` not found: {}", self.program(), e))
        })
    }

    fn compile_unit(
        &self,
        unit: &UnitId,
        inputs: &[&CompileInput],
        ctx: &CompileContext,
    ) -> Result<Vec<CompiledArtifact>, CompileFailure> {
        ctx.checkpoint()?;

        let request = UnitRequest {
            unit: unit.as_str(),
            functions: inputs
                .iter()
                .map(|input| FunctionRequest {
                    name: input.function.as_str(),
                    seq: input.seq,
                    offset: input.offset,
                    initial_offset: input.initial_offset,
                })
                .collect(),
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| CompileError::Internal(format!("failed to encode request: {e}")))?;

        let mut child = Command::new(self.program())
            .args(&self.argv[1..])
            .arg(unit.as_str())
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CompileError::Environment(format!(
                    "compiler `{}` not found",
                    self.program()
                )),
                _ => CompileError::Internal(format!("failed to start compiler: {e}")),
            })?;

        // A compiler may exit without reading the request; its status decides
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(&payload)
        {
            crate::debug!("compile"; "request not fully written: {}", e);
        }

        let output = child
            .wait_with_output()
            .map_err(|e| CompileError::Internal(format!("compiler did not finish: {e}")))?;

        match output.status.code() {
            Some(0) => {}
            Some(code) if code == self.cancelled_exit_code => {
                crate::debug!("compile"; "{} cancelled by compiler", unit);
                return Err(CompileFailure::Cancelled);
            }
            Some(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(CompileError::Compilation(stderr.trim().to_string()).into());
            }
            None => {
                return Err(CompileError::Internal("compiler terminated by signal".into()).into());
            }
        }

        let response: UnitResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| CompileError::Internal(format!("invalid compiler output: {e}")))?;

        response
            .artifacts
            .into_iter()
            .map(|record| into_artifact(unit, inputs, record))
            .collect::<Result<Vec<_>, _>>()
            .map_err(CompileFailure::from)
    }
}

impl Compiler for CommandCompiler {
    fn compile(
        &self,
        inputs: &[CompileInput],
        ctx: &CompileContext,
    ) -> Result<Vec<CompiledArtifact>, CompileFailure> {
        let groups = group_by_unit(inputs);

        let results: Vec<_> = groups
            .par_iter()
            .map(|(unit, unit_inputs)| self.compile_unit(unit, unit_inputs, ctx))
            .collect();

        // A cancelled unit means the whole batch is stale: retry wins over errors.
        if results
            .iter()
            .any(|r| matches!(r, Err(CompileFailure::Cancelled)))
        {
            return Err(CompileFailure::Cancelled);
        }

        let mut artifacts = Vec::with_capacity(inputs.len());
        for result in results {
            artifacts.extend(result?);
        }
        Ok(artifacts)
    }
}

/// Bundle inputs per unit, keeping first-seen unit order.
fn group_by_unit(inputs: &[CompileInput]) -> Vec<(&UnitId, Vec<&CompileInput>)> {
    let mut groups: Vec<(&UnitId, Vec<&CompileInput>)> = Vec::new();
    for input in inputs {
        match groups.iter_mut().find(|(unit, _)| **unit == input.unit) {
            Some((_, members)) => members.push(input),
            None => groups.push((&input.unit, vec![input])),
        }
    }
    groups
}

fn into_artifact(
    unit: &UnitId,
    inputs: &[&CompileInput],
    record: ArtifactRecord,
) -> Result<CompiledArtifact, CompileError> {
    let input = inputs
        .iter()
        .find(|i| i.function.as_str() == record.function)
        .ok_or_else(|| {
            CompileError::Internal(format!(
                "compiler returned unrequested function `{}` for {}",
                record.function, unit
            ))
        })?;

    if record.class_name.is_empty() || record.method_name.is_empty() {
        return Err(CompileError::Internal(format!(
            "empty class name or method signature for `{}`",
            record.function
        )));
    }

    let class_data = decode_hex(&record.class_name, &record.class_data)?;
    let support_classes = record
        .support_classes
        .iter()
        .map(|(name, data)| Ok((name.clone(), decode_hex(name, data)?)))
        .collect::<Result<BTreeMap<_, _>, CompileError>>()?;

    Ok(CompiledArtifact {
        unit: unit.clone(),
        function: input.function.clone(),
        class_name: record.class_name,
        method_name: record.method_name,
        method_desc: record.method_desc,
        class_data,
        kind: record.kind,
        offset: input.initial_offset,
        support_classes,
    })
}

fn decode_hex(name: &str, data: &str) -> Result<Vec<u8>, CompileError> {
    hex::decode(data)
        .map_err(|e| CompileError::Internal(format!("invalid class data for {name}: {e}")))
}
