//! `[compiler]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [compiler]
//! command = ["kotlinc-live", "--json"]   # argv, the unit path is appended
//! cancelled_exit_code = 75               # "interrupted, try again"
//! cwd = "."                              # relative to the config file
//! ```
//!
//! An empty `command` leaves compilation to an embedding application.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub command: Vec<String>,
    pub cancelled_exit_code: i32,
    pub cwd: PathBuf,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            cancelled_exit_code: 75,
            cwd: PathBuf::from("."),
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.command.first().is_some_and(|p| p.trim().is_empty()) {
            diag.error(FieldPath::new("compiler.command"), "program name is empty");
        }
        if self.cancelled_exit_code == 0 {
            diag.error(
                FieldPath::new("compiler.cancelled_exit_code"),
                "0 means success and cannot signal cancellation",
            );
        }
    }
}
