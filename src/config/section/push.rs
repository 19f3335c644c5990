//! `[push]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [push]
//! partial_recompose = true  # recompose only edited composables
//! debug_mode = false        # ask the agent for verbose patch diagnostics
//! min_api_level = 30        # older devices cannot apply patches
//! timeout_ms = 5000         # per request reply timeout
//! ```

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub partial_recompose: bool,
    pub debug_mode: bool,
    pub min_api_level: u32,
    pub timeout_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            partial_recompose: true,
            debug_mode: false,
            min_api_level: 30,
            timeout_ms: 5000,
        }
    }
}

impl PushConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.timeout_ms == 0 {
            diag.error(FieldPath::new("push.timeout_ms"), "must be greater than 0");
        }
    }
}
