//! `[debounce]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [debounce]
//! quiet_ms = 200    # wait this long after the last edit before compiling
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

/// Upper bound for the quiet period; anything longer feels broken.
const MAX_QUIET_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub quiet_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { quiet_ms: 200 }
    }
}

impl DebounceConfig {
    pub fn quiet(&self) -> Duration {
        Duration::from_millis(self.quiet_ms)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !(1..=MAX_QUIET_MS).contains(&self.quiet_ms) {
            diag.error_with_hint(
                FieldPath::new("debounce.quiet_ms"),
                format!("must be between 1 and {MAX_QUIET_MS}, got {}", self.quiet_ms),
                "200 works well for typing",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ConfigDiagnostics, test_parse_config};

    #[test]
    fn test_debounce_config() {
        let config = test_parse_config("[debounce]\nquiet_ms = 50");
        assert_eq!(config.debounce.quiet().as_millis(), 50);
    }

    #[test]
    fn test_debounce_bounds() {
        for (quiet_ms, ok) in [(0, false), (1, true), (10_000, true), (10_001, false)] {
            let config = test_parse_config(&format!("[debounce]\nquiet_ms = {quiet_ms}"));
            let mut diag = ConfigDiagnostics::new();
            config.debounce.validate(&mut diag);
            assert_eq!(diag.is_empty(), ok, "quiet_ms = {quiet_ms}");
        }
    }
}
