//! JSON-lines edit reader.
//!
//! Editor integrations report edits one per line:
//!
//! ```text
//! {"unit": "app/src/main/Main.kt", "function": "Greeting", "start": 120, "end": 410}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::io::BufRead;

use serde::Deserialize;

use crate::actor::DeployMonitor;
use crate::edit::{EditEvent, FunctionId, Offset, UnitId};

#[derive(Debug, Deserialize)]
struct EditRecord {
    unit: String,
    function: String,
    #[serde(default)]
    start: u32,
    #[serde(default)]
    end: u32,
}

/// Parse one input line. `Ok(None)` for lines that carry no edit.
pub fn parse_line(line: &str) -> Result<Option<EditEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let record: EditRecord = serde_json::from_str(line)?;
    Ok(Some(EditEvent::new(
        UnitId::new(record.unit),
        FunctionId::new(record.function),
        Offset::new(record.start, record.end),
    )))
}

/// Feed every edit read from `reader` into `monitor` until EOF.
///
/// Returns the number of accepted edits. Malformed lines are logged and skipped.
pub fn feed(reader: impl BufRead, monitor: &DeployMonitor) -> usize {
    let mut accepted = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                crate::log!("input"; "read failed: {}", e);
                break;
            }
        };
        match parse_line(&line) {
            Ok(Some(event)) => {
                crate::debug!("input"; "{}", event);
                if monitor.on_edit(event) {
                    accepted += 1;
                }
            }
            Ok(None) => {}
            Err(e) => crate::log!("input"; "line {}: {}", index + 1, e),
        }
    }
    accepted
}

/// Read edits from stdin on a background thread.
pub fn spawn_stdin_reader(monitor: DeployMonitor) -> std::thread::JoinHandle<usize> {
    std::thread::spawn(move || feed(std::io::stdin().lock(), &monitor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit_line() {
        let event = parse_line(r#"{"unit":"Main.kt","function":"Greeting","start":3,"end":9}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event.unit().as_str(), "Main.kt");
        assert_eq!(event.function().as_str(), "Greeting");
        assert_eq!(event.offset(), Offset::new(3, 9));
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        assert!(parse_line("").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("# editor attached").unwrap().is_none());
    }

    #[test]
    fn test_offsets_default_to_zero() {
        let event = parse_line(r#"{"unit":"A.kt","function":"f"}"#).unwrap().unwrap();
        assert_eq!(event.offset(), Offset::default());
    }

    #[test]
    fn test_malformed_line_is_error() {
        assert!(parse_line(r#"{"unit":"A.kt"}"#).is_err());
        assert!(parse_line("not json").is_err());
    }
}
