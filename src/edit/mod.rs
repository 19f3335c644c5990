//! Edit events reported by the editor integration.
//!
//! ```text
//! editor --EditEvent--> EditQueue --drain--> SessionStore (FunctionState per unit)
//! ```
//!
//! An [`EditEvent`] names one changed function inside one source unit. Events
//! are stamped with a process-wide sequence number when created, so the most
//! recent edit of a function can always be told apart from an older one that
//! was re-queued after a cancelled compile.

pub mod queue;
pub mod state;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub use queue::{DrainedBatch, EditQueue};
pub use state::{FunctionEdit, FunctionState, SessionStore};

/// Next sequence number handed to a new event.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identity of a source unit (typically the source file path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Qualified name of a function inside a unit (e.g. `MainActivity.Greeting`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(String);

impl FunctionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source range of a function body, in characters from the start of the unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Offset {
    pub start: u32,
    pub end: u32,
}

impl Offset {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// A single edit notification. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEvent {
    unit: UnitId,
    function: FunctionId,
    offset: Offset,
    seq: u64,
}

impl EditEvent {
    /// Create an event, stamping it with the next sequence number.
    pub fn new(unit: UnitId, function: FunctionId, offset: Offset) -> Self {
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            unit,
            function,
            offset,
            seq,
        }
    }

    pub fn unit(&self) -> &UnitId {
        &self.unit
    }

    pub fn function(&self) -> &FunctionId {
        &self.function
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for EditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}#{}", self.unit, self.function, self.seq)
    }
}

/// Stable key identifying one processing pass, derived from its batch.
///
/// Used to correlate log lines and push lifecycle events of the same pass.
pub fn batch_key(events: &[EditEvent]) -> String {
    let mut hasher = blake3::Hasher::new();
    for event in events {
        hasher.update(event.unit.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(event.function.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(&event.seq.to_le_bytes());
    }
    hex::encode(&hasher.finalize().as_bytes()[..6])
}

#[cfg(test)]
pub(crate) fn edit(unit: &str, function: &str) -> EditEvent {
    EditEvent::new(UnitId::new(unit), FunctionId::new(function), Offset::default())
}
