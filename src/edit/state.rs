//! Per-unit function bookkeeping for one application session.

use rustc_hash::FxHashMap;

use super::{EditEvent, FunctionId, Offset, UnitId};

/// Latest known edit of one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionEdit {
    pub seq: u64,
    pub offset: Offset,
}

/// Tracks the most recent edit of every function inside one source unit.
///
/// Updates are idempotent: replaying an event that is already reflected (or
/// older than what is reflected) leaves the state untouched, so a batch can
/// be recorded again after a cancelled compile.
#[derive(Debug, Default)]
pub struct FunctionState {
    latest: FxHashMap<FunctionId, FunctionEdit>,
    /// Offset of each function when it was first edited in this session.
    initial: FxHashMap<FunctionId, Offset>,
}

impl FunctionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit. Returns `true` if it became the latest for its function.
    pub fn update(&mut self, event: &EditEvent) -> bool {
        self.initial
            .entry(event.function().clone())
            .or_insert(event.offset());

        let edit = FunctionEdit {
            seq: event.seq(),
            offset: event.offset(),
        };
        match self.latest.get_mut(event.function()) {
            Some(current) if current.seq >= edit.seq => false,
            Some(current) => {
                *current = edit;
                true
            }
            None => {
                self.latest.insert(event.function().clone(), edit);
                true
            }
        }
    }

    pub fn latest(&self, function: &FunctionId) -> Option<FunctionEdit> {
        self.latest.get(function).copied()
    }

    pub fn initial_offset_of(&self, function: &FunctionId) -> Option<Offset> {
        self.initial.get(function).copied()
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

/// FunctionState of every unit edited in the bound application session.
///
/// Owned by the processing worker and replaced wholesale on every session
/// bind, so no state leaks from one application run into the next.
#[derive(Debug, Default)]
pub struct SessionStore {
    application_id: String,
    units: FxHashMap<UnitId, FunctionState>,
}

impl SessionStore {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            units: FxHashMap::default(),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Record an edit, creating the unit's state on first use.
    pub fn record(&mut self, event: &EditEvent) -> bool {
        self.units
            .entry(event.unit().clone())
            .or_default()
            .update(event)
    }

    pub fn unit(&self, unit: &UnitId) -> Option<&FunctionState> {
        self.units.get(unit)
    }

    /// Number of units with recorded state.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{EditEvent, edit};

    fn edit_at(unit: &str, function: &str, start: u32, end: u32) -> EditEvent {
        EditEvent::new(
            UnitId::new(unit),
            FunctionId::new(function),
            Offset::new(start, end),
        )
    }

    #[test]
    fn test_latest_edit_wins() {
        let mut state = FunctionState::new();
        let first = edit_at("A.kt", "f", 10, 20);
        let second = edit_at("A.kt", "f", 10, 24);

        assert!(state.update(&first));
        assert!(state.update(&second));

        let latest = state.latest(&FunctionId::new("f")).unwrap();
        assert_eq!(latest.seq, second.seq());
        assert_eq!(latest.offset, Offset::new(10, 24));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut state = FunctionState::new();
        let first = edit_at("A.kt", "f", 0, 5);
        let second = edit_at("A.kt", "f", 0, 9);

        state.update(&first);
        state.update(&second);
        // Re-recording a re-queued batch must not roll state back
        assert!(!state.update(&first));
        assert!(!state.update(&second));
        assert_eq!(state.latest(&FunctionId::new("f")).unwrap().seq, second.seq());
    }

    #[test]
    fn test_initial_offset_kept() {
        let mut state = FunctionState::new();
        state.update(&edit_at("A.kt", "f", 3, 8));
        state.update(&edit_at("A.kt", "f", 30, 80));
        assert_eq!(
            state.initial_offset_of(&FunctionId::new("f")),
            Some(Offset::new(3, 8))
        );
    }

    #[test]
    fn test_store_lazily_creates_units() {
        let mut store = SessionStore::new("com.example.app");
        assert!(store.is_empty());

        store.record(&edit("A.kt", "f"));
        store.record(&edit("A.kt", "g"));
        store.record(&edit("B.kt", "f"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.unit(&UnitId::new("A.kt")).unwrap().len(), 2);
        assert_eq!(store.application_id(), "com.example.app");
    }
}
