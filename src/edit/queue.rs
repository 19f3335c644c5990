//! Pending edit queue shared between the producer and the processing worker.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use super::{EditEvent, UnitId};

/// Events removed from the queue by one drain.
#[derive(Debug, Default)]
pub struct DrainedBatch {
    pub events: Vec<EditEvent>,
    /// Queue generation at drain time. Edits enqueued later have a higher one.
    pub generation: u64,
}

impl DrainedBatch {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Distinct units touched by the batch.
    pub fn units(&self) -> FxHashSet<UnitId> {
        self.events.iter().map(|e| e.unit().clone()).collect()
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    events: VecDeque<EditEvent>,
    generation: u64,
    /// Generation of the newest enqueue per unit, since the last drain.
    touched: FxHashMap<UnitId, u64>,
}

/// FIFO buffer of pending edits.
///
/// `enqueue` never blocks on processing, and `drain_all` hands back every
/// queued event in one atomic step. Events of the same unit keep their
/// relative order, including across a `requeue_front` after a cancelled
/// compile.
#[derive(Debug, Default)]
pub struct EditQueue {
    inner: Mutex<QueueInner>,
}

impl EditQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Returns the queue generation it was assigned.
    pub fn enqueue(&self, event: EditEvent) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        let generation = inner.generation;
        inner.touched.insert(event.unit().clone(), generation);
        inner.events.push_back(event);
        generation
    }

    /// Remove and return everything currently queued.
    pub fn drain_all(&self) -> DrainedBatch {
        let mut inner = self.inner.lock();
        // Every touch so far is covered by this drain's generation.
        inner.touched.clear();
        DrainedBatch {
            events: inner.events.drain(..).collect(),
            generation: inner.generation,
        }
    }

    /// Put a batch back ahead of anything enqueued since it was drained.
    ///
    /// Re-queued events are older than any event that arrived during the
    /// compile, so they go to the front to keep per-unit order intact.
    pub fn requeue_front(&self, events: Vec<EditEvent>) {
        let mut inner = self.inner.lock();
        for event in events.into_iter().rev() {
            inner.events.push_front(event);
        }
    }

    /// Whether any of `units` was edited after the drain at `generation`.
    pub fn touched_since(&self, generation: u64, units: &FxHashSet<UnitId>) -> bool {
        let inner = self.inner.lock();
        inner
            .touched
            .iter()
            .any(|(unit, g)| *g > generation && units.contains(unit))
    }

    /// Drop all pending events (session rebind or disable).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.events.clear();
        inner.touched.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }
}
