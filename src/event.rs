/// Event records for the simulation kernel.
///
/// An event is a callback bound to a point in virtual time. The queue
/// orders events by `(scheduled_at, id)`; because ids are handed out by a
/// strictly increasing counter, events sharing a timestamp run in the
/// order they were scheduled.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::engine::Context;
use crate::time::VirtualTime;

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly increasing sequence number, unique within one engine.
///
/// Doubles as the tie-breaker between events scheduled for the same
/// `VirtualTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Monotonic id source. Each `EventQueue` owns exactly one.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Mint the next event ID.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// Peek at the next ID without consuming it.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Handle ────────────────────────────────────────────────────────────

/// Opaque token returned when an event is scheduled.
///
/// A handle only identifies the event; it does not keep it alive and does
/// not stop it from firing. Pass it to `cancel` to revoke the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventHandle {
    id: EventId,
    at: VirtualTime,
}

impl EventHandle {
    pub(crate) fn new(id: EventId, at: VirtualTime) -> Self {
        EventHandle { id, at }
    }

    /// The id assigned to the event.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// The time the event was scheduled for.
    pub fn scheduled_at(&self) -> VirtualTime {
        self.at
    }
}

/// Lifecycle of an event as observed through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// Waiting in the queue.
    Pending,
    /// Revoked before it ran; its callback will never be invoked.
    Cancelled,
    /// No longer queued: dispatched, discarded by an engine teardown, or
    /// cancelled and since reclaimed from the queue.
    Executed,
}

// ── Callback ──────────────────────────────────────────────────────────

/// The unit of work carried by an event.
///
/// Callbacks run to completion on the engine's thread. They receive a
/// [`Context`] through which they may read the clock and schedule or
/// cancel further events.
pub type Callback = Box<dyn FnOnce(&mut Context<'_>) -> anyhow::Result<()>>;

// ── Event ─────────────────────────────────────────────────────────────

/// An event removed from the queue, ready to be dispatched.
pub struct Event {
    pub id: EventId,
    pub scheduled_at: VirtualTime,
    pub callback: Callback,
}

impl Event {
    pub fn handle(&self) -> EventHandle {
        EventHandle::new(self.id, self.scheduled_at)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("scheduled_at", &self.scheduled_at)
            .finish_non_exhaustive()
    }
}

// ── Heap key ──────────────────────────────────────────────────────────

/// The part of an event that lives in the priority heap.
///
/// Callbacks are stored beside the heap, keyed by id, so cancelling an
/// event can release its closure without touching the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueKey {
    pub at: VirtualTime,
    pub id: EventId,
}

/// Ordering: smallest `(at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here.
impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
