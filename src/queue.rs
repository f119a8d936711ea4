/// Pending-event queue.
///
/// A `BinaryHeap` of `(scheduled_at, id)` keys acts as the min-heap;
/// callbacks live in a side table keyed by id. Cancelling an event drops
/// its callback and leaves the heap key behind as a tombstone, which
/// `pop_next` skips lazily. When tombstones dominate the heap it is
/// rebuilt so memory stays proportional to the live event count. A
/// cancelled id is forgotten once its tombstone is reclaimed.
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::{SimError, SimResult};
use crate::event::{Callback, Event, EventHandle, EventId, EventIdGen, EventStatus, QueueKey};
use crate::time::VirtualTime;

/// Tombstone count below which the heap is never compacted.
const COMPACT_MIN_STALE: usize = 64;

/// Ordered collection of pending events.
pub struct EventQueue {
    /// Min-heap (via reversed Ord on `QueueKey`), tombstones included.
    heap: BinaryHeap<QueueKey>,

    /// Callbacks of live events.
    pending: HashMap<EventId, Callback>,

    /// Ids of cancelled events whose keys are still in `heap`.
    cancelled: HashSet<EventId>,

    id_gen: EventIdGen,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            cancelled: HashSet::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Insert a callback to fire at `at`.
    ///
    /// Fails with [`SimError::InvalidSchedule`] if `at` is before `now`.
    /// An event at exactly `now` is accepted and runs after every event
    /// already queued for `now`.
    pub fn insert(
        &mut self,
        now: VirtualTime,
        at: VirtualTime,
        callback: Callback,
    ) -> SimResult<EventHandle> {
        if at < now {
            return Err(SimError::InvalidSchedule { requested: at, now });
        }
        let id = self.id_gen.next_id();
        self.heap.push(QueueKey { at, id });
        self.pending.insert(id, callback);
        Ok(EventHandle::new(id, at))
    }

    /// Revoke a pending event.
    ///
    /// Returns `true` if the event was pending. Cancelling an event that
    /// already ran or was already cancelled does nothing and returns
    /// `false`.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let id = handle.id();
        if self.pending.remove(&id).is_none() {
            return false;
        }
        self.cancelled.insert(id);
        self.maybe_compact();
        true
    }

    /// Remove and return the earliest live event.
    ///
    /// Cancelled entries met on the way are discarded.
    pub fn pop_next(&mut self) -> Option<Event> {
        while let Some(key) = self.heap.pop() {
            match self.pending.remove(&key.id) {
                Some(callback) => {
                    return Some(Event {
                        id: key.id,
                        scheduled_at: key.at,
                        callback,
                    })
                }
                None => {
                    self.cancelled.remove(&key.id);
                }
            }
        }
        None
    }

    /// Time of the earliest live event.
    ///
    /// Takes `&mut self` because cancelled entries at the head of the heap
    /// are reclaimed while looking.
    pub fn peek_time(&mut self) -> Option<VirtualTime> {
        while let Some(key) = self.heap.peek().copied() {
            if self.pending.contains_key(&key.id) {
                return Some(key.at);
            }
            self.heap.pop();
            self.cancelled.remove(&key.id);
        }
        None
    }

    /// Where the event behind `handle` is in its lifecycle.
    ///
    /// `Cancelled` is reported until the tombstone is reclaimed; after that
    /// the queue keeps no record of the event and reports `Executed`.
    pub fn status(&self, handle: EventHandle) -> EventStatus {
        let id = handle.id();
        if self.pending.contains_key(&id) {
            EventStatus::Pending
        } else if self.cancelled.contains(&id) {
            EventStatus::Cancelled
        } else {
            EventStatus::Executed
        }
    }

    /// Number of live (non-cancelled) events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending event without running it.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
        self.cancelled.clear();
    }

    /// The id the next insertion will receive.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    /// Heap size including tombstones.
    pub(crate) fn heap_len(&self) -> usize {
        self.heap.len()
    }

    fn maybe_compact(&mut self) {
        let stale = self.cancelled.len();
        if stale < COMPACT_MIN_STALE || stale * 2 <= self.heap.len() {
            return;
        }
        let pending = &self.pending;
        self.heap.retain(|key| pending.contains_key(&key.id));
        self.cancelled.clear();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.len())
            .field("stale", &self.cancelled.len())
            .field("next_id", &self.id_gen.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Context;

    fn noop() -> Callback {
        Box::new(|_: &mut Context<'_>| -> anyhow::Result<()> { Ok(()) })
    }

    fn at(nanos: u64) -> VirtualTime {
        VirtualTime::from_nanos(nanos)
    }

    fn drain_ids(q: &mut EventQueue) -> Vec<u64> {
        let mut ids = Vec::new();
        while let Some(e) = q.pop_next() {
            ids.push(e.id.raw());
        }
        ids
    }

    #[test]
    fn test_fifo_at_same_time() {
        let mut q = EventQueue::new();
        let a = q.insert(VirtualTime::ZERO, at(10), noop()).unwrap();
        let b = q.insert(VirtualTime::ZERO, at(10), noop()).unwrap();
        let c = q.insert(VirtualTime::ZERO, at(10), noop()).unwrap();

        assert_eq!(q.pop_next().unwrap().id, a.id());
        assert_eq!(q.pop_next().unwrap().id, b.id());
        assert_eq!(q.pop_next().unwrap().id, c.id());
        assert!(q.pop_next().is_none());
    }

    #[test]
    fn test_time_then_insertion_order() {
        // A@5, B@3, C@3, D@8 → B, C, A, D.
        let mut q = EventQueue::new();
        q.insert(VirtualTime::ZERO, at(5), noop()).unwrap();
        q.insert(VirtualTime::ZERO, at(3), noop()).unwrap();
        q.insert(VirtualTime::ZERO, at(3), noop()).unwrap();
        q.insert(VirtualTime::ZERO, at(8), noop()).unwrap();

        assert_eq!(drain_ids(&mut q), vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_insert_in_past_rejected() {
        let mut q = EventQueue::new();
        let err = q.insert(at(10), at(9), noop()).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidSchedule { requested, now } if requested == at(9) && now == at(10)
        ));
        assert!(q.is_empty());
        // No id was consumed by the failed insert.
        assert_eq!(q.next_event_id(), EventId::new(0));
    }

    #[test]
    fn test_insert_at_now_accepted() {
        let mut q = EventQueue::new();
        let later = q.insert(at(10), at(11), noop()).unwrap();
        let now = q.insert(at(10), at(10), noop()).unwrap();
        assert_eq!(q.pop_next().unwrap().id, now.id());
        assert_eq!(q.pop_next().unwrap().id, later.id());
    }

    #[test]
    fn test_cancel_skips_event() {
        let mut q = EventQueue::new();
        let a = q.insert(VirtualTime::ZERO, at(1), noop()).unwrap();
        let b = q.insert(VirtualTime::ZERO, at(2), noop()).unwrap();

        assert!(q.cancel(a));
        assert_eq!(q.len(), 1);
        assert_eq!(q.status(a), EventStatus::Cancelled);
        assert_eq!(q.peek_time(), Some(at(2)));
        assert_eq!(q.pop_next().unwrap().id, b.id());
        assert!(q.pop_next().is_none());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut q = EventQueue::new();
        let a = q.insert(VirtualTime::ZERO, at(1), noop()).unwrap();
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert_eq!(q.status(a), EventStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_execution_is_noop() {
        let mut q = EventQueue::new();
        let a = q.insert(VirtualTime::ZERO, at(1), noop()).unwrap();
        q.pop_next().unwrap();
        assert_eq!(q.status(a), EventStatus::Executed);
        assert!(!q.cancel(a));
        assert_eq!(q.status(a), EventStatus::Executed);
    }

    #[test]
    fn test_compaction_reclaims_tombstones() {
        let mut q = EventQueue::new();
        let handles: Vec<_> = (0..200)
            .map(|i| q.insert(VirtualTime::ZERO, at(i), noop()).unwrap())
            .collect();

        for h in &handles[..150] {
            q.cancel(*h);
        }

        assert_eq!(q.len(), 50);
        assert!(q.heap_len() < 200, "heap was never compacted");
        let ids = drain_ids(&mut q);
        assert_eq!(ids, (150..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_churn_stays_bounded() {
        let mut q = EventQueue::new();
        let mut now = VirtualTime::ZERO;
        for i in 0..10_000u64 {
            let h = q.insert(now, at(i + 1_000), noop()).unwrap();
            assert!(q.cancel(h));
            if i % 100 == 0 {
                // Tombstones passed over at the head are forgotten too.
                assert!(q.pop_next().is_none());
                now = at(i);
            }
            assert!(q.cancelled.len() < 2 * COMPACT_MIN_STALE);
            assert!(q.heap_len() < 2 * COMPACT_MIN_STALE);
        }
        assert!(q.is_empty());
    }

    #[test]
    fn test_reclaimed_cancel_is_forgotten() {
        let mut q = EventQueue::new();
        let a = q.insert(VirtualTime::ZERO, at(1), noop()).unwrap();
        let b = q.insert(VirtualTime::ZERO, at(2), noop()).unwrap();
        assert!(q.cancel(a));
        assert_eq!(q.status(a), EventStatus::Cancelled);

        assert_eq!(q.pop_next().unwrap().id, b.id());
        assert!(q.cancelled.is_empty());
        assert_eq!(q.status(a), EventStatus::Executed);
        assert!(!q.cancel(a));
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut q = EventQueue::new();
        let a = q.insert(VirtualTime::ZERO, at(1), noop()).unwrap();
        q.insert(VirtualTime::ZERO, at(2), noop()).unwrap();
        q.cancel(a);
        q.clear();
        assert!(q.is_empty());
        assert!(q.cancelled.is_empty());
        assert!(q.peek_time().is_none());
        assert!(!q.cancel(a));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pop_order_is_time_then_insertion(times in prop::collection::vec(0u64..50, 0..200)) {
                let mut q = EventQueue::new();
                for t in &times {
                    q.insert(VirtualTime::ZERO, at(*t), noop()).unwrap();
                }

                let mut popped = Vec::new();
                while let Some(e) = q.pop_next() {
                    popped.push((e.scheduled_at, e.id));
                }

                prop_assert_eq!(popped.len(), times.len());
                for w in popped.windows(2) {
                    prop_assert!(w[0].0 <= w[1].0);
                    if w[0].0 == w[1].0 {
                        prop_assert!(w[0].1 < w[1].1);
                    }
                }
            }

            #[test]
            fn cancelled_events_never_pop(
                times in prop::collection::vec(0u64..100, 1..150),
                mask in prop::collection::vec(any::<bool>(), 150),
            ) {
                let mut q = EventQueue::new();
                let handles: Vec<_> = times
                    .iter()
                    .map(|t| q.insert(VirtualTime::ZERO, at(*t), noop()).unwrap())
                    .collect();

                let mut cancelled = HashSet::new();
                for (h, cancel) in handles.iter().zip(mask.iter()) {
                    if *cancel {
                        prop_assert!(q.cancel(*h));
                        cancelled.insert(h.id());
                    }
                }

                prop_assert_eq!(q.len(), handles.len() - cancelled.len());
                let mut seen = 0;
                while let Some(e) = q.pop_next() {
                    prop_assert!(!cancelled.contains(&e.id));
                    seen += 1;
                }
                prop_assert_eq!(seen, handles.len() - cancelled.len());
            }
        }
    }
}
