//! Self re-arming events.
//!
//! A periodic event is an ordinary one-shot event whose callback, after
//! running the user's closure, schedules the next occurrence `interval`
//! later. Every occurrence therefore gets a fresh id and takes its place in
//! the FIFO tie-break like any other event.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{SimError, SimResult};
use crate::event::EventHandle;
use crate::queue::EventQueue;
use crate::time::VirtualTime;

use super::context::Context;

#[derive(Debug)]
struct PeriodicState {
    active: Cell<bool>,
    next: Cell<Option<EventHandle>>,
    fired: Cell<u64>,
}

/// Handle to a periodic event.
///
/// Cheap to clone; all clones refer to the same series of occurrences.
#[derive(Debug, Clone)]
pub struct PeriodicHandle {
    state: Rc<PeriodicState>,
}

impl PeriodicHandle {
    /// `false` once the series has been cancelled or an occurrence failed.
    pub fn is_active(&self) -> bool {
        self.state.active.get()
    }

    /// Number of occurrences executed so far.
    pub fn fired(&self) -> u64 {
        self.state.fired.get()
    }

    /// The pending occurrence, if one is queued.
    pub fn next_event(&self) -> Option<EventHandle> {
        self.state.next.get()
    }

    pub(crate) fn cancel_in(&self, queue: &mut EventQueue) -> bool {
        let was_active = self.state.active.replace(false);
        if let Some(handle) = self.state.next.take() {
            queue.cancel(handle);
        }
        was_active
    }
}

pub(crate) fn start<F>(
    queue: &mut EventQueue,
    now: VirtualTime,
    first: VirtualTime,
    interval: Duration,
    f: F,
) -> SimResult<PeriodicHandle>
where
    F: FnMut(&mut Context<'_>) -> anyhow::Result<()> + 'static,
{
    if interval.is_zero() {
        return Err(SimError::InvalidInterval);
    }
    let state = Rc::new(PeriodicState {
        active: Cell::new(true),
        next: Cell::new(None),
        fired: Cell::new(0),
    });
    arm(queue, now, first, interval, Rc::clone(&state), f)?;
    Ok(PeriodicHandle { state })
}

fn arm<F>(
    queue: &mut EventQueue,
    now: VirtualTime,
    at: VirtualTime,
    interval: Duration,
    state: Rc<PeriodicState>,
    mut f: F,
) -> SimResult<EventHandle>
where
    F: FnMut(&mut Context<'_>) -> anyhow::Result<()> + 'static,
{
    let shared = Rc::clone(&state);
    let handle = queue.insert(
        now,
        at,
        Box::new(move |ctx: &mut Context<'_>| -> anyhow::Result<()> {
            shared.next.set(None);
            shared.fired.set(shared.fired.get() + 1);
            if let Err(err) = f(ctx) {
                shared.active.set(false);
                return Err(err);
            }

            // The closure may have cancelled its own series.
            if !shared.active.get() {
                return Ok(());
            }
            let next_at = ctx.now.checked_add(interval).ok_or(SimError::TimeOverflow {
                now: ctx.now,
                delay: interval,
            })?;
            arm(ctx.queue, ctx.now, next_at, interval, shared, f)?;
            Ok(())
        }),
    )?;
    state.next.set(Some(handle));
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    #[test]
    fn test_zero_interval_rejected() {
        let mut engine = Engine::new();
        let err = engine
            .schedule_periodic(VirtualTime::ZERO, Duration::ZERO, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidInterval));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_start_in_past_rejected() {
        let mut engine = Engine::new();
        engine.schedule_at(VirtualTime::from_nanos(50), |_| Ok(())).unwrap();
        engine.run().unwrap();

        let err = engine
            .schedule_periodic(VirtualTime::from_nanos(10), Duration::from_nanos(5), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule { .. }));
    }

    #[test]
    fn test_cancel_from_outside() {
        let mut engine = Engine::new();
        let periodic = engine
            .schedule_periodic(VirtualTime::ZERO, Duration::from_nanos(10), |_| Ok(()))
            .unwrap();

        engine.schedule_stop(VirtualTime::from_nanos(25)).unwrap();
        engine.run().unwrap();
        assert_eq!(periodic.fired(), 3);
        assert!(periodic.next_event().is_some());

        assert!(engine.cancel_periodic(&periodic).unwrap());
        assert!(!periodic.is_active());
        assert!(periodic.next_event().is_none());
        assert_eq!(engine.pending_count(), 0);

        engine.run().unwrap();
        assert_eq!(periodic.fired(), 3);
        assert!(!engine.cancel_periodic(&periodic).unwrap());
    }

    #[test]
    fn test_cancel_from_own_callback() {
        let mut engine = Engine::new();
        let slot: Rc<Cell<Option<PeriodicHandle>>> = Rc::new(Cell::new(None));
        let inner = Rc::clone(&slot);

        let periodic = engine
            .schedule_periodic(VirtualTime::ZERO, Duration::from_nanos(10), move |ctx| {
                if ctx.now() >= VirtualTime::from_nanos(20) {
                    if let Some(me) = inner.take() {
                        ctx.cancel_periodic(&me);
                    }
                }
                Ok(())
            })
            .unwrap();
        slot.set(Some(periodic.clone()));

        let summary = engine.run().unwrap();
        assert_eq!(summary.events, 3);
        assert_eq!(periodic.fired(), 3);
        assert!(!periodic.is_active());
        assert_eq!(engine.now(), VirtualTime::from_nanos(20));
    }

    #[test]
    fn test_failing_occurrence_is_not_rearmed() {
        let mut engine = Engine::new();
        let periodic = engine
            .schedule_periodic(VirtualTime::ZERO, Duration::from_nanos(10), |ctx| {
                if ctx.now() == VirtualTime::from_nanos(10) {
                    anyhow::bail!("sampler lost its sink");
                }
                Ok(())
            })
            .unwrap();

        let err = engine.run().unwrap_err();
        assert!(matches!(err, SimError::Callback { .. }));
        assert_eq!(periodic.fired(), 2);
        assert_eq!(engine.pending_count(), 0);
        assert!(!periodic.is_active());
        assert!(periodic.next_event().is_none());
        assert!(!engine.cancel_periodic(&periodic).unwrap());
    }
}
