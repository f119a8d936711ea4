//! `Context` — what a running callback sees of the engine.

use std::time::Duration;

use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::event::EventHandle;
use crate::queue::EventQueue;
use crate::time::VirtualTime;

use super::periodic::{self, PeriodicHandle};

/// Mutable view of the engine handed to every callback.
///
/// The event being dispatched has already left the queue, so a callback
/// may freely insert into or cancel from it. The clock itself is
/// read-only here.
pub struct Context<'a> {
    pub(crate) queue: &'a mut EventQueue,
    pub(crate) now: VirtualTime,
    pub(crate) current: EventHandle,
    pub(crate) stop_at: &'a mut Option<VirtualTime>,
    pub(crate) stop_requested: &'a mut bool,
}

impl<'a> Context<'a> {
    /// Current virtual time.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.now
    }

    /// Handle of the event whose callback is running.
    pub fn current_event(&self) -> EventHandle {
        self.current
    }

    /// Number of pending events, not counting the one running.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Schedule `f` at the absolute time `at`.
    ///
    /// Fails with [`SimError::InvalidSchedule`] if `at` is in the past.
    pub fn schedule_at<F>(&mut self, at: VirtualTime, f: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        let handle = self.queue.insert(self.now, at, Box::new(f))?;
        debug!(event = %handle.id(), %at, now = %self.now, "scheduled");
        Ok(handle)
    }

    /// Schedule `f` to run `delay` from now.
    pub fn schedule_in<F>(&mut self, delay: Duration, f: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        let at = self.offset(delay)?;
        self.schedule_at(at, f)
    }

    /// Schedule `f` at the current instant, after everything already
    /// queued for it.
    pub fn schedule_now<F>(&mut self, f: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        self.schedule_at(self.now, f)
    }

    /// Schedule `f` at `start` and every `interval` after that.
    pub fn schedule_periodic<F>(
        &mut self,
        start: VirtualTime,
        interval: Duration,
        f: F,
    ) -> SimResult<PeriodicHandle>
    where
        F: FnMut(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        periodic::start(self.queue, self.now, start, interval, f)
    }

    /// Revoke a pending event. Returns `true` if it was pending.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let cancelled = self.queue.cancel(handle);
        debug!(event = %handle.id(), cancelled, "cancel");
        cancelled
    }

    /// Stop a periodic event, including from inside its own callback.
    pub fn cancel_periodic(&mut self, handle: &PeriodicHandle) -> bool {
        handle.cancel_in(self.queue)
    }

    /// End the current `run` once this callback returns.
    pub fn stop(&mut self) {
        debug!(now = %self.now, "stop requested");
        *self.stop_requested = true;
    }

    /// Set the time beyond which no events are executed.
    pub fn schedule_stop(&mut self, at: VirtualTime) -> SimResult<()> {
        if at < self.now {
            return Err(SimError::InvalidSchedule {
                requested: at,
                now: self.now,
            });
        }
        debug!(%at, now = %self.now, "stop time set");
        *self.stop_at = Some(at);
        Ok(())
    }

    fn offset(&self, delay: Duration) -> SimResult<VirtualTime> {
        self.now.checked_add(delay).ok_or(SimError::TimeOverflow {
            now: self.now,
            delay,
        })
    }
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("now", &self.now)
            .field("current", &self.current.id())
            .field("pending", &self.queue.len())
            .finish()
    }
}
