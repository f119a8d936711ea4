//! The simulation engine: virtual clock plus run loop.
//!
//! An [`Engine`] owns its [`EventQueue`] and the only writable copy of the
//! clock. There is no global simulator; every component that needs to
//! schedule work is handed either the engine itself (during setup) or a
//! [`Context`] (from inside a callback).
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`context`] | [`Context`], the scheduling surface seen by callbacks |
//! | [`periodic`] | [`PeriodicHandle`] and self re-arming events |
//!
//! # Stop time and the clock
//!
//! When `run` ends because the next pending event lies beyond the stop
//! time, the clock is moved to exactly the stop time. When the queue
//! drains first, the clock stays at the time of the last executed event.

pub mod context;
pub mod periodic;

pub use context::Context;
pub use periodic::PeriodicHandle;

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::error::{SimError, SimResult};
use crate::event::{EventHandle, EventStatus};
use crate::eventlog::EventLog;
use crate::queue::EventQueue;
use crate::time::VirtualTime;

// ── State ─────────────────────────────────────────────────────────────

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Created, `run` not called yet.
    Idle,
    /// Inside `run`.
    Running,
    /// `run` returned; may be resumed with another `run`.
    Stopped,
    /// Torn down by `destroy`. Terminal.
    Destroyed,
}

/// Why a call to `run` returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// No pending events remain.
    QueueExhausted,
    /// The next pending event lies beyond the stop time.
    StopTimeReached,
    /// A callback called [`Context::stop`].
    StopRequested,
}

/// Outcome of a successful `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Events executed during this call.
    pub events: u64,
    /// Clock value when the run returned.
    pub now: VirtualTime,
    pub reason: StopReason,
}

enum Dispatch {
    Ran(EventHandle),
    Exhausted,
    StopTime,
}

// ── Engine ────────────────────────────────────────────────────────────

/// Discrete-event simulation engine.
///
/// A stop time is consumed only when the clock reaches it. If the queue
/// drains first, the clock stays at the last event and the stop time stays
/// set for the next run.
pub struct Engine {
    queue: EventQueue,
    clock: VirtualTime,
    state: EngineState,
    stop_at: Option<VirtualTime>,
    stop_requested: bool,
    events_processed: u64,
    log: Option<EventLog>,
}

impl Engine {
    /// Create an idle engine with the clock at zero.
    pub fn new() -> Self {
        Engine {
            queue: EventQueue::new(),
            clock: VirtualTime::ZERO,
            state: EngineState::Idle,
            stop_at: None,
            stop_requested: false,
            events_processed: 0,
            log: None,
        }
    }

    /// Current virtual time. Valid in every state.
    #[inline]
    pub fn now(&self) -> VirtualTime {
        self.clock
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Total events executed over the engine's lifetime.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Number of live pending events.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// The stop time currently in force, if any.
    pub fn stop_time(&self) -> Option<VirtualTime> {
        self.stop_at
    }

    pub fn status(&self, handle: EventHandle) -> EventStatus {
        self.queue.status(handle)
    }

    // ── Scheduling ────────────────────────────────────────────────

    /// Schedule `f` at the absolute time `at`.
    pub fn schedule_at<F>(&mut self, at: VirtualTime, f: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        self.ensure_alive()?;
        let handle = self.queue.insert(self.clock, at, Box::new(f))?;
        debug!(event = %handle.id(), %at, now = %self.clock, "scheduled");
        Ok(handle)
    }

    /// Schedule `f` to run `delay` after the current time.
    pub fn schedule_in<F>(&mut self, delay: Duration, f: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        let at = self.offset(delay)?;
        self.schedule_at(at, f)
    }

    /// Schedule `f` at the current time, after everything already queued
    /// for this instant.
    pub fn schedule_now<F>(&mut self, f: F) -> SimResult<EventHandle>
    where
        F: FnOnce(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        self.schedule_at(self.clock, f)
    }

    /// Schedule `f` at `start` and then every `interval` until cancelled.
    pub fn schedule_periodic<F>(
        &mut self,
        start: VirtualTime,
        interval: Duration,
        f: F,
    ) -> SimResult<PeriodicHandle>
    where
        F: FnMut(&mut Context<'_>) -> anyhow::Result<()> + 'static,
    {
        self.ensure_alive()?;
        periodic::start(&mut self.queue, self.clock, start, interval, f)
    }

    /// Revoke a pending event.
    ///
    /// `Ok(true)` if the event was pending, `Ok(false)` if it had already
    /// run or been cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> SimResult<bool> {
        self.ensure_alive()?;
        let cancelled = self.queue.cancel(handle);
        debug!(event = %handle.id(), cancelled, "cancel");
        Ok(cancelled)
    }

    /// Stop a periodic event; its pending occurrence is cancelled.
    pub fn cancel_periodic(&mut self, handle: &PeriodicHandle) -> SimResult<bool> {
        self.ensure_alive()?;
        Ok(handle.cancel_in(&mut self.queue))
    }

    /// Set the time beyond which no events are executed.
    ///
    /// Replaces any earlier stop time.
    pub fn schedule_stop(&mut self, at: VirtualTime) -> SimResult<()> {
        self.ensure_alive()?;
        if at < self.clock {
            return Err(SimError::InvalidSchedule {
                requested: at,
                now: self.clock,
            });
        }
        debug!(%at, now = %self.clock, "stop time set");
        self.stop_at = Some(at);
        Ok(())
    }

    /// Relative form of [`schedule_stop`](Self::schedule_stop).
    pub fn schedule_stop_in(&mut self, delay: Duration) -> SimResult<()> {
        let at = self.offset(delay)?;
        self.schedule_stop(at)
    }

    // ── Execution ─────────────────────────────────────────────────

    /// Execute events until the queue drains, the stop time is reached,
    /// or a callback requests a stop.
    ///
    /// A failing callback aborts the run: the clock stays at the failing
    /// event's time, the queue keeps whatever the callback left in it, and
    /// the engine is left `Stopped` so the run can be resumed.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.ensure_alive()?;
        self.state = EngineState::Running;
        self.stop_requested = false;
        let start = self.events_processed;
        info!(now = %self.clock, pending = self.queue.len(), stop = ?self.stop_at, "run started");

        let reason = loop {
            match self.dispatch_next() {
                Ok(Dispatch::Ran(_)) if self.stop_requested => break StopReason::StopRequested,
                Ok(Dispatch::Ran(_)) => {}
                Ok(Dispatch::Exhausted) => break StopReason::QueueExhausted,
                Ok(Dispatch::StopTime) => break StopReason::StopTimeReached,
                Err(err) => {
                    self.state = EngineState::Stopped;
                    self.stop_requested = false;
                    warn!(now = %self.clock, error = %err, "run aborted");
                    return Err(err);
                }
            }
        };

        self.state = EngineState::Stopped;
        self.stop_requested = false;
        let summary = RunSummary {
            events: self.events_processed - start,
            now: self.clock,
            reason,
        };
        info!(events = summary.events, now = %summary.now, reason = ?reason, "run finished");
        Ok(summary)
    }

    /// Execute exactly one event, honouring the stop time.
    ///
    /// Returns the handle of the executed event, or `None` if nothing was
    /// eligible. Does not change the engine's state.
    pub fn step(&mut self) -> SimResult<Option<EventHandle>> {
        self.ensure_alive()?;
        let result = self.dispatch_next();
        self.stop_requested = false;
        match result? {
            Dispatch::Ran(handle) => Ok(Some(handle)),
            Dispatch::Exhausted | Dispatch::StopTime => Ok(None),
        }
    }

    /// Drop every pending event without executing it and tear the engine
    /// down. Later scheduling, cancellation and run calls fail with
    /// [`SimError::EngineDestroyed`]. Calling it twice is harmless.
    pub fn destroy(&mut self) {
        if self.state == EngineState::Destroyed {
            return;
        }
        let dropped = self.queue.len();
        self.queue.clear();
        self.stop_at = None;
        self.state = EngineState::Destroyed;
        info!(dropped, now = %self.clock, "engine destroyed");
    }

    // ── Dispatch trace ────────────────────────────────────────────

    /// Start recording every executed event.
    pub fn enable_trace(&mut self) {
        if self.log.is_none() {
            self.log = Some(EventLog::new());
        }
    }

    /// The dispatch trace, if enabled.
    pub fn trace(&self) -> Option<&EventLog> {
        self.log.as_ref()
    }

    // ── Internals ─────────────────────────────────────────────────

    fn ensure_alive(&self) -> SimResult<()> {
        if self.state == EngineState::Destroyed {
            Err(SimError::EngineDestroyed)
        } else {
            Ok(())
        }
    }

    fn offset(&self, delay: Duration) -> SimResult<VirtualTime> {
        self.clock.checked_add(delay).ok_or(SimError::TimeOverflow {
            now: self.clock,
            delay,
        })
    }

    fn dispatch_next(&mut self) -> SimResult<Dispatch> {
        let Some(next_at) = self.queue.peek_time() else {
            return Ok(Dispatch::Exhausted);
        };
        if let Some(stop) = self.stop_at {
            if next_at > stop {
                self.clock = self.clock.max(stop);
                self.stop_at = None;
                debug!(now = %self.clock, "stop time reached");
                return Ok(Dispatch::StopTime);
            }
        }
        let Some(event) = self.queue.pop_next() else {
            return Ok(Dispatch::Exhausted);
        };

        debug_assert!(
            event.scheduled_at >= self.clock,
            "time went backward: now={}, event={}",
            self.clock,
            event.scheduled_at
        );
        let handle = event.handle();
        self.clock = event.scheduled_at;
        self.events_processed += 1;
        trace!(event = %event.id, now = %self.clock, "dispatch");
        if let Some(log) = self.log.as_mut() {
            log.record(event.id, event.scheduled_at);
        }

        let mut ctx = Context {
            queue: &mut self.queue,
            now: self.clock,
            current: handle,
            stop_at: &mut self.stop_at,
            stop_requested: &mut self.stop_requested,
        };
        (event.callback)(&mut ctx).map_err(|source| SimError::Callback {
            event: event.id,
            at: event.scheduled_at,
            source,
        })?;
        Ok(Dispatch::Ran(handle))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("now", &self.clock)
            .field("state", &self.state)
            .field("stop_at", &self.stop_at)
            .field("events_processed", &self.events_processed)
            .field("queue", &self.queue)
            .finish()
    }
}
