//! Structured error types for kairos.
//!
//! All fallible public APIs return `Result<T, SimError>`. Scheduling and
//! cancellation errors surface synchronously to the caller; a failing
//! callback aborts `Engine::run` and comes back as [`SimError::Callback`]
//! carrying the original error as its source.

use std::time::Duration;

use crate::event::EventId;
use crate::time::VirtualTime;

/// The top-level error type for the simulation kernel.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    // ── Scheduling errors ─────────────────────────────────

    /// Attempted to schedule an event (or a stop) before the current time.
    #[error("cannot schedule at {requested} when current time is {now}")]
    InvalidSchedule {
        requested: VirtualTime,
        now: VirtualTime,
    },

    /// `now + delay` does not fit on the timeline.
    #[error("scheduling {delay:?} after {now} overflows virtual time")]
    TimeOverflow { now: VirtualTime, delay: Duration },

    /// A periodic event was requested with a zero interval.
    #[error("periodic interval must be greater than zero")]
    InvalidInterval,

    // ── Lifecycle errors ──────────────────────────────────

    /// The engine was torn down with `destroy()`.
    #[error("engine has been destroyed")]
    EngineDestroyed,

    // ── Callback errors ───────────────────────────────────

    /// A user callback returned an error; the run loop was aborted.
    #[error("callback for {event} at {at} failed")]
    Callback {
        event: EventId,
        at: VirtualTime,
        #[source]
        source: anyhow::Error,
    },

    // ── Scenario / config errors ──────────────────────────

    /// A scenario configuration failed validation.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_invalid_schedule() {
        let e = SimError::InvalidSchedule {
            requested: VirtualTime::from_secs(3),
            now: VirtualTime::from_secs(10),
        };
        let s = e.to_string();
        assert!(s.contains("3.000000000s"));
        assert!(s.contains("10.000000000s"));
    }

    #[test]
    fn test_callback_error_keeps_source() {
        let e = SimError::Callback {
            event: EventId::new(7),
            at: VirtualTime::from_millis(5),
            source: anyhow::anyhow!("sink overflowed"),
        };
        assert!(e.to_string().contains("E#7"));
        let source = e.source().expect("callback error has a source");
        assert_eq!(source.to_string(), "sink overflowed");
    }

    #[test]
    fn test_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::EngineDestroyed);
        assert_eq!(e.to_string(), "engine has been destroyed");
    }

    #[test]
    fn test_sim_result_err() {
        let r: SimResult<u32> = Err(SimError::InvalidInterval);
        assert!(matches!(r, Err(SimError::InvalidInterval)));
    }
}
