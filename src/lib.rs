//! # Kairos — Discrete-Event Simulation Kernel
//!
//! A reusable kernel for scheduling and executing timestamped events in
//! virtual time. No threads, no wall-clock time and no global state: an
//! [`Engine`] is an ordinary value that owns its clock and event queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────┐
//! │  scenario / stats      │ ← collaborators: traffic, samplers
//! │  ┌──────────────────┐  │
//! │  │     Engine        │  │ ← run loop, stop time, lifecycle
//! │  │  ┌────────────┐   │  │
//! │  │  │ EventQueue │   │  │ ← (time, id) min-heap + lazy cancel
//! │  │  └────────────┘   │  │
//! │  │  ┌────────────┐   │  │
//! │  │  │ VirtualTime│   │  │ ← nanosecond clock
//! │  │  └────────────┘   │  │
//! │  └──────────────────┘  │
//! └────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use kairos::{Engine, VirtualTime};
//!
//! let mut engine = Engine::new();
//! engine
//!     .schedule_periodic(VirtualTime::ZERO, Duration::from_millis(100), |ctx| {
//!         println!("tick at {}", ctx.now());
//!         Ok(())
//!     })
//!     .unwrap();
//! engine.schedule_stop(VirtualTime::from_millis(350)).unwrap();
//! let summary = engine.run().unwrap();
//! assert_eq!(summary.events, 4);
//! assert_eq!(engine.now(), VirtualTime::from_millis(350));
//! ```

pub mod engine;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod queue;
pub mod scenario;
pub mod stats;
pub mod time;

// Re-exports for convenience.
pub use engine::{Context, Engine, EngineState, PeriodicHandle, RunSummary, StopReason};
pub use error::{SimError, SimResult};
pub use event::{Callback, EventHandle, EventId, EventStatus};
pub use eventlog::EventLog;
pub use queue::EventQueue;
pub use scenario::{run_scenario, ScenarioConfig, ScenarioReport};
pub use stats::{ByteCounter, Sample, ThroughputSampler};
pub use time::VirtualTime;
