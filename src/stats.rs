//! Throughput statistics gathered through scheduled callbacks.
//!
//! Nothing here is kernel behaviour: a [`ThroughputSampler`] is just a
//! periodic event that reads a [`ByteCounter`] and records how many bytes
//! arrived since its previous occurrence.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::engine::{Engine, PeriodicHandle};
use crate::error::SimResult;
use crate::time::VirtualTime;

/// Cumulative received-bytes counter shared between a sink and whoever
/// samples it.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Rc<Cell<u64>>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: u64) {
        self.0.set(self.0.get().saturating_add(bytes));
    }

    pub fn total(&self) -> u64 {
        self.0.get()
    }
}

/// Throughput observed over one sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// End of the window.
    pub at: VirtualTime,
    /// Bytes received during the window.
    pub bytes: u64,
    pub mbps: f64,
}

/// Converts a byte count over a window into Mbit/s. Zero-length windows
/// yield zero.
pub fn throughput_mbps(bytes: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 * 8.0 / secs / 1e6
}

/// Mean throughput of `total_bytes` spread over `duration`.
pub fn average_throughput_mbps(total_bytes: u64, duration: Duration) -> f64 {
    throughput_mbps(total_bytes, duration)
}

/// Periodically records the throughput seen by a [`ByteCounter`].
#[derive(Debug)]
pub struct ThroughputSampler {
    samples: Rc<RefCell<Vec<Sample>>>,
    periodic: PeriodicHandle,
}

impl ThroughputSampler {
    /// Install a sampler that first fires at `start` and then every
    /// `interval`.
    pub fn install(
        engine: &mut Engine,
        counter: ByteCounter,
        start: VirtualTime,
        interval: Duration,
    ) -> SimResult<Self> {
        let samples = Rc::new(RefCell::new(Vec::new()));
        let out = Rc::clone(&samples);
        let mut last_total = counter.total();

        let periodic = engine.schedule_periodic(start, interval, move |ctx| {
            let total = counter.total();
            let bytes = total.saturating_sub(last_total);
            last_total = total;

            let sample = Sample {
                at: ctx.now(),
                bytes,
                mbps: throughput_mbps(bytes, interval),
            };
            debug!(at = %sample.at, bytes, mbps = sample.mbps, "throughput sample");
            out.borrow_mut().push(sample);
            Ok(())
        })?;

        Ok(ThroughputSampler { samples, periodic })
    }

    /// Samples recorded so far, oldest first.
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.borrow().clone()
    }

    /// Stop sampling.
    pub fn stop(&self, engine: &mut Engine) -> SimResult<bool> {
        engine.cancel_periodic(&self.periodic)
    }
}
