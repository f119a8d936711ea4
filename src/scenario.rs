//! Access-point scenario built on the kernel.
//!
//! One access point streams constant-rate traffic to `stations` receivers
//! placed on a circle around it. Every packet crosses a shared medium that
//! serialises transmissions at `link_rate_bps` and adds constant-speed
//! propagation delay. A [`ThroughputSampler`] watches the first station's
//! sink every `sample_interval_ms`.
//!
//! There is no radio loss model, MAC contention or congestion control:
//! the medium only orders and delays packets, and drops them when its
//! backlog exceeds `max_queue_delay_ms`.

use std::cell::{Cell, RefCell};
use std::f64::consts::TAU;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{SimError, SimResult};
use crate::stats::{average_throughput_mbps, ByteCounter, Sample, ThroughputSampler};
use crate::time::VirtualTime;

/// Propagation speed used for the link delay, in m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

// ── Configuration ─────────────────────────────────────────────────────

/// Knobs of the scenario. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Application payload per packet, in bytes.
    pub payload_size: u32,
    /// Offered load per station, in bit/s.
    pub data_rate_bps: u64,
    /// Capacity of the shared medium, in bit/s.
    pub link_rate_bps: u64,
    /// Seconds of traffic; the run stops one second after this.
    pub simulation_time_secs: f64,
    pub stations: u32,
    /// Radius of the station circle, in metres.
    pub distance_m: f64,
    pub sample_interval_ms: u64,
    pub sink_start_secs: f64,
    pub source_start_secs: f64,
    pub sampler_start_secs: f64,
    /// Backlog beyond which the medium drops new packets.
    pub max_queue_delay_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            payload_size: 1472,
            data_rate_bps: 5_000_000,
            link_rate_bps: 65_000_000,
            simulation_time_secs: 3.0,
            stations: 3,
            distance_m: 34.0,
            sample_interval_ms: 100,
            sink_start_secs: 0.0,
            source_start_secs: 1.0,
            sampler_start_secs: 1.1,
            max_queue_delay_ms: 100,
        }
    }
}

impl ScenarioConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> SimResult<Self> {
        let config: ScenarioConfig =
            serde_json::from_str(text).map_err(|e| SimError::InvalidScenario(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        let fail = |msg: &str| Err(SimError::InvalidScenario(msg.to_string()));
        if self.stations == 0 {
            return fail("at least one station is required");
        }
        if self.payload_size == 0 {
            return fail("payload_size must be positive");
        }
        if self.data_rate_bps == 0 || self.link_rate_bps == 0 {
            return fail("data and link rates must be positive");
        }
        if self.packet_interval().is_zero() {
            return fail("data_rate_bps is too high for payload_size");
        }
        if self.sample_interval_ms == 0 {
            return fail("sample_interval_ms must be positive");
        }
        if !(self.simulation_time_secs.is_finite() && self.simulation_time_secs > 0.0) {
            return fail("simulation_time_secs must be positive");
        }
        if !(self.distance_m.is_finite() && self.distance_m >= 0.0) {
            return fail("distance_m must be a non-negative number");
        }
        let starts = [
            self.sink_start_secs,
            self.source_start_secs,
            self.sampler_start_secs,
        ];
        if starts.iter().any(|s| !(s.is_finite() && *s >= 0.0)) {
            return fail("start times must be non-negative");
        }
        Ok(())
    }

    /// Gap between two packets of one source.
    pub fn packet_interval(&self) -> Duration {
        transmission_time(self.payload_size, self.data_rate_bps)
    }

    /// When the engine stops: one second past the traffic window.
    pub fn stop_time(&self) -> VirtualTime {
        VirtualTime::from_secs_f64(self.simulation_time_secs + 1.0)
    }
}

// ── Placement ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Station `i` of `n` sits at angle `2πi/n` on a circle of radius
/// `distance` around the origin.
pub fn place_stations(n: u32, distance: f64) -> Vec<Position> {
    (0..n)
        .map(|i| {
            let angle = f64::from(i) / f64::from(n) * TAU;
            Position {
                x: distance * angle.cos(),
                y: distance * angle.sin(),
            }
        })
        .collect()
}

/// Time to clock `bytes` onto a wire running at `rate_bps`, rounded down
/// to the nanosecond.
pub fn transmission_time(bytes: u32, rate_bps: u64) -> Duration {
    let nanos = u128::from(bytes) * 8 * 1_000_000_000 / u128::from(rate_bps.max(1));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Constant-speed propagation delay over `metres`.
pub fn propagation_delay(metres: f64) -> Duration {
    Duration::from_secs_f64(metres / SPEED_OF_LIGHT)
}

// ── Medium ────────────────────────────────────────────────────────────

/// FIFO transmitter shared by every flow leaving the access point.
#[derive(Debug)]
struct Medium {
    rate_bps: u64,
    busy_until: VirtualTime,
    max_backlog: Duration,
    dropped: u64,
}

impl Medium {
    /// Queue `bytes` for transmission at `now`. Returns when the last bit
    /// leaves the transmitter, or `None` if the packet was dropped.
    fn transmit(&mut self, now: VirtualTime, bytes: u32) -> Option<VirtualTime> {
        let start = self.busy_until.max(now);
        if start.duration_since(now).unwrap_or_default() > self.max_backlog {
            self.dropped += 1;
            return None;
        }
        let airtime = transmission_time(bytes, self.rate_bps);
        let done = start.checked_add(airtime)?;
        self.busy_until = done;
        Some(done)
    }
}

// ── Report ────────────────────────────────────────────────────────────

/// Everything a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    /// Access point first, then the stations.
    pub placements: Vec<Position>,
    /// Throughput samples at the first station.
    pub samples: Vec<Sample>,
    /// Bytes received by each station's sink.
    pub station_bytes: Vec<u64>,
    pub dropped_packets: u64,
    /// Mean throughput at the first station over the traffic window.
    pub average_mbps: f64,
    /// Mean throughput summed over all stations.
    pub aggregate_mbps: f64,
    pub events_processed: u64,
    pub end_time: VirtualTime,
    /// Hash of the dispatch trace; equal configs give equal hashes.
    pub trace_hash: u64,
}

// ── Run ───────────────────────────────────────────────────────────────

/// Build the topology, run it to the stop time and tear the engine down.
pub fn run_scenario(config: &ScenarioConfig) -> SimResult<ScenarioReport> {
    config.validate()?;

    let mut engine = Engine::new();
    engine.enable_trace();

    let ap = Position { x: 0.0, y: 0.0 };
    let stations = place_stations(config.stations, config.distance_m);
    info!(x = ap.x, y = ap.y, "placing access point");
    for (i, pos) in stations.iter().enumerate() {
        info!(station = i + 1, x = pos.x, y = pos.y, "placing station");
    }

    let medium = Rc::new(RefCell::new(Medium {
        rate_bps: config.link_rate_bps,
        busy_until: VirtualTime::ZERO,
        max_backlog: Duration::from_millis(config.max_queue_delay_ms),
        dropped: 0,
    }));

    // Sinks only count bytes once they have started.
    let listening = Rc::new(Cell::new(false));
    let flag = Rc::clone(&listening);
    engine.schedule_at(VirtualTime::from_secs_f64(config.sink_start_secs), move |ctx| {
        debug!(now = %ctx.now(), "sinks started");
        flag.set(true);
        Ok(())
    })?;

    let counters: Vec<ByteCounter> = stations.iter().map(|_| ByteCounter::new()).collect();
    let source_start = VirtualTime::from_secs_f64(config.source_start_secs);
    let payload = config.payload_size;

    for (pos, counter) in stations.iter().zip(&counters) {
        let delay = propagation_delay(ap.distance_to(pos));
        let medium = Rc::clone(&medium);
        let counter = counter.clone();
        let listening = Rc::clone(&listening);

        engine.schedule_periodic(source_start, config.packet_interval(), move |ctx| {
            let Some(done) = medium.borrow_mut().transmit(ctx.now(), payload) else {
                return Ok(());
            };
            let arrival = done
                .checked_add(delay)
                .ok_or(SimError::TimeOverflow { now: done, delay })?;
            let counter = counter.clone();
            let listening = Rc::clone(&listening);
            ctx.schedule_at(arrival, move |_| {
                if listening.get() {
                    counter.add(u64::from(payload));
                }
                Ok(())
            })?;
            Ok(())
        })?;
    }

    let sampler = ThroughputSampler::install(
        &mut engine,
        counters[0].clone(),
        VirtualTime::from_secs_f64(config.sampler_start_secs),
        Duration::from_millis(config.sample_interval_ms),
    )?;

    engine.schedule_stop(config.stop_time())?;
    let summary = engine.run()?;

    let window = Duration::from_secs_f64(config.simulation_time_secs);
    let station_bytes: Vec<u64> = counters.iter().map(ByteCounter::total).collect();
    let total: u64 = station_bytes.iter().sum();
    let report = ScenarioReport {
        placements: std::iter::once(ap).chain(stations).collect(),
        samples: sampler.samples(),
        average_mbps: average_throughput_mbps(station_bytes[0], window),
        aggregate_mbps: average_throughput_mbps(total, window),
        station_bytes,
        dropped_packets: medium.borrow().dropped,
        events_processed: summary.events,
        end_time: engine.now(),
        trace_hash: engine.trace().map(|log| log.log_hash()).unwrap_or_default(),
    };

    engine.destroy();
    info!(
        events = report.events_processed,
        average_mbps = report.average_mbps,
        dropped = report.dropped_packets,
        "scenario finished"
    );
    Ok(report)
}
