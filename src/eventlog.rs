/// Dispatch trace for reproducibility checks.
///
/// When enabled on an [`Engine`](crate::Engine), every executed event is
/// appended as a `(id, time)` record. Two runs of the same scenario must
/// produce identical traces; `log_hash` condenses a trace into one value
/// that is cheap to compare, and `export`/`import` move traces through a
/// line-oriented text format.
use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::event::EventId;
use crate::time::VirtualTime;

const HEADER: &str = "# KAIROS DISPATCH LOG v1";

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// One executed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: EventId,
    pub at: VirtualTime,
}

/// Append-only log of executed events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<DispatchRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog {
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, id: EventId, at: VirtualTime) {
        self.records.push(DispatchRecord { id, at });
    }

    pub fn records(&self) -> &[DispatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Deterministic hash of the whole log.
    pub fn log_hash(&self) -> u64 {
        self.records.iter().fold(0u64, |h, r| {
            hash_combine(hash_combine(h, r.id.raw()), r.at.as_nanos())
        })
    }

    // ── Export / Import ───────────────────────────────────────────

    /// Write the log as `E <id> <nanos>` lines under a header.
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{}", HEADER)?;
        writeln!(w, "# events: {}", self.records.len())?;
        for r in &self.records {
            writeln!(w, "E {} {}", r.id.raw(), r.at.as_nanos())?;
        }
        Ok(())
    }

    /// Read a log written by [`export`](Self::export). Blank lines and
    /// `#` comments are skipped.
    pub fn import<R: BufRead>(r: R) -> io::Result<Self> {
        let mut records = Vec::new();
        for line in r.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record = parse_record(line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
        }
        Ok(EventLog { records })
    }
}

fn parse_record(line: &str) -> Result<DispatchRecord, String> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("E") {
        return Err(format!("invalid record line: {}", line));
    }
    let id = parts
        .next()
        .ok_or_else(|| format!("missing event id: {}", line))?
        .parse::<u64>()
        .map_err(|e| format!("bad event id: {}", e))?;
    let nanos = parts
        .next()
        .ok_or_else(|| format!("missing time: {}", line))?
        .parse::<u64>()
        .map_err(|e| format!("bad time: {}", e))?;
    if parts.next().is_some() {
        return Err(format!("trailing data: {}", line));
    }
    Ok(DispatchRecord {
        id: EventId::new(id),
        at: VirtualTime::from_nanos(nanos),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventLog {
        let mut log = EventLog::new();
        log.record(EventId::new(1), VirtualTime::from_nanos(3));
        log.record(EventId::new(2), VirtualTime::from_nanos(3));
        log.record(EventId::new(0), VirtualTime::from_nanos(5));
        log
    }

    #[test]
    fn test_hash_depends_on_order() {
        let a = sample();
        let mut b = EventLog::new();
        b.record(EventId::new(2), VirtualTime::from_nanos(3));
        b.record(EventId::new(1), VirtualTime::from_nanos(3));
        b.record(EventId::new(0), VirtualTime::from_nanos(5));
        assert_ne!(a.log_hash(), b.log_hash());
        assert_eq!(a.log_hash(), sample().log_hash());
    }

    #[test]
    fn test_export_import() {
        let log = sample();
        let mut buf = Vec::new();
        log.export(&mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with(HEADER));
        assert!(text.contains("E 1 3\n"));

        let back = EventLog::import(buf.as_slice()).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let err = EventLog::import("E 1\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = EventLog::import("X 1 2\n".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.log_hash(), 0);
    }
}
