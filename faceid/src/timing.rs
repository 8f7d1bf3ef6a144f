use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

const RECENT: usize = 10;

/// Latency summary of one operation, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Average of the last 10 calls.
    pub recent_avg_ms: f64,
}

#[derive(Debug, Default)]
struct Samples {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    recent: VecDeque<Duration>,
}

impl Samples {
    fn record(&mut self, d: Duration) {
        if self.count == 0 || d < self.min {
            self.min = d;
        }
        self.max = self.max.max(d);
        self.count += 1;
        self.total += d;
        if self.recent.len() == RECENT {
            self.recent.pop_front();
        }
        self.recent.push_back(d);
    }

    fn stats(&self) -> OperationStats {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let recent: Duration = self.recent.iter().sum();
        OperationStats {
            count: self.count,
            avg_ms: ms(self.total) / self.count.max(1) as f64,
            min_ms: ms(self.min),
            max_ms: ms(self.max),
            recent_avg_ms: ms(recent) / self.recent.len().max(1) as f64,
        }
    }
}

/// Per-operation latency counters.
#[derive(Debug, Default)]
pub struct Timings {
    ops: Mutex<BTreeMap<&'static str, Samples>>,
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` and record how long it took under `op`.
    pub fn time<R>(&self, op: &'static str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.record(op, start.elapsed());
        out
    }

    pub fn record(&self, op: &'static str, d: Duration) {
        self.ops.lock().entry(op).or_default().record(d);
    }

    /// Snapshot of every operation recorded so far.
    pub fn snapshot(&self) -> BTreeMap<&'static str, OperationStats> {
        self.ops
            .lock()
            .iter()
            .map(|(op, s)| (*op, s.stats()))
            .collect()
    }
}
