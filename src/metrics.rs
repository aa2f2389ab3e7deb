//! Server-wide performance metrics (§9: `ServerContext` + `Metrics` pairing).
//!
//! Grounded on the teacher's `metrics.rs`: lock-free counters for hot-path
//! recording, a bounded `VecDeque` latency window for percentile estimates,
//! and a plain-data `MetricsSnapshot` for reporting. Generalized from the
//! teacher's graph-query operation taxonomy to this crate's write/sync path:
//! insert/update/remove/read plus WAL sync and transaction commit latency.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

const LATENCY_WINDOW_SIZE: usize = 1000;
const MAX_SLOW_OPS: usize = 10;

/// Operations above this latency get recorded in the slow-op buffer.
pub const SLOW_OP_THRESHOLD_MS: u64 = 100;

/// The operation kinds this crate's core surface performs (§6.1 Core API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Update,
    Remove,
    Read,
    WalSync,
    TransactionCommit,
    Other,
}

impl OpKind {
    fn label(self) -> &'static str {
        match self {
            OpKind::Insert => "Insert",
            OpKind::Update => "Update",
            OpKind::Remove => "Remove",
            OpKind::Read => "Read",
            OpKind::WalSync => "WalSync",
            OpKind::TransactionCommit => "TransactionCommit",
            OpKind::Other => "Other",
        }
    }

    fn all() -> [OpKind; 7] {
        [
            OpKind::Insert,
            OpKind::Update,
            OpKind::Remove,
            OpKind::Read,
            OpKind::WalSync,
            OpKind::TransactionCommit,
            OpKind::Other,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlowOp {
    pub operation: String,
    pub duration_ms: u64,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationStat {
    pub operation: String,
    pub count: u64,
    pub avg_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub op_count: u64,
    pub slow_op_count: u64,
    pub op_p50_ms: u64,
    pub op_p95_ms: u64,
    pub op_p99_ms: u64,
    pub op_avg_ms: u64,
    pub sync_count: u64,
    pub sync_avg_ms: u64,
    pub last_sync_ms: u64,
    pub top_slow_ops: Vec<SlowOp>,
    pub uptime_secs: u64,
    pub op_stats: Vec<OperationStat>,
}

struct OpCounters {
    counts: [AtomicU64; 7],
    latency_sums: [AtomicU64; 7],
}

impl Default for OpCounters {
    fn default() -> Self {
        OpCounters {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sums: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

fn op_index(kind: OpKind) -> usize {
    OpKind::all().iter().position(|k| *k == kind).unwrap()
}

/// Thread-safe metrics collector. One instance lives inside
/// [`crate::server_context::ServerContext`] and is shared across every
/// collection and worker thread via `Arc`.
pub struct Metrics {
    op_count: AtomicU64,
    slow_op_count: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
    latency_sum_ms: AtomicU64,
    op_counters: OpCounters,
    sync_count: AtomicU64,
    sync_total_ms: AtomicU64,
    last_sync_ms: AtomicU64,
    slow_ops: Mutex<VecDeque<SlowOp>>,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            op_count: AtomicU64::new(0),
            slow_op_count: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            latency_sum_ms: AtomicU64::new(0),
            op_counters: OpCounters::default(),
            sync_count: AtomicU64::new(0),
            sync_total_ms: AtomicU64::new(0),
            last_sync_ms: AtomicU64::new(0),
            slow_ops: Mutex::new(VecDeque::with_capacity(MAX_SLOW_OPS)),
            started_at: Instant::now(),
        }
    }

    /// Record a completed insert/update/remove/read/commit.
    pub fn record_op(&self, kind: OpKind, duration_ms: u64) {
        self.op_count.fetch_add(1, Ordering::Relaxed);
        let idx = op_index(kind);
        self.op_counters.counts[idx].fetch_add(1, Ordering::Relaxed);
        self.op_counters.latency_sums[idx].fetch_add(duration_ms, Ordering::Relaxed);

        {
            let mut latencies = self.latencies_ms.lock().unwrap();
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                if let Some(old) = latencies.pop_front() {
                    self.latency_sum_ms.fetch_sub(old, Ordering::Relaxed);
                }
            }
            latencies.push_back(duration_ms);
            self.latency_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        }

        if duration_ms >= SLOW_OP_THRESHOLD_MS {
            self.slow_op_count.fetch_add(1, Ordering::Relaxed);
            let mut slow = self.slow_ops.lock().unwrap();
            if slow.len() >= MAX_SLOW_OPS {
                slow.pop_front();
            }
            slow.push_back(SlowOp {
                operation: kind.label().to_string(),
                duration_ms,
                timestamp_ms: self.started_at.elapsed().as_millis() as u64,
            });
        }
    }

    /// Record one group-commit fsync performed by the WAL sync thread.
    pub fn record_sync(&self, duration_ms: u64) {
        self.sync_count.fetch_add(1, Ordering::Relaxed);
        self.sync_total_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.last_sync_ms.store(duration_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let op_count = self.op_count.load(Ordering::Relaxed);
        let slow_op_count = self.slow_op_count.load(Ordering::Relaxed);

        let (p50, p95, p99, avg) = {
            let latencies = self.latencies_ms.lock().unwrap();
            if latencies.is_empty() {
                (0, 0, 0, 0)
            } else {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();
                let len = sorted.len();
                let p50 = sorted[len * 50 / 100];
                let p95 = sorted[len * 95 / 100];
                let p99 = sorted.get(len * 99 / 100).copied().unwrap_or(sorted[len - 1]);
                let avg = self.latency_sum_ms.load(Ordering::Relaxed) / len as u64;
                (p50, p95, p99, avg)
            }
        };

        let sync_count = self.sync_count.load(Ordering::Relaxed);
        let sync_avg = if sync_count > 0 {
            self.sync_total_ms.load(Ordering::Relaxed) / sync_count
        } else {
            0
        };

        let top_slow = self.slow_ops.lock().unwrap().iter().cloned().collect();

        let mut op_stats: Vec<OperationStat> = OpKind::all()
            .iter()
            .map(|k| {
                let idx = op_index(*k);
                let count = self.op_counters.counts[idx].load(Ordering::Relaxed);
                let sum = self.op_counters.latency_sums[idx].load(Ordering::Relaxed);
                OperationStat {
                    operation: k.label().to_string(),
                    count,
                    avg_ms: if count > 0 { sum / count } else { 0 },
                }
            })
            .filter(|s| s.count > 0)
            .collect();
        op_stats.sort_by(|a, b| b.count.cmp(&a.count));

        MetricsSnapshot {
            op_count,
            slow_op_count,
            op_p50_ms: p50,
            op_p95_ms: p95,
            op_p99_ms: p99,
            op_avg_ms: avg,
            sync_count,
            sync_avg_ms: sync_avg,
            last_sync_ms: self.last_sync_ms.load(Ordering::Relaxed),
            top_slow_ops: top_slow,
            uptime_secs: self.started_at.elapsed().as_secs(),
            op_stats,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
