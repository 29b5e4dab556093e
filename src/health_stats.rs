//! Health statistics for the exporter.
//!
//! Tracks poll cycle performance and the recoverable error paths so that the
//! `/health` endpoint can show what the poll loop has been doing.

use chrono::{DateTime, Utc};
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::Instant;

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
            self.last = value;
            self.sum = value;
            self.count = 1;
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Thread-safe wrapper for running statistics.
#[derive(Default)]
pub struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    pub fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (last, avg, max, min, count)
    pub fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

/// Outcome of the most recent poll cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastCycle {
    pub finished_at: DateTime<Utc>,
    pub success: bool,
}

/// Poll loop statistics shared with the HTTP handlers.
pub struct HealthStats {
    // Cycle performance
    pub cycle_duration_seconds: Stat,
    pub eligible_vms: Stat,
    pub sampled_vms: Stat,
    pub total_cycles: AtomicU64,
    pub cycle_success_count: AtomicU64,
    pub cycle_failure_count: AtomicU64,

    // Recoverable error paths
    pub vanished_vms: AtomicU64,
    pub rejected_annotations: AtomicU64,
    pub summary_failures: AtomicU64,
    pub sample_failures: AtomicU64,
    pub suppressed_samples: AtomicU64,
    pub unknown_counter_samples: AtomicU64,
    pub session_renewals: AtomicU64,

    // HTTP
    pub metrics_endpoint_calls: AtomicU64,

    // Timing
    pub start_time: Instant,
    pub last_cycle: StdRwLock<Option<LastCycle>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            cycle_duration_seconds: Stat::default(),
            eligible_vms: Stat::default(),
            sampled_vms: Stat::default(),
            total_cycles: AtomicU64::new(0),
            cycle_success_count: AtomicU64::new(0),
            cycle_failure_count: AtomicU64::new(0),
            vanished_vms: AtomicU64::new(0),
            rejected_annotations: AtomicU64::new(0),
            summary_failures: AtomicU64::new(0),
            sample_failures: AtomicU64::new(0),
            suppressed_samples: AtomicU64::new(0),
            unknown_counter_samples: AtomicU64::new(0),
            session_renewals: AtomicU64::new(0),
            metrics_endpoint_calls: AtomicU64::new(0),
            start_time: Instant::now(),
            last_cycle: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_cycle_success(&self, duration_seconds: f64, eligible: u64, sampled: u64) {
        self.cycle_duration_seconds.add_sample(duration_seconds);
        self.eligible_vms.add_sample(eligible as f64);
        self.sampled_vms.add_sample(sampled as f64);
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.cycle_success_count.fetch_add(1, Ordering::Relaxed);
        self.set_last_cycle(true);
    }

    pub fn record_cycle_failure(&self, duration_seconds: f64) {
        self.cycle_duration_seconds.add_sample(duration_seconds);
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.cycle_failure_count.fetch_add(1, Ordering::Relaxed);
        self.set_last_cycle(false);
    }

    fn set_last_cycle(&self, success: bool) {
        if let Ok(mut guard) = self.last_cycle.write() {
            *guard = Some(LastCycle {
                finished_at: Utc::now(),
                success,
            });
        }
    }

    pub fn record_vanished_vms(&self, count: u64) {
        self.vanished_vms.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_rejected_annotation(&self) {
        self.rejected_annotations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_summary_failures(&self, count: u64) {
        self.summary_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_sample_failure(&self) {
        self.sample_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_suppressed_samples(&self, count: u64) {
        self.suppressed_samples.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_unknown_counter_samples(&self, count: u64) {
        self.unknown_counter_samples
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_session_renewal(&self) {
        self.session_renewals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metrics_endpoint_call(&self) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_cycle(&self) -> Option<LastCycle> {
        self.last_cycle.read().ok().and_then(|g| *g)
    }

    pub fn get_cycle_success_rate(&self) -> f64 {
        let success = self.cycle_success_count.load(Ordering::Relaxed);
        let failure = self.cycle_failure_count.load(Ordering::Relaxed);
        let total = success + failure;
        if total == 0 {
            100.0
        } else {
            (success as f64 / total as f64) * 100.0
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - EXPORTER INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "POLL CYCLES").ok();
        writeln!(out, "-----------").ok();

        let stat_rows: [(&str, &Stat, usize); 3] = [
            ("cycle_duration (s)", &self.cycle_duration_seconds, 3),
            ("eligible_vms", &self.eligible_vms, 0),
            ("sampled_vms", &self.sampled_vms, 0),
        ];
        for (label, stat, precision) in stat_rows {
            let (cur, avg, max, min, _) = stat.snapshot();
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                label,
                format!("{:.prec$}", cur, prec = precision),
                format!("{:.prec$}", avg, prec = precision.max(1)),
                format!("{:.prec$}", max, prec = precision),
                format!("{:.prec$}", min, prec = precision),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "COUNTERS").ok();
        writeln!(out, "--------").ok();

        let counter_rows: [(&str, &AtomicU64); 10] = [
            ("total_cycles", &self.total_cycles),
            ("failed_cycles", &self.cycle_failure_count),
            ("vanished_vms", &self.vanished_vms),
            ("rejected_annotations", &self.rejected_annotations),
            ("summary_failures", &self.summary_failures),
            ("sample_failures", &self.sample_failures),
            ("suppressed_samples", &self.suppressed_samples),
            ("unknown_counter_samples", &self.unknown_counter_samples),
            ("session_renewals", &self.session_renewals),
            ("metrics_endpoint_calls", &self.metrics_endpoint_calls),
        ];
        for (label, value) in counter_rows {
            writeln!(
                out,
                "{:left$} | {:>col$}",
                label,
                value.load(Ordering::Relaxed),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(
            out,
            "{:left$} | {:>col$}",
            "uptime (s)",
            self.get_uptime_seconds(),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:>col$.1}",
            "cycle_success_rate (%)",
            self.get_cycle_success_rate(),
            left = left_col,
            col = col_w
        )
        .ok();

        let last = match self.last_cycle() {
            Some(c) => format!(
                "{} ({})",
                c.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
                if c.success { "ok" } else { "failed" }
            ),
            None => "N/A".to_string(),
        };
        writeln!(out).ok();
        writeln!(out, "last_cycle: {}", last).ok();

        out
    }
}
