//! Tracker metrics
//!
//! Counters are plain atomics with Relaxed ordering; they are statistics and
//! never drive tracker decisions. `report()` swaps the periodic parts
//! (rate window, latency histogram) to zero and reads the monotonic ones.
//! `snapshot()` resets nothing; it backs the Prometheus exporter, whose
//! histogram must stay cumulative.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Upper bounds (microseconds) of the finite latency buckets; one overflow bucket follows.
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = BUCKET_BOUNDS.len() + 1;

/// Periodic latency window: count, sum, max and exponential buckets
#[derive(Default)]
struct LatencyHistogram {
    count: AtomicU64,
    sum_us: AtomicU64,
    max_us: AtomicU64,
    buckets: [AtomicU64; NUM_BUCKETS],
}

/// Values taken out of a `LatencyHistogram` at report time
struct LatencyWindow {
    count: u64,
    sum_us: u64,
    max_us: u64,
    buckets: [u64; NUM_BUCKETS],
}

impl LatencyHistogram {
    fn record(&self, latency_us: u64) {
        let bucket = BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.max_us.fetch_max(latency_us, Ordering::Relaxed);
    }

    fn peek(&self) -> LatencyWindow {
        LatencyWindow {
            count: self.count.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
            max_us: self.max_us.load(Ordering::Relaxed),
            buckets: std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed)),
        }
    }

    fn take(&self) -> LatencyWindow {
        LatencyWindow {
            count: self.count.swap(0, Ordering::Relaxed),
            sum_us: self.sum_us.swap(0, Ordering::Relaxed),
            max_us: self.max_us.swap(0, Ordering::Relaxed),
            buckets: std::array::from_fn(|i| self.buckets[i].swap(0, Ordering::Relaxed)),
        }
    }
}

impl LatencyWindow {
    fn avg_us(&self) -> u64 {
        self.sum_us.checked_div(self.count).unwrap_or(0)
    }

    /// Upper bound of the bucket holding the given quantile; the overflow
    /// bucket reports twice the last finite bound.
    fn quantile_us(&self, q: f64) -> u64 {
        let total: u64 = self.buckets.iter().sum();
        if total == 0 {
            return 0;
        }
        let target = (total as f64 * q) as u64;
        let overflow_bound = BUCKET_BOUNDS[BUCKET_BOUNDS.len() - 1] * 2;
        let mut cumulative = 0u64;
        for (i, &count) in self.buckets.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return BUCKET_BOUNDS.get(i).copied().unwrap_or(overflow_bound);
            }
        }
        overflow_bound
    }
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total inputs ever processed (monotonic)
    inputs_total: AtomicU64,
    /// Input processing latency (reset on report)
    latency: LatencyHistogram,
    /// Input processing latency since start (never reset)
    latency_lifetime: LatencyHistogram,
    /// State reports observed by the detector (monotonic)
    reports_total: AtomicU64,
    /// Reports carrying `unknown` (monotonic)
    reports_unknown: AtomicU64,
    /// Reports identical to the stored state (monotonic)
    reports_duplicate: AtomicU64,
    /// State changes dropped by the watch-set filter (monotonic)
    reports_filtered: AtomicU64,
    /// Reports for regions that are not monitored (monotonic)
    reports_unregistered: AtomicU64,
    /// Entry transitions fired (monotonic)
    entries_total: AtomicU64,
    /// Exit transitions fired (monotonic)
    exits_total: AtomicU64,
    /// Callback invocations (monotonic)
    callbacks_delivered: AtomicU64,
    /// Notifications accepted by the sink (monotonic)
    notifications_sent: AtomicU64,
    /// Notifications rejected by the sink (monotonic)
    notifications_failed: AtomicU64,
    /// Errors signalled by the monitoring service (monotonic)
    monitor_errors: AtomicU64,
    /// Location updates forwarded (monotonic)
    location_updates: AtomicU64,
    /// Inbound messages dropped because the input queue was full (monotonic)
    inputs_dropped: AtomicU64,
    /// Inbound payloads that failed to parse (monotonic)
    inputs_malformed: AtomicU64,
    /// Outbound messages refused by the egress queue (monotonic)
    egress_dropped: AtomicU64,
    /// Regions currently monitored (gauge)
    regions_monitored: AtomicU64,
    /// Last report time for rate calculation
    last_report_time: Mutex<Instant>,
    started: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inputs_total: AtomicU64::new(0),
            latency: LatencyHistogram::default(),
            latency_lifetime: LatencyHistogram::default(),
            reports_total: AtomicU64::new(0),
            reports_unknown: AtomicU64::new(0),
            reports_duplicate: AtomicU64::new(0),
            reports_filtered: AtomicU64::new(0),
            reports_unregistered: AtomicU64::new(0),
            entries_total: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            callbacks_delivered: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
            monitor_errors: AtomicU64::new(0),
            location_updates: AtomicU64::new(0),
            inputs_dropped: AtomicU64::new(0),
            inputs_malformed: AtomicU64::new(0),
            egress_dropped: AtomicU64::new(0),
            regions_monitored: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
            started: Instant::now(),
        }
    }

    /// Record an input processed with its latency (lock-free)
    #[inline]
    pub fn record_input_processed(&self, latency_us: u64) {
        self.inputs_total.fetch_add(1, Ordering::Relaxed);
        self.latency.record(latency_us);
        self.latency_lifetime.record(latency_us);
    }

    #[inline]
    pub fn record_report(&self) {
        self.reports_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_unknown(&self) {
        self.reports_unknown.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_duplicate(&self) {
        self.reports_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_filtered(&self) {
        self.reports_filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_report_unregistered(&self) {
        self.reports_unregistered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_entry(&self) {
        self.entries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit(&self) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_callbacks_delivered(&self, count: u64) {
        self.callbacks_delivered.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_failed(&self) {
        self.notifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_monitor_error(&self) {
        self.monitor_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_location_update(&self) {
        self.location_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound message dropped due to channel full (lock-free)
    #[inline]
    pub fn record_input_dropped(&self) {
        self.inputs_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_input_malformed(&self) {
        self.inputs_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_regions_monitored(&self, count: usize) {
        self.regions_monitored.store(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn inputs_total(&self) -> u64 {
        self.inputs_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn entries_total(&self) -> u64 {
        self.entries_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn notifications_failed(&self) -> u64 {
        self.notifications_failed.load(Ordering::Relaxed)
    }

    /// Snapshot every counter and start a new periodic window
    pub fn report(&self) -> MetricsSummary {
        let window = self.latency.take();
        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };
        self.summarize(window, elapsed)
    }

    /// Read every counter without resetting anything
    ///
    /// Latency figures cover the whole process lifetime and the rate is
    /// averaged since start.
    pub fn snapshot(&self) -> MetricsSummary {
        self.summarize(self.latency_lifetime.peek(), self.started.elapsed().as_secs_f64())
    }

    fn summarize(&self, window: LatencyWindow, elapsed_secs: f64) -> MetricsSummary {
        let inputs_per_sec =
            if elapsed_secs > 0.0 { window.count as f64 / elapsed_secs } else { 0.0 };
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSummary {
            inputs_total: load(&self.inputs_total),
            inputs_per_sec,
            avg_process_latency_us: window.avg_us(),
            max_process_latency_us: window.max_us,
            lat_p50_us: window.quantile_us(0.50),
            lat_p95_us: window.quantile_us(0.95),
            lat_p99_us: window.quantile_us(0.99),
            lat_sum_us: window.sum_us,
            lat_count: window.count,
            lat_buckets: window.buckets,
            reports_total: load(&self.reports_total),
            reports_unknown: load(&self.reports_unknown),
            reports_duplicate: load(&self.reports_duplicate),
            reports_filtered: load(&self.reports_filtered),
            reports_unregistered: load(&self.reports_unregistered),
            entries_total: load(&self.entries_total),
            exits_total: load(&self.exits_total),
            callbacks_delivered: load(&self.callbacks_delivered),
            notifications_sent: load(&self.notifications_sent),
            notifications_failed: load(&self.notifications_failed),
            monitor_errors: load(&self.monitor_errors),
            location_updates: load(&self.location_updates),
            inputs_dropped: load(&self.inputs_dropped),
            inputs_malformed: load(&self.inputs_malformed),
            egress_dropped: load(&self.egress_dropped),
            regions_monitored: load(&self.regions_monitored),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;
pub const METRICS_BUCKET_BOUNDS: [u64; NUM_BUCKETS - 1] = BUCKET_BOUNDS;

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub inputs_total: u64,
    pub inputs_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Per-bucket (not cumulative) counts over `METRICS_BUCKET_BOUNDS` plus overflow
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_sum_us: u64,
    pub lat_count: u64,
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub reports_total: u64,
    pub reports_unknown: u64,
    pub reports_duplicate: u64,
    pub reports_filtered: u64,
    pub reports_unregistered: u64,
    pub entries_total: u64,
    pub exits_total: u64,
    pub callbacks_delivered: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub monitor_errors: u64,
    pub location_updates: u64,
    pub inputs_dropped: u64,
    pub inputs_malformed: u64,
    pub egress_dropped: u64,
    pub regions_monitored: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            inputs_total = %self.inputs_total,
            inputs_per_sec = format!("{:.1}", self.inputs_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            p99_us = %self.lat_p99_us,
            regions = %self.regions_monitored,
            reports = %self.reports_total,
            duplicates = %self.reports_duplicate,
            entries = %self.entries_total,
            exits = %self.exits_total,
            notifications_failed = %self.notifications_failed,
            dropped = %self.inputs_dropped,
            egress_dropped = %self.egress_dropped,
            "metrics"
        );
    }
}
