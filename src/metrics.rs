//! In-process counters and Prometheus text exposition.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::audit::AuditOutcome;

/// Latency histogram upper bounds in milliseconds. Completion calls are
/// slow, so the buckets reach well past a second.
pub const LATENCY_BUCKETS_MS: [u64; 12] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000, 30000];

#[derive(Default)]
pub struct EndpointMetrics {
    pub requests_total: AtomicU64,
    pub success_total: AtomicU64,
    pub validation_errors_total: AtomicU64,
    pub upstream_errors_total: AtomicU64,
    pub persistence_errors_total: AtomicU64,
    pub audit_failures_total: AtomicU64,
    hist_counts: [AtomicU64; LATENCY_BUCKETS_MS.len()],
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
}

const COUNTER_FAMILIES: [(&str, &str); 6] = [
    ("promptrelay_requests_total", "Requests handled per endpoint"),
    ("promptrelay_success_total", "Requests answered with success=true"),
    ("promptrelay_validation_errors_total", "Requests rejected before the completion call"),
    ("promptrelay_upstream_errors_total", "Completion service failures"),
    ("promptrelay_persistence_errors_total", "Fatal store failures (save-chat)"),
    ("promptrelay_audit_failures_total", "Audit writes lost without failing the request"),
];

impl EndpointMetrics {
    /// Counters in `COUNTER_FAMILIES` order.
    fn counters(&self) -> [&AtomicU64; 6] {
        [
            &self.requests_total,
            &self.success_total,
            &self.validation_errors_total,
            &self.upstream_errors_total,
            &self.persistence_errors_total,
            &self.audit_failures_total,
        ]
    }

    fn observe_latency(&self, ms: u64) {
        self.hist_sum_ms.fetch_add(ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        if let Some(idx) = LATENCY_BUCKETS_MS.iter().position(|ub| ms <= *ub) {
            self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// What one request contributes to the counters.
pub struct Observation<'a> {
    pub latency_ms: u64,
    pub error_kind: Option<&'static str>,
    pub audit: Option<&'a AuditOutcome>,
}

pub struct Metrics {
    indices: HashMap<&'static str, usize>,
    names: Vec<&'static str>,
    endpoints: Vec<EndpointMetrics>,
    process_start_epoch: f64,
    process_start_instant: Instant,
}

/// Gauges owned by other components, sampled at render time.
pub struct ExternalGauges {
    pub audit_rows_written_total: u64,
    pub telemetry_lines_total: u64,
    pub telemetry_write_errors_total: u64,
    pub log_file_size_bytes: u64,
}

impl Metrics {
    pub fn new(names: &[&'static str]) -> Self {
        let start = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            indices: names.iter().enumerate().map(|(i, n)| (*n, i)).collect(),
            names: names.to_vec(),
            endpoints: names.iter().map(|_| EndpointMetrics::default()).collect(),
            process_start_epoch: start.as_secs_f64(),
            process_start_instant: Instant::now(),
        }
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointMetrics> {
        self.indices.get(name).and_then(|i| self.endpoints.get(*i))
    }

    pub fn observe(&self, name: &str, obs: &Observation<'_>) {
        let Some(m) = self.endpoint(name) else {
            tracing::debug!(endpoint = %name, "no metrics registered for endpoint");
            return;
        };
        m.requests_total.fetch_add(1, Ordering::Relaxed);
        m.observe_latency(obs.latency_ms);
        match obs.error_kind {
            None => {
                m.success_total.fetch_add(1, Ordering::Relaxed);
            }
            Some("upstream") => {
                m.upstream_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            Some("persistence") => {
                m.persistence_errors_total.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {
                m.validation_errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Some(AuditOutcome::Failed { .. }) = obs.audit {
            m.audit_failures_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn render(&self, gauges: &ExternalGauges) -> String {
        let mut buf = String::new();
        for (i, (family, help)) in COUNTER_FAMILIES.iter().enumerate() {
            writeln!(buf, "# HELP {} {}", family, help).ok();
            writeln!(buf, "# TYPE {} counter", family).ok();
            for (name, m) in self.names.iter().zip(&self.endpoints) {
                let value = m.counters()[i].load(Ordering::Relaxed);
                writeln!(buf, "{}{{endpoint=\"{}\"}} {}", family, name, value).ok();
            }
        }

        writeln!(buf, "# HELP promptrelay_request_latency_ms Request latency histogram milliseconds").ok();
        writeln!(buf, "# TYPE promptrelay_request_latency_ms histogram").ok();
        for (name, m) in self.names.iter().zip(&self.endpoints) {
            let mut cumulative: u64 = 0;
            for (i, ub) in LATENCY_BUCKETS_MS.iter().enumerate() {
                cumulative += m.hist_counts[i].load(Ordering::Relaxed);
                writeln!(
                    buf,
                    "promptrelay_request_latency_ms_bucket{{endpoint=\"{}\",le=\"{}\"}} {}",
                    name, ub, cumulative
                )
                .ok();
            }
            let count = m.hist_count.load(Ordering::Relaxed);
            writeln!(buf, "promptrelay_request_latency_ms_bucket{{endpoint=\"{}\",le=\"+Inf\"}} {}", name, count).ok();
            writeln!(buf, "promptrelay_request_latency_ms_sum{{endpoint=\"{}\"}} {}", name, m.hist_sum_ms.load(Ordering::Relaxed)).ok();
            writeln!(buf, "promptrelay_request_latency_ms_count{{endpoint=\"{}\"}} {}", name, count).ok();
        }

        let gauges_out = [
            ("promptrelay_audit_rows_written_total", "counter", "Audit rows accepted by the store", gauges.audit_rows_written_total as f64),
            ("promptrelay_telemetry_lines_total", "counter", "Telemetry JSON lines written", gauges.telemetry_lines_total as f64),
            ("promptrelay_telemetry_write_errors_total", "counter", "Telemetry JSON line write failures", gauges.telemetry_write_errors_total as f64),
            ("promptrelay_log_file_size_bytes", "gauge", "Current size of the telemetry log file (0 if disabled)", gauges.log_file_size_bytes as f64),
            ("promptrelay_process_start_time_seconds", "gauge", "Process start time (Unix epoch seconds)", self.process_start_epoch),
            ("promptrelay_process_uptime_seconds", "gauge", "Process uptime seconds", self.process_start_instant.elapsed().as_secs_f64()),
        ];
        for (family, kind, help, value) in gauges_out {
            writeln!(buf, "# HELP {} {}\n# TYPE {} {}", family, help, family, kind).ok();
            writeln!(buf, "{} {}", family, value).ok();
        }

        writeln!(buf, "# HELP promptrelay_build_info Build information\n# TYPE promptrelay_build_info gauge").ok();
        writeln!(buf, "promptrelay_build_info{{version=\"{}\"}} 1", env!("CARGO_PKG_VERSION")).ok();
        buf
    }
}
