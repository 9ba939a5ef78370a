//! Prometheus metrics HTTP endpoint
//!
//! Exposes tracker metrics in Prometheus text format at /metrics and a
//! liveness probe at /health. Uses hyper for the HTTP server.

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use anyhow::Context;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info};

/// Text exposition writer; every sample carries the `site` label.
struct Exposition<'a> {
    out: String,
    site: &'a str,
}

impl<'a> Exposition<'a> {
    fn new(site: &'a str) -> Self {
        Self { out: String::with_capacity(4096), site }
    }

    fn header(&mut self, name: &str, help: &str, kind: &str) {
        let _ = writeln!(self.out, "# HELP {name} {help}");
        let _ = writeln!(self.out, "# TYPE {name} {kind}");
    }

    fn counter(&mut self, name: &str, help: &str, value: u64) {
        self.header(name, help, "counter");
        let _ = writeln!(self.out, "{name}{{site=\"{}\"}} {value}", self.site);
    }

    fn gauge(&mut self, name: &str, help: &str, value: impl std::fmt::Display) {
        self.header(name, help, "gauge");
        let _ = writeln!(self.out, "{name}{{site=\"{}\"}} {value}", self.site);
    }

    /// One counter family split by a single extra label.
    fn labeled_counter(&mut self, name: &str, help: &str, label: &str, samples: &[(&str, u64)]) {
        self.header(name, help, "counter");
        for (value_label, value) in samples {
            let _ = writeln!(
                self.out,
                "{name}{{site=\"{}\",{label}=\"{value_label}\"}} {value}",
                self.site
            );
        }
    }

    /// Cumulative buckets from the per-bucket counts
    fn histogram(
        &mut self,
        name: &str,
        help: &str,
        buckets: &[u64; METRICS_NUM_BUCKETS],
        sum: u64,
    ) {
        self.header(name, help, "histogram");
        let site = self.site;
        let bounds = METRICS_BUCKET_BOUNDS
            .iter()
            .map(|b| b.to_string())
            .chain(std::iter::once("+Inf".to_string()));
        let mut cumulative = 0u64;
        for (bound, count) in bounds.zip(buckets.iter()) {
            cumulative += count;
            let _ = writeln!(
                self.out,
                "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}"
            );
        }
        let _ = writeln!(self.out, "{name}_sum{{site=\"{site}\"}} {sum}");
        let _ = writeln!(self.out, "{name}_count{{site=\"{site}\"}} {cumulative}");
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Format metrics in Prometheus text exposition format
///
/// Uses the non-resetting snapshot: scrapes leave the periodic window of the
/// log and egress reporters untouched, and the histogram stays monotonic.
pub fn format_prometheus_metrics(metrics: &Metrics, site_id: &str) -> String {
    let summary = metrics.snapshot();
    let mut exp = Exposition::new(site_id);

    write_inputs(&mut exp, &summary);
    write_detection(&mut exp, &summary);
    write_delivery(&mut exp, &summary);

    exp.finish()
}

fn write_inputs(exp: &mut Exposition<'_>, s: &MetricsSummary) {
    exp.counter("geofence_inputs_total", "Total inputs processed", s.inputs_total);
    exp.gauge(
        "geofence_inputs_per_sec",
        "Inputs processed per second",
        format!("{:.2}", s.inputs_per_sec),
    );
    exp.histogram(
        "geofence_input_latency_us",
        "Input processing latency in microseconds",
        &s.lat_buckets,
        s.lat_sum_us,
    );
    exp.gauge("geofence_input_latency_p99_us", "99th percentile input latency", s.lat_p99_us);
    exp.counter(
        "geofence_inputs_dropped_total",
        "Inbound messages dropped because the input queue was full",
        s.inputs_dropped,
    );
    exp.counter(
        "geofence_inputs_malformed_total",
        "Inbound payloads that failed to parse",
        s.inputs_malformed,
    );
    exp.counter("geofence_location_updates_total", "Raw location updates", s.location_updates);
    exp.counter(
        "geofence_monitor_errors_total",
        "Errors signalled by the monitor",
        s.monitor_errors,
    );
}

fn write_detection(exp: &mut Exposition<'_>, s: &MetricsSummary) {
    exp.gauge("geofence_regions", "Regions currently monitored", s.regions_monitored);
    exp.counter("geofence_reports_total", "Membership reports observed", s.reports_total);
    exp.labeled_counter(
        "geofence_reports_suppressed_total",
        "Reports that produced no transition",
        "reason",
        &[
            ("unknown", s.reports_unknown),
            ("duplicate", s.reports_duplicate),
            ("filtered", s.reports_filtered),
            ("unregistered", s.reports_unregistered),
        ],
    );
    exp.labeled_counter(
        "geofence_transitions_total",
        "Transitions fired",
        "direction",
        &[("entry", s.entries_total), ("exit", s.exits_total)],
    );
}

fn write_delivery(exp: &mut Exposition<'_>, s: &MetricsSummary) {
    exp.counter(
        "geofence_callbacks_delivered_total",
        "Transition callback invocations",
        s.callbacks_delivered,
    );
    exp.counter(
        "geofence_notifications_sent_total",
        "Notifications accepted by the sink",
        s.notifications_sent,
    );
    exp.counter(
        "geofence_notifications_failed_total",
        "Notifications rejected by the sink",
        s.notifications_failed,
    );
    exp.counter(
        "geofence_egress_dropped_total",
        "Outbound messages refused by the egress queue",
        s.egress_dropped,
    );
}

/// Shared state behind every connection
struct Exporter {
    metrics: Arc<Metrics>,
    site_id: String,
}

impl Exporter {
    fn respond(&self, req: &Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
        let (status, content_type, body) = match (req.method(), req.uri().path()) {
            (&Method::GET, "/metrics") => (
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                Bytes::from(format_prometheus_metrics(&self.metrics, &self.site_id)),
            ),
            (&Method::GET, "/health") => (StatusCode::OK, "text/plain", Bytes::from_static(b"ok")),
            _ => (StatusCode::NOT_FOUND, "text/plain", Bytes::from_static(b"Not Found")),
        };

        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static(content_type),
        );
        response
    }

    fn serve(self: &Arc<Self>, stream: TcpStream) {
        let exporter = Arc::clone(self);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let exporter = exporter.clone();
                async move { Ok::<_, Infallible>(exporter.respond(&req)) }
            });
            let served =
                http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            if let Err(e) = served {
                error!(error = %e, "prometheus_http_error");
            }
        });
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics port {port}"))?;
    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    let exporter = Arc::new(Exporter { metrics, site_id });
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => exporter.serve(stream),
                Err(e) => error!(error = %e, "prometheus_accept_error"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_input_processed(150);
        metrics.record_input_processed(250);
        metrics.record_entry();
        metrics.record_report_duplicate();
        metrics.set_regions_monitored(3);

        let output = format_prometheus_metrics(&metrics, "phone-1");

        assert!(output.contains("geofence_inputs_total{site=\"phone-1\"} 2"));
        assert!(output.contains("geofence_input_latency_us_bucket{site=\"phone-1\",le=\"+Inf\"} 2"));
        assert!(output.contains("geofence_input_latency_us_count{site=\"phone-1\"} 2"));
        assert!(output.contains("geofence_transitions_total{site=\"phone-1\",direction=\"entry\"} 1"));
        assert!(output.contains("geofence_reports_suppressed_total{site=\"phone-1\",reason=\"duplicate\"} 1"));
        assert!(output.contains("geofence_regions{site=\"phone-1\"} 3"));
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let mut buckets = [0u64; METRICS_NUM_BUCKETS];
        buckets[0] = 2;
        buckets[METRICS_NUM_BUCKETS - 1] = 1;
        let mut exp = Exposition::new("s");
        exp.histogram("h", "help", &buckets, 30);
        let out = exp.finish();

        let first = METRICS_BUCKET_BOUNDS[0];
        assert!(out.contains(&format!("h_bucket{{site=\"s\",le=\"{first}\"}} 2")));
        assert!(out.contains("h_bucket{site=\"s\",le=\"+Inf\"} 3"));
        assert!(out.contains("h_sum{site=\"s\"} 30"));
    }

    #[test]
    fn test_scrapes_are_monotonic_and_leave_report_window() {
        let metrics = Metrics::new();
        metrics.record_input_processed(150);

        let first = format_prometheus_metrics(&metrics, "s");
        metrics.record_input_processed(150);
        let second = format_prometheus_metrics(&metrics, "s");

        assert!(first.contains("geofence_input_latency_us_count{site=\"s\"} 1"));
        assert!(second.contains("geofence_input_latency_us_count{site=\"s\"} 2"));
        assert!(second.contains("geofence_input_latency_us_sum{site=\"s\"} 300"));
        assert_eq!(metrics.report().lat_count, 2);
    }
}
