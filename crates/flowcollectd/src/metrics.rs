//! Prometheus metrics for the collection pipeline
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-6: Audit Record Review - Metrics available for analysis
//! - SI-4: System Monitoring - Ingest and decode health

use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics shared by the ingestor and the decode loop
///
/// # NIST Controls
/// - SI-4: System Monitoring - Centralized metrics collection
#[derive(Clone)]
pub struct CollectorMetrics {
    // Counters
    pub datagrams_received_total: Counter,
    pub bytes_received_total: Counter,
    pub packets_decoded_total: Counter,
    pub unsupported_version_total: Counter,
    pub stale_dropped_total: Counter,
    pub decode_faults_total: Counter,
    pub template_misses_total: Counter,
    pub retry_passes_total: Counter,

    // Gauges
    pub retry_buffer_depth: Gauge,

    // Registry for export
    pub registry: Arc<Registry>,
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<Counter, prometheus::Error> {
    let counter = Counter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl CollectorMetrics {
    /// Create a metrics set with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let datagrams_received_total = register_counter(
            &registry,
            "flowcollectd_datagrams_received_total",
            "Total number of UDP datagrams received",
        )?;
        let bytes_received_total = register_counter(
            &registry,
            "flowcollectd_bytes_received_total",
            "Total number of payload bytes received",
        )?;
        let packets_decoded_total = register_counter(
            &registry,
            "flowcollectd_packets_decoded_total",
            "Total number of export packets decoded and delivered",
        )?;
        let unsupported_version_total = register_counter(
            &registry,
            "flowcollectd_unsupported_version_total",
            "Total number of packets discarded for an unsupported version",
        )?;
        let stale_dropped_total = register_counter(
            &registry,
            "flowcollectd_stale_dropped_total",
            "Total number of packets dropped after waiting too long for a template",
        )?;
        let decode_faults_total = register_counter(
            &registry,
            "flowcollectd_decode_faults_total",
            "Total number of malformed packets dropped",
        )?;
        let template_misses_total = register_counter(
            &registry,
            "flowcollectd_template_misses_total",
            "Total number of decode attempts that referenced an unknown template",
        )?;
        let retry_passes_total = register_counter(
            &registry,
            "flowcollectd_retry_passes_total",
            "Total number of retry buffer re-injections",
        )?;

        let retry_buffer_depth = Gauge::with_opts(Opts::new(
            "flowcollectd_retry_buffer_depth",
            "Current number of packets waiting for a template",
        ))?;
        registry.register(Box::new(retry_buffer_depth.clone()))?;

        Ok(Self {
            datagrams_received_total,
            bytes_received_total,
            packets_decoded_total,
            unsupported_version_total,
            stale_dropped_total,
            decode_faults_total,
            template_misses_total,
            retry_passes_total,
            retry_buffer_depth,
            registry: Arc::new(registry),
        })
    }

    /// Record one received datagram
    pub fn record_datagram(&self, bytes: usize) {
        self.datagrams_received_total.inc();
        self.bytes_received_total.inc_by(bytes as f64);
    }

    /// Update the retry buffer depth
    pub fn set_retry_buffer_depth(&self, depth: usize) {
        self.retry_buffer_depth.set(depth as f64);
    }

    /// Encode all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CollectorMetrics::new().unwrap();
        assert_eq!(metrics.datagrams_received_total.get(), 0.0);
        assert_eq!(metrics.retry_buffer_depth.get(), 0.0);
    }

    #[test]
    fn test_record_datagram() {
        let metrics = CollectorMetrics::new().unwrap();
        metrics.record_datagram(1464);
        metrics.record_datagram(36);
        assert_eq!(metrics.datagrams_received_total.get(), 2.0);
        assert_eq!(metrics.bytes_received_total.get(), 1500.0);
    }

    #[test]
    fn test_gather_text() {
        let metrics = CollectorMetrics::new().unwrap();
        metrics.set_retry_buffer_depth(3);
        let text = metrics.gather_text().unwrap();
        assert!(text.contains("flowcollectd_retry_buffer_depth 3"));
        assert!(text.contains("flowcollectd_packets_decoded_total 0"));
    }

    #[test]
    fn test_independent_registries() {
        let a = CollectorMetrics::new().unwrap();
        let b = CollectorMetrics::new().unwrap();
        a.packets_decoded_total.inc();
        assert_eq!(b.packets_decoded_total.get(), 0.0);
    }
}
