//! Prometheus gauges for portal counts and job outcomes

use crate::state::PortalMetricsSnapshot;
use errors::{PortalError, PortalResult};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

fn metric_error(e: prometheus::Error) -> PortalError {
    PortalError::Internal(format!("Prometheus: {}", e))
}

/// Gauges exported on `/metrics`
///
/// Uses its own registry so several services can live in one process (tests).
pub struct PortalGauges {
    registry: Registry,
    device_count: IntGauge,
    connected_device_count: IntGauge,
    edge_device_count: IntGauge,
    connected_edge_device_count: IntGauge,
    failed_deployment_count: IntGauge,
    concentrator_count: IntGauge,
    connected_concentrator_count: IntGauge,
    job_runs: IntCounterVec,
    job_duration: HistogramVec,
}

impl PortalGauges {
    pub fn new() -> PortalResult<Self> {
        let registry = Registry::new();

        let gauge = |name: &str, help: &str| -> PortalResult<IntGauge> {
            let gauge = IntGauge::new(name, help).map_err(metric_error)?;
            registry.register(Box::new(gauge.clone())).map_err(metric_error)?;
            Ok(gauge)
        };

        let device_count = gauge("iot_portal_device_count", "Devices in the portal")?;
        let connected_device_count = gauge("iot_portal_connected_device_count", "Connected devices")?;
        let edge_device_count = gauge("iot_portal_edge_device_count", "Edge devices in the portal")?;
        let connected_edge_device_count =
            gauge("iot_portal_connected_edge_device_count", "Connected edge devices")?;
        let failed_deployment_count =
            gauge("iot_portal_failed_deployment_count", "Failed edge module deployments")?;
        let concentrator_count = gauge("iot_portal_concentrator_count", "LoRa concentrators in the portal")?;
        let connected_concentrator_count =
            gauge("iot_portal_connected_concentrator_count", "Connected LoRa concentrators")?;

        let job_runs = IntCounterVec::new(
            Opts::new("iot_portal_job_runs_total", "Job runs by outcome"),
            &["job", "status"],
        )
        .map_err(metric_error)?;
        registry.register(Box::new(job_runs.clone())).map_err(metric_error)?;

        let job_duration = HistogramVec::new(
            HistogramOpts::new("iot_portal_job_duration_seconds", "Job run duration in seconds")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
            &["job"],
        )
        .map_err(metric_error)?;
        registry.register(Box::new(job_duration.clone())).map_err(metric_error)?;

        Ok(Self {
            registry,
            device_count,
            connected_device_count,
            edge_device_count,
            connected_edge_device_count,
            failed_deployment_count,
            concentrator_count,
            connected_concentrator_count,
            job_runs,
            job_duration,
        })
    }

    /// Publish every count of the snapshot
    pub fn publish(&self, snapshot: &PortalMetricsSnapshot) {
        self.publish_devices(snapshot);
        self.publish_edge_devices(snapshot);
        self.publish_concentrators(snapshot);
    }

    pub fn publish_devices(&self, snapshot: &PortalMetricsSnapshot) {
        self.device_count.set(snapshot.device_count);
        self.connected_device_count.set(snapshot.connected_device_count);
    }

    pub fn publish_edge_devices(&self, snapshot: &PortalMetricsSnapshot) {
        self.edge_device_count.set(snapshot.edge_device_count);
        self.connected_edge_device_count.set(snapshot.connected_edge_device_count);
        self.failed_deployment_count.set(snapshot.failed_deployment_count);
    }

    pub fn publish_concentrators(&self, snapshot: &PortalMetricsSnapshot) {
        self.concentrator_count.set(snapshot.concentrator_count);
        self.connected_concentrator_count.set(snapshot.connected_concentrator_count);
    }

    pub fn record_run(&self, job: &str, status: &str, seconds: f64) {
        self.job_runs.with_label_values(&[job, status]).inc();
        self.job_duration.with_label_values(&[job]).observe(seconds);
    }

    pub fn job_runs(&self, job: &str, status: &str) -> u64 {
        self.job_runs.with_label_values(&[job, status]).get()
    }

    /// Text exposition format
    pub fn encode(&self) -> PortalResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| PortalError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_encode() {
        let gauges = PortalGauges::new().unwrap();
        gauges.publish(&PortalMetricsSnapshot {
            device_count: 12,
            connected_device_count: 7,
            ..PortalMetricsSnapshot::default()
        });
        gauges.record_run("sync-devices", "success", 0.2);

        let text = gauges.encode().unwrap();
        assert!(text.contains("iot_portal_device_count 12"));
        assert!(text.contains("iot_portal_connected_device_count 7"));
        assert!(text.contains("iot_portal_concentrator_count 0"));
        assert!(text.contains(r#"iot_portal_job_runs_total{job="sync-devices",status="success"} 1"#));
        assert_eq!(gauges.job_runs("sync-devices", "success"), 1);
    }

    #[test]
    fn test_independent_registries() {
        let first = PortalGauges::new().unwrap();
        let second = PortalGauges::new().unwrap();
        first.publish(&PortalMetricsSnapshot {
            edge_device_count: 3,
            ..PortalMetricsSnapshot::default()
        });
        assert!(second.encode().unwrap().contains("iot_portal_edge_device_count 0"));
    }
}
