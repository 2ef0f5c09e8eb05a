use anyhow::{Context, Result};
use metrics::{Label, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

/// Prometheus exporter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: IpAddr,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9_000,
        }
    }
}

/// Installs the Prometheus exporter as the global `metrics` recorder when
/// enabled. Must run inside the tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    PrometheusBuilder::new()
        .with_http_listener((config.address, config.port))
        .install()
        .with_context(|| {
            format!("Cannot install Prometheus exporter on {}:{}", config.address, config.port)
        })
}

/// Fire-and-forget gauge recording. Implementations must never fail the
/// caller.
pub trait GaugeSink {
    fn record_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

/// Forwards gauges to whatever `metrics` recorder the binary installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsGauge;

impl GaugeSink for MetricsGauge {
    fn record_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let labels: Vec<Label> = labels
            .iter()
            .map(|(k, v)| Label::new(k.to_string(), v.to_string()))
            .collect();
        gauge!(name.to_string(), labels).set(value);
    }
}

impl<G: GaugeSink + ?Sized> GaugeSink for &G {
    fn record_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        (**self).record_gauge(name, labels, value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedGauge {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// Keeps every recorded gauge in memory.
#[derive(Debug, Default)]
pub struct RecordingGauge {
    recorded: Mutex<Vec<RecordedGauge>>,
}

impl RecordingGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<RecordedGauge> {
        self.recorded
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn values_of(&self, name: &str) -> Vec<f64> {
        self.recorded()
            .into_iter()
            .filter(|g| g.name == name)
            .map(|g| g.value)
            .collect()
    }
}

impl GaugeSink for RecordingGauge {
    fn record_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(RecordedGauge {
                name: name.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                value,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_gauge_without_recorder_is_a_no_op() {
        MetricsGauge.record_gauge("latest_block_processed", &[("network", "btc")], 10.0);
    }

    #[test]
    fn disabled_exporter_installs_nothing() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn recording_gauge_keeps_labels() {
        let sink = RecordingGauge::new();
        (&sink).record_gauge("scanner_failures", &[("network", "eth")], 3.0);
        assert_eq!(sink.values_of("scanner_failures"), vec![3.0]);
        assert_eq!(
            sink.recorded()[0].labels,
            vec![("network".to_string(), "eth".to_string())]
        );
    }
}
