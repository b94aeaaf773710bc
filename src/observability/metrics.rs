//! # Metrics Collection
//!
//! Prometheus metrics for client caching, issuance and lease callbacks.
//! Without an installed exporter the `metrics` macros are no-ops.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Metrics recorder that tracks backend metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record a client cache lookup (`hit` or `miss`)
    pub fn record_client_cache(&self, outcome: &str) {
        let labels = [("outcome", outcome.to_string())];
        counter!("vsphere_client_cache_lookups_total", &labels).increment(1);
    }

    /// Record a session provider construction attempt
    pub fn record_client_construction(&self, success: bool) {
        let labels = [("status", status(success).to_string())];
        counter!("vsphere_client_constructions_total", &labels).increment(1);
    }

    /// Record a credential issuance
    pub fn record_issuance(&self, secret_type: &str, success: bool) {
        let labels =
            [("secret_type", secret_type.to_string()), ("status", status(success).to_string())];
        counter!("vsphere_issuances_total", &labels).increment(1);
    }

    /// Record a renewal; `renewed` is false when the role was gone
    pub fn record_renewal(&self, renewed: bool) {
        let outcome = if renewed { "renewed" } else { "denied" };
        let labels = [("outcome", outcome.to_string())];
        counter!("vsphere_renewals_total", &labels).increment(1);
    }

    /// Record a revocation and its non-fatal warnings
    pub fn record_revocation(&self, secret_type: &str, success: bool, warnings: usize) {
        let labels =
            [("secret_type", secret_type.to_string()), ("status", status(success).to_string())];
        counter!("vsphere_revocations_total", &labels).increment(1);

        if warnings > 0 {
            let labels = [("secret_type", secret_type.to_string())];
            counter!("vsphere_revocation_warnings_total", &labels).increment(warnings as u64);
        }
    }

    /// Record a configuration or role write
    pub fn record_config_update(&self, resource_type: &str, operation: &str) {
        let labels =
            [("resource_type", resource_type.to_string()), ("operation", operation.to_string())];
        counter!("vsphere_config_updates_total", &labels).increment(1);
    }

    fn describe(&self) {
        describe_counter!("vsphere_client_cache_lookups_total", "Client cache lookups by outcome");
        describe_counter!(
            "vsphere_client_constructions_total",
            "Session provider constructions by status"
        );
        describe_counter!("vsphere_issuances_total", "Credentials issued by secret type and status");
        describe_counter!("vsphere_renewals_total", "Lease renewals by outcome");
        describe_counter!("vsphere_revocations_total", "Lease revocations by secret type and status");
        describe_counter!(
            "vsphere_revocation_warnings_total",
            "Non-fatal cleanup failures during revocation"
        );
        describe_counter!("vsphere_config_updates_total", "Configuration and role writes");
    }
}

fn status(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Install the Prometheus exporter when a metrics port is configured
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no metrics port configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    MetricsRecorder::new().describe();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}
