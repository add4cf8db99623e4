//! Prometheus metrics for the reconciliation pipeline

use crate::{CoreError, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Counters and timings for change signals, reconcile cycles and snapshot builds
#[derive(Clone)]
pub struct ReconcileMetrics {
    /// Completed reconcile cycles
    pub cycles_total: IntCounter,
    /// Signals absorbed into a wake-up that was already pending
    pub coalesced_signals_total: IntCounter,
    /// Signals dropped because the change queue was full
    pub dropped_signals_total: IntCounter,
    /// IngressRoutes left out of a snapshot, by reason
    pub skipped_resources_total: IntCounterVec,
    /// Snapshot build latency in seconds
    pub build_duration_seconds: Histogram,
    /// Virtual hosts in the last published snapshot
    pub published_virtual_hosts: IntGauge,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl ReconcileMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let cycles_total = IntCounter::new(
            "courier_reconcile_cycles_total",
            "Total reconcile cycles that published a snapshot",
        )?;
        let coalesced_signals_total = IntCounter::new(
            "courier_change_signals_coalesced_total",
            "Change signals merged into an already pending reconcile",
        )?;
        let dropped_signals_total = IntCounter::new(
            "courier_change_signals_dropped_total",
            "Change signals dropped because the queue was full",
        )?;
        let skipped_resources_total = IntCounterVec::new(
            Opts::new(
                "courier_skipped_resources_total",
                "IngressRoutes left out of a snapshot",
            ),
            &["reason"],
        )?;
        let build_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "courier_snapshot_build_duration_seconds",
            "Snapshot build latency in seconds",
        ))?;
        let published_virtual_hosts = IntGauge::new(
            "courier_published_virtual_hosts",
            "Virtual hosts in the last published snapshot",
        )?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(coalesced_signals_total.clone()))?;
        registry.register(Box::new(dropped_signals_total.clone()))?;
        registry.register(Box::new(skipped_resources_total.clone()))?;
        registry.register(Box::new(build_duration_seconds.clone()))?;
        registry.register(Box::new(published_virtual_hosts.clone()))?;

        Ok(Self {
            cycles_total,
            coalesced_signals_total,
            dropped_signals_total,
            skipped_resources_total,
            build_duration_seconds,
            published_virtual_hosts,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| CoreError::from(prometheus::Error::Msg(e.to_string())))
    }
}
