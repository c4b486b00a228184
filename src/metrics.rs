//! Prometheus metrics for descriptor allocators
//!
//! Gauges are refreshed by the allocator after every successful allocation
//! and every reclamation pass; counters accumulate per heap kind.

use crate::descriptor::{AllocatorStats, DescriptorHeapKind};
use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::info;

lazy_static::lazy_static! {
    /// Registry holding every descriptor metric
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    pub static ref DESCRIPTOR_PAGES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("photon_descriptor_pages", "Number of descriptor pages"),
        &["kind"]
    ).unwrap();

    pub static ref DESCRIPTORS_FREE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("photon_descriptors_free", "Descriptors available for allocation"),
        &["kind"]
    ).unwrap();

    pub static ref DESCRIPTORS_STALE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("photon_descriptors_stale", "Freed descriptors waiting for their frame to retire"),
        &["kind"]
    ).unwrap();

    pub static ref ALLOCATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("photon_descriptor_allocations_total", "Total allocation requests"),
        &["kind", "status"]
    ).unwrap();

    pub static ref RECLAIMED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("photon_descriptor_reclaimed_total", "Total descriptors returned to free lists"),
        &["kind"]
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all descriptor metrics with the registry
pub fn init_metrics() {
    INIT.call_once(|| {
        info!("Initializing descriptor metrics");

        METRICS_REGISTRY.register(Box::new(DESCRIPTOR_PAGES.clone())).ok();
        METRICS_REGISTRY.register(Box::new(DESCRIPTORS_FREE.clone())).ok();
        METRICS_REGISTRY.register(Box::new(DESCRIPTORS_STALE.clone())).ok();
        METRICS_REGISTRY.register(Box::new(ALLOCATIONS_TOTAL.clone())).ok();
        METRICS_REGISTRY.register(Box::new(RECLAIMED_TOTAL.clone())).ok();
    });
}

/// Count one allocation request; `status` is "success" or "error"
pub fn record_allocation(kind: DescriptorHeapKind, success: bool) {
    let status = if success { "success" } else { "error" };
    ALLOCATIONS_TOTAL
        .with_label_values(&[kind.as_str(), status])
        .inc();
}

pub fn record_reclaimed(kind: DescriptorHeapKind, count: u32) {
    if count > 0 {
        RECLAIMED_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc_by(count as u64);
    }
}

/// Refresh the gauges for one allocator
pub fn update_allocator_gauges(stats: &AllocatorStats) {
    let kind = stats.kind.as_str();
    DESCRIPTOR_PAGES
        .with_label_values(&[kind])
        .set(stats.page_count as i64);
    DESCRIPTORS_FREE
        .with_label_values(&[kind])
        .set(stats.free_descriptors as i64);
    DESCRIPTORS_STALE
        .with_label_values(&[kind])
        .set(stats.stale_descriptors as i64);
}

/// Render every registered metric in the Prometheus text format
pub fn export_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
}
