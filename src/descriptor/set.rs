//! One allocator per heap kind, sharing a clock and heap provider

use super::allocation::DescriptorAllocation;
use super::allocator::{AllocatorStats, DescriptorAllocator};
use super::handle::DescriptorHeapKind;
use super::heap::{DescriptorHeapProvider, SyntheticHeapProvider};
use crate::config::DescriptorConfig;
use crate::error::Result;
use crate::frame::{FrameClock, FrameMarker};
use std::sync::Arc;
use tracing::debug;

/// The descriptor allocators a device owns, one per heap kind
#[derive(Debug)]
pub struct DescriptorAllocators {
    allocators: [DescriptorAllocator; 4],
    clock: Arc<FrameClock>,
}

impl DescriptorAllocators {
    /// Allocators over synthetic heaps, honoring per-kind stride overrides
    pub fn new(config: &DescriptorConfig) -> Result<Self> {
        let mut provider = SyntheticHeapProvider::new();
        for kind in DescriptorHeapKind::ALL {
            if let Some(stride) = config.get(kind).stride {
                provider = provider.with_stride(kind, stride);
            }
        }
        Self::with_provider(config, Arc::new(provider), Arc::new(FrameClock::new()))
    }

    pub fn with_provider(
        config: &DescriptorConfig,
        provider: Arc<dyn DescriptorHeapProvider>,
        clock: Arc<FrameClock>,
    ) -> Result<Self> {
        config.validate()?;
        let build = |kind: DescriptorHeapKind| {
            DescriptorAllocator::with_parts(
                kind,
                config.get(kind),
                Arc::clone(&provider),
                Arc::clone(&clock),
            )
        };

        Ok(Self {
            allocators: [
                build(DescriptorHeapKind::CbvSrvUav)?,
                build(DescriptorHeapKind::Sampler)?,
                build(DescriptorHeapKind::Rtv)?,
                build(DescriptorHeapKind::Dsv)?,
            ],
            clock,
        })
    }

    pub fn get(&self, kind: DescriptorHeapKind) -> &DescriptorAllocator {
        let index = match kind {
            DescriptorHeapKind::CbvSrvUav => 0,
            DescriptorHeapKind::Sampler => 1,
            DescriptorHeapKind::Rtv => 2,
            DescriptorHeapKind::Dsv => 3,
        };
        &self.allocators[index]
    }

    pub fn allocate(&self, kind: DescriptorHeapKind, count: u32) -> Result<DescriptorAllocation> {
        self.get(kind).allocate(count)
    }

    pub fn clock(&self) -> &Arc<FrameClock> {
        &self.clock
    }

    /// Reclaim stale descriptors of every kind up to `retired`
    pub fn release_stale(&self, retired: FrameMarker) -> u32 {
        self.allocators
            .iter()
            .map(|allocator| allocator.release_stale(retired))
            .sum()
    }

    /// Mark `frame` as complete on the clock and reclaim everything it freed
    ///
    /// A marker older than the newest retired one reclaims up to the newest.
    pub fn retire_frame(&self, frame: FrameMarker) -> u32 {
        let retired = self.clock.retire(frame);
        let reclaimed = self.release_stale(retired);
        debug!(%retired, reclaimed, "Retired frame");
        reclaimed
    }

    pub fn stats(&self) -> Vec<AllocatorStats> {
        self.allocators.iter().map(|a| a.stats()).collect()
    }
}
