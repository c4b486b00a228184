//! Pool allocator for one descriptor kind

use super::allocation::DescriptorAllocation;
use super::handle::DescriptorHeapKind;
use super::heap::{DescriptorHeapProvider, SyntheticHeapProvider};
use super::page::{DescriptorPage, PageStats};
use crate::config::AllocatorConfig;
use crate::error::{Error, Result};
use crate::frame::{FrameClock, FrameMarker};
use crate::metrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Default)]
struct PoolState {
    pages: Vec<Arc<DescriptorPage>>,
    /// Indices of pages with at least one free descriptor
    available: BTreeSet<usize>,
}

/// Descriptor allocator backed by a growing set of pages
///
/// Requests are served from the first page that has a large enough free
/// block. When none does, a new page of `max(descriptors_per_page, count)`
/// descriptors is created. Pages are never destroyed while the allocator
/// lives.
pub struct DescriptorAllocator {
    kind: DescriptorHeapKind,
    descriptors_per_page: u32,
    max_descriptors_per_page: u32,
    provider: Arc<dyn DescriptorHeapProvider>,
    clock: Arc<FrameClock>,
    state: Mutex<PoolState>,
}

impl DescriptorAllocator {
    /// Create an allocator over synthetic heaps with its own frame clock
    pub fn new(kind: DescriptorHeapKind, descriptors_per_page: u32) -> Result<Self> {
        Self::from_config(kind, &AllocatorConfig::with_page_size(descriptors_per_page))
    }

    /// Create an allocator over synthetic heaps, applying the configured stride
    pub fn from_config(kind: DescriptorHeapKind, config: &AllocatorConfig) -> Result<Self> {
        let mut provider = SyntheticHeapProvider::new();
        if let Some(stride) = config.stride {
            provider = provider.with_stride(kind, stride);
        }
        Self::with_parts(kind, config, Arc::new(provider), Arc::new(FrameClock::new()))
    }

    /// Create an allocator from explicit configuration, heap provider and clock
    ///
    /// `config.stride` is not consulted: the provider decides the stride of
    /// every heap it creates.
    pub fn with_parts(
        kind: DescriptorHeapKind,
        config: &AllocatorConfig,
        provider: Arc<dyn DescriptorHeapProvider>,
        clock: Arc<FrameClock>,
    ) -> Result<Self> {
        config.validate(kind)?;
        metrics::init_metrics();

        let max_descriptors_per_page = config.max_for(kind);
        info!(
            %kind,
            descriptors_per_page = config.descriptors_per_page,
            max_descriptors_per_page,
            "Initializing descriptor allocator"
        );

        Ok(Self {
            kind,
            descriptors_per_page: config.descriptors_per_page,
            max_descriptors_per_page,
            provider,
            clock,
            state: Mutex::new(PoolState::default()),
        })
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn descriptors_per_page(&self) -> u32 {
        self.descriptors_per_page
    }

    pub fn max_descriptors_per_page(&self) -> u32 {
        self.max_descriptors_per_page
    }

    /// Frame clock stamped onto allocations dropped without an explicit frame
    pub fn clock(&self) -> &Arc<FrameClock> {
        &self.clock
    }

    pub fn page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Allocate `count` contiguous descriptors
    ///
    /// Fails only for zero-sized requests, requests above the page limit,
    /// or when the heap provider cannot create a new page.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn allocate(&self, count: u32) -> Result<DescriptorAllocation> {
        if count == 0 {
            metrics::record_allocation(self.kind, false);
            warn!("Rejected empty descriptor allocation");
            return Err(Error::InvalidArgument(
                "descriptor count must be at least 1".to_string(),
            ));
        }
        if count > self.max_descriptors_per_page {
            metrics::record_allocation(self.kind, false);
            warn!(
                max = self.max_descriptors_per_page,
                "Rejected oversized descriptor allocation"
            );
            return Err(Error::RequestTooLarge {
                requested: count,
                max: self.max_descriptors_per_page,
            });
        }

        let mut state = self.state.lock();

        let mut found = None;
        for &index in state.available.iter() {
            let page = &state.pages[index];
            if !page.has_space(count) {
                continue;
            }
            let allocation = page.allocate(count);
            if !allocation.is_null() {
                found = Some((index, allocation));
                break;
            }
        }

        let (index, allocation) = match found {
            Some(hit) => hit,
            None => {
                let page = self.create_page(count)?;
                let index = state.pages.len();
                state.pages.push(Arc::clone(&page));
                state.available.insert(index);
                (index, page.allocate(count))
            }
        };

        if state.pages[index].num_free() == 0 {
            state.available.remove(&index);
        }
        drop(state);

        metrics::record_allocation(self.kind, true);
        metrics::update_allocator_gauges(&self.stats());
        debug!(page = index, base = %allocation.base(), "Allocated descriptors");
        Ok(allocation)
    }

    fn create_page(&self, count: u32) -> Result<Arc<DescriptorPage>> {
        let capacity = self.descriptors_per_page.max(count);
        let heap = self.provider.create_heap(self.kind, capacity).map_err(|e| {
            metrics::record_allocation(self.kind, false);
            e
        })?;
        if heap.stride == 0 {
            metrics::record_allocation(self.kind, false);
            return Err(Error::Heap(format!(
                "provider returned a zero-stride {} heap",
                self.kind
            )));
        }
        info!(kind = %self.kind, capacity, "Creating descriptor page");
        Ok(Arc::new(DescriptorPage::new(
            self.kind,
            capacity,
            heap,
            Arc::clone(&self.clock),
        )))
    }

    /// Return every stale range stamped at or before `retired` to its page
    ///
    /// Pages that regain free descriptors become eligible for allocation
    /// again. Returns the number of descriptors reclaimed.
    #[instrument(skip(self), fields(kind = %self.kind))]
    pub fn release_stale(&self, retired: FrameMarker) -> u32 {
        let mut state = self.state.lock();
        let PoolState { pages, available } = &mut *state;

        let mut reclaimed = 0;
        for (index, page) in pages.iter().enumerate() {
            reclaimed += page.release_stale(retired);
            if page.num_free() > 0 {
                available.insert(index);
            }
        }
        drop(state);

        metrics::record_reclaimed(self.kind, reclaimed);
        metrics::update_allocator_gauges(&self.stats());
        reclaimed
    }

    /// Snapshot of every page
    pub fn stats(&self) -> AllocatorStats {
        let state = self.state.lock();
        let pages: Vec<PageStats> = state.pages.iter().map(|p| p.stats()).collect();

        AllocatorStats {
            kind: self.kind,
            page_count: pages.len(),
            total_descriptors: pages.iter().map(|p| p.capacity as u64).sum(),
            free_descriptors: pages.iter().map(|p| p.free as u64).sum(),
            stale_descriptors: pages.iter().map(|p| p.stale_descriptors as u64).sum(),
            available_pages: state.available.len(),
            pages,
        }
    }

    /// Check every page and the availability index
    pub fn verify(&self) -> Result<()> {
        let state = self.state.lock();
        for (index, page) in state.pages.iter().enumerate() {
            page.verify()
                .map_err(|e| Error::Corrupted(format!("page {}: {}", index, e)))?;
            if state.available.contains(&index) && page.num_free() == 0 {
                return Err(Error::Corrupted(format!(
                    "exhausted page {} listed as available",
                    index
                )));
            }
        }
        if let Some(&index) = state.available.iter().find(|&&i| i >= state.pages.len()) {
            return Err(Error::Corrupted(format!(
                "available index {} has no page",
                index
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    fn available(&self) -> Vec<usize> {
        self.state.lock().available.iter().copied().collect()
    }
}

impl std::fmt::Debug for DescriptorAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorAllocator")
            .field("kind", &self.kind)
            .field("descriptors_per_page", &self.descriptors_per_page)
            .field("max_descriptors_per_page", &self.max_descriptors_per_page)
            .field("pages", &self.page_count())
            .finish()
    }
}

/// Statistics for one allocator
#[derive(Debug, Clone, Serialize)]
pub struct AllocatorStats {
    pub kind: DescriptorHeapKind,
    pub page_count: usize,
    pub available_pages: usize,
    pub total_descriptors: u64,
    pub free_descriptors: u64,
    pub stale_descriptors: u64,
    pub pages: Vec<PageStats>,
}

impl AllocatorStats {
    /// Descriptors currently owned by live allocations
    pub fn allocated_descriptors(&self) -> u64 {
        self.total_descriptors - self.free_descriptors - self.stale_descriptors
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize stats: {}", e)))
    }
}
