//! Descriptor page: one fixed-capacity heap of slots
//!
//! # Block lifecycle
//!
//! ```text
//!            allocate(n)                free(frame)
//!   Free ───────────────▶ Allocated ───────────────▶ Stale
//!    ▲                                                 │
//!    └──────────── release_stale(retired ≥ frame) ─────┘
//! ```
//!
//! Freed ranges wait in a FIFO stale queue stamped with the frame that last
//! used them. They only rejoin the free list, merged with their free
//! neighbors, once the caller reports that frame as retired.

use super::allocation::DescriptorAllocation;
use super::free_list::FreeList;
use super::handle::{CpuDescriptorHandle, DescriptorHeapKind};
use super::heap::NativeHeap;
use crate::error::{Error, Result};
use crate::frame::{FrameClock, FrameMarker};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// A freed range waiting for its frame to retire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StaleBlock {
    offset: u32,
    size: u32,
    frame: FrameMarker,
}

#[derive(Debug)]
struct PageState {
    free_list: FreeList,
    stale: VecDeque<StaleBlock>,
    free_count: u32,
    stale_count: u32,
    allocated_count: u32,
}

/// Fixed-capacity descriptor heap with coalescing free list
pub struct DescriptorPage {
    kind: DescriptorHeapKind,
    capacity: u32,
    base: CpuDescriptorHandle,
    stride: u32,
    clock: Arc<FrameClock>,
    state: Mutex<PageState>,
}

impl DescriptorPage {
    /// Create a page over `heap` with every slot free
    pub fn new(
        kind: DescriptorHeapKind,
        capacity: u32,
        heap: NativeHeap,
        clock: Arc<FrameClock>,
    ) -> Self {
        debug!(%kind, capacity, base = %heap.base, "Created descriptor page");
        Self {
            kind,
            capacity,
            base: heap.base,
            stride: heap.stride,
            clock,
            state: Mutex::new(PageState {
                free_list: FreeList::with_capacity(capacity),
                stale: VecDeque::new(),
                free_count: capacity,
                stale_count: 0,
                allocated_count: 0,
            }),
        }
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn base(&self) -> CpuDescriptorHandle {
        self.base
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub(crate) fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Whether a single free block can hold `count` descriptors
    pub fn has_space(&self, count: u32) -> bool {
        self.state.lock().free_list.has_space(count)
    }

    /// Free descriptors, excluding stale ones
    pub fn num_free(&self) -> u32 {
        self.state.lock().free_count
    }

    /// Descriptors waiting in the stale queue
    pub fn stale_count(&self) -> u32 {
        self.state.lock().stale_count
    }

    /// Slot index of `handle` within this page
    ///
    /// `None` when the handle lies outside the page or off a slot boundary.
    pub fn offset_of(&self, handle: CpuDescriptorHandle) -> Option<u32> {
        let bytes = handle.ptr.checked_sub(self.base.ptr)?;
        let stride = self.stride as usize;
        if stride == 0 || bytes % stride != 0 {
            return None;
        }
        let offset = u32::try_from(bytes / stride).ok()?;
        (offset < self.capacity).then_some(offset)
    }

    /// Allocate `count` contiguous descriptors
    ///
    /// Picks the smallest free block that fits. Returns a null allocation if
    /// no block is large enough, even when the page has enough free slots in
    /// total.
    pub fn allocate(self: &Arc<Self>, count: u32) -> DescriptorAllocation {
        if count == 0 {
            return DescriptorAllocation::null();
        }

        let mut state = self.state.lock();
        let offset = match state.free_list.take(count) {
            Some(offset) => offset,
            None => return DescriptorAllocation::null(),
        };
        state.free_count -= count;
        state.allocated_count += count;
        drop(state);

        trace!(kind = %self.kind, offset, count, "Allocated descriptors");
        DescriptorAllocation::new(
            self.base.offset(offset, self.stride),
            count,
            self.stride,
            Arc::clone(self),
        )
    }

    /// Return an allocation at `frame`
    ///
    /// The range becomes reusable after `release_stale` is called with a
    /// marker at or past `frame`.
    pub fn free(&self, allocation: DescriptorAllocation, frame: FrameMarker) -> Result<()> {
        if let Some(owner) = allocation.page() {
            if !std::ptr::eq(Arc::as_ptr(owner), self) {
                return Err(Error::InvalidArgument(format!(
                    "allocation at {} does not belong to page at {}",
                    allocation.base(),
                    self.base
                )));
            }
        }
        allocation.release(frame);
        Ok(())
    }

    /// Queue a range as stale; the free list is not touched
    pub(crate) fn enqueue_stale(&self, base: CpuDescriptorHandle, count: u32, frame: FrameMarker) {
        let offset = match self.offset_of(base) {
            Some(offset) => offset,
            None => {
                error!(
                    kind = %self.kind,
                    %base,
                    count,
                    page = %self.base,
                    "Dropped descriptors outside their page"
                );
                return;
            }
        };
        let mut state = self.state.lock();
        state.stale.push_back(StaleBlock {
            offset,
            size: count,
            frame,
        });
        state.stale_count += count;
        state.allocated_count -= count;
        trace!(kind = %self.kind, offset, count, %frame, "Queued stale descriptors");
    }

    /// Reclaim every stale range stamped at or before `retired`
    ///
    /// Frees are queued in frame order, so only the front of the queue is
    /// examined. Returns the number of descriptors reclaimed.
    pub fn release_stale(&self, retired: FrameMarker) -> u32 {
        let mut state = self.state.lock();
        let mut reclaimed = 0;

        while let Some(block) = state.stale.front().copied() {
            if block.frame > retired {
                break;
            }
            state.stale.pop_front();
            state.free_list.release(block.offset, block.size);
            state.free_count += block.size;
            state.stale_count -= block.size;
            reclaimed += block.size;
        }

        if reclaimed > 0 {
            debug!(kind = %self.kind, reclaimed, %retired, "Released stale descriptors");
        }
        reclaimed
    }

    /// Snapshot of the page's occupancy
    pub fn stats(&self) -> PageStats {
        let state = self.state.lock();
        PageStats {
            capacity: self.capacity,
            free: state.free_count,
            allocated: state.allocated_count,
            stale_blocks: state.stale.len(),
            stale_descriptors: state.stale_count,
            free_blocks: state.free_list.len(),
            largest_free_block: state.free_list.largest().map_or(0, |b| b.size),
        }
    }

    /// Check the page's bookkeeping invariants
    pub fn verify(&self) -> Result<()> {
        let state = self.state.lock();

        state
            .free_list
            .check(self.capacity)
            .map_err(Error::Corrupted)?;

        let listed = state.free_list.total();
        if listed != state.free_count as u64 {
            return Err(Error::Corrupted(format!(
                "free count {} but free list holds {}",
                state.free_count, listed
            )));
        }

        let queued: u64 = state.stale.iter().map(|b| b.size as u64).sum();
        if queued != state.stale_count as u64 {
            return Err(Error::Corrupted(format!(
                "stale count {} but stale queue holds {}",
                state.stale_count, queued
            )));
        }

        let accounted =
            state.free_count as u64 + state.stale_count as u64 + state.allocated_count as u64;
        if accounted != self.capacity as u64 {
            return Err(Error::Corrupted(format!(
                "free {} + stale {} + allocated {} != capacity {}",
                state.free_count, state.stale_count, state.allocated_count, self.capacity
            )));
        }

        Ok(())
    }

    /// Free blocks as `(offset, size)` in offset order
    pub fn free_blocks(&self) -> Vec<(u32, u32)> {
        self.state
            .lock()
            .free_list
            .blocks()
            .map(|b| (b.offset, b.size))
            .collect()
    }
}

impl std::fmt::Debug for DescriptorPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorPage")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("base", &self.base)
            .field("stride", &self.stride)
            .finish()
    }
}

/// Occupancy of one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageStats {
    pub capacity: u32,
    pub free: u32,
    pub allocated: u32,
    pub stale_blocks: usize,
    pub stale_descriptors: u32,
    pub free_blocks: usize,
    pub largest_free_block: u32,
}
