//! Owned run of descriptors

use super::handle::CpuDescriptorHandle;
use super::page::DescriptorPage;
use crate::error::{Error, Result};
use crate::frame::FrameMarker;
use std::fmt;
use std::sync::Arc;

/// Exclusive ownership of `count` contiguous descriptors in one page
///
/// Move-only. Dropping a non-null allocation queues its range as stale at the
/// page clock's current frame; [`release`](Self::release) does the same at an
/// explicit frame. A null allocation owns nothing and dropping it does
/// nothing.
pub struct DescriptorAllocation {
    base: CpuDescriptorHandle,
    count: u32,
    stride: u32,
    page: Option<Arc<DescriptorPage>>,
}

impl DescriptorAllocation {
    /// An allocation that owns no descriptors
    pub fn null() -> Self {
        Self {
            base: CpuDescriptorHandle::default(),
            count: 0,
            stride: 0,
            page: None,
        }
    }

    pub(crate) fn new(
        base: CpuDescriptorHandle,
        count: u32,
        stride: u32,
        page: Arc<DescriptorPage>,
    ) -> Self {
        Self {
            base,
            count,
            stride,
            page: Some(page),
        }
    }

    pub fn is_null(&self) -> bool {
        self.count == 0
    }

    /// Handle of the descriptor at `offset` within this allocation
    pub fn handle(&self, offset: u32) -> Result<CpuDescriptorHandle> {
        if offset >= self.count {
            return Err(Error::OutOfRange {
                offset,
                count: self.count,
            });
        }
        Ok(self.base.offset(offset, self.stride))
    }

    /// Handle of the first descriptor
    pub fn base(&self) -> CpuDescriptorHandle {
        self.base
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Page the descriptors were carved from
    pub fn page(&self) -> Option<&Arc<DescriptorPage>> {
        self.page.as_ref()
    }

    /// Give the descriptors back, last used by GPU work in `frame`
    pub fn release(mut self, frame: FrameMarker) {
        self.return_to_page(Some(frame));
    }

    fn return_to_page(&mut self, frame: Option<FrameMarker>) {
        if let Some(page) = self.page.take() {
            let frame = frame.unwrap_or_else(|| page.clock().current());
            page.enqueue_stale(self.base, self.count, frame);
        }
        self.base = CpuDescriptorHandle::default();
        self.count = 0;
        self.stride = 0;
    }
}

impl Default for DescriptorAllocation {
    fn default() -> Self {
        Self::null()
    }
}

impl Drop for DescriptorAllocation {
    fn drop(&mut self) {
        self.return_to_page(None);
    }
}

impl fmt::Debug for DescriptorAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorAllocation")
            .field("base", &self.base)
            .field("count", &self.count)
            .field("stride", &self.stride)
            .field("page", &self.page.as_ref().map(|p| p.base()))
            .finish()
    }
}
