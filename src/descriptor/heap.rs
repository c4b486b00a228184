//! Native heap provider
//!
//! The allocator never talks to the device directly. Each new page asks a
//! [`DescriptorHeapProvider`] for a backing heap and only keeps the base
//! address and handle stride it receives.

use super::handle::{CpuDescriptorHandle, DescriptorHeapKind};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

/// Backing store for one page: where slot 0 lives and how far apart slots are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeHeap {
    pub base: CpuDescriptorHandle,
    pub stride: u32,
}

/// Creates native descriptor heaps on behalf of the allocator
pub trait DescriptorHeapProvider: Send + Sync {
    /// Create a heap of `capacity` descriptors of `kind`
    fn create_heap(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<NativeHeap>;
}

/// Hands out non-overlapping virtual address ranges instead of device heaps
///
/// Used when no device is attached, and in tests.
#[derive(Debug)]
pub struct SyntheticHeapProvider {
    strides: HashMap<DescriptorHeapKind, u32>,
    next_base: Mutex<usize>,
}

impl SyntheticHeapProvider {
    /// Address of the first synthetic heap; keeps handle 0 invalid
    pub const BASE_ADDRESS: usize = 0x1_0000;

    pub fn new() -> Self {
        let strides = DescriptorHeapKind::ALL
            .iter()
            .map(|&kind| (kind, Self::default_stride(kind)))
            .collect();
        Self {
            strides,
            next_base: Mutex::new(Self::BASE_ADDRESS),
        }
    }

    /// Override the handle stride for one kind
    pub fn with_stride(mut self, kind: DescriptorHeapKind, stride: u32) -> Self {
        self.strides.insert(kind, stride);
        self
    }

    pub fn default_stride(kind: DescriptorHeapKind) -> u32 {
        match kind {
            DescriptorHeapKind::Dsv => 8,
            _ => 32,
        }
    }

    pub fn stride(&self, kind: DescriptorHeapKind) -> u32 {
        self.strides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| Self::default_stride(kind))
    }
}

impl Default for SyntheticHeapProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorHeapProvider for SyntheticHeapProvider {
    fn create_heap(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<NativeHeap> {
        let stride = self.stride(kind);
        if stride == 0 {
            return Err(Error::Heap(format!("zero stride for {} heap", kind)));
        }

        let len = (capacity as usize)
            .checked_mul(stride as usize)
            .ok_or_else(|| Error::Heap(format!("{} heap of {} overflows", kind, capacity)))?;

        let mut next = self.next_base.lock();
        let base = *next;
        *next = base
            .checked_add(len)
            .ok_or_else(|| Error::Heap("synthetic address space exhausted".to_string()))?;

        debug!(%kind, capacity, stride, base = base, "Created synthetic descriptor heap");
        Ok(NativeHeap {
            base: CpuDescriptorHandle::new(base),
            stride,
        })
    }
}
