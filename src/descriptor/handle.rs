//! Descriptor handles and heap kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of descriptor a heap stores
///
/// Each kind lives in its own heap with its own handle stride, so every
/// allocator serves exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorHeapKind {
    /// Constant buffer, shader resource and unordered access views
    CbvSrvUav,
    Sampler,
    /// Render target views
    Rtv,
    /// Depth stencil views
    Dsv,
}

impl DescriptorHeapKind {
    pub const ALL: [DescriptorHeapKind; 4] = [
        DescriptorHeapKind::CbvSrvUav,
        DescriptorHeapKind::Sampler,
        DescriptorHeapKind::Rtv,
        DescriptorHeapKind::Dsv,
    ];

    /// Stable lowercase name, used for metric labels and config sections
    pub fn as_str(self) -> &'static str {
        match self {
            DescriptorHeapKind::CbvSrvUav => "cbv_srv_uav",
            DescriptorHeapKind::Sampler => "sampler",
            DescriptorHeapKind::Rtv => "rtv",
            DescriptorHeapKind::Dsv => "dsv",
        }
    }

    /// Largest heap the device accepts for this kind
    pub fn max_heap_size(self) -> u32 {
        match self {
            DescriptorHeapKind::Sampler => 2048,
            _ => 1_000_000,
        }
    }
}

impl fmt::Display for DescriptorHeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque CPU address of one descriptor slot
///
/// Only offset arithmetic is performed on it; the contents behind the address
/// belong to the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CpuDescriptorHandle {
    pub ptr: usize,
}

impl CpuDescriptorHandle {
    pub fn new(ptr: usize) -> Self {
        Self { ptr }
    }

    /// Handle `index` slots past this one for the given stride
    pub fn offset(self, index: u32, stride: u32) -> Self {
        Self {
            ptr: self.ptr + index as usize * stride as usize,
        }
    }
}

impl fmt::Display for CpuDescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptor(0x{:x})", self.ptr)
    }
}
