//! Descriptor Allocator
//!
//! Manages descriptor heaps in fixed-capacity pages. Each allocation is a
//! contiguous run of slots inside one page.
//!
//! # Architecture
//!
//! ```text
//! DescriptorAllocators
//!   ├─→ DescriptorAllocator(CbvSrvUav)
//!   │     ├─→ Page 0 (256)  Free: [(64, 192)]       Stale: [(0, 64) @ frame 5]
//!   │     └─→ Page 1 (300)  Free: []                ← exhausted, not available
//!   ├─→ DescriptorAllocator(Sampler)
//!   ├─→ DescriptorAllocator(Rtv)
//!   └─→ DescriptorAllocator(Dsv)
//!
//! FrameClock (shared)
//!   └─→ stamps dropped allocations, retired frames drive release_stale
//! ```
//!
//! Pages keep free space fully coalesced and serve requests best fit.
//! Dropped allocations are held back until their frame retires, because the
//! GPU may still read those descriptors.

pub mod allocation;
pub mod allocator;
pub mod free_list;
pub mod handle;
pub mod heap;
pub mod page;
pub mod set;

pub use allocation::DescriptorAllocation;
pub use allocator::{AllocatorStats, DescriptorAllocator};
pub use free_list::{FreeBlock, FreeList};
pub use handle::{CpuDescriptorHandle, DescriptorHeapKind};
pub use heap::{DescriptorHeapProvider, NativeHeap, SyntheticHeapProvider};
pub use page::{DescriptorPage, PageStats};
pub use set::DescriptorAllocators;
