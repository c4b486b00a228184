// PhotonDB - Descriptor Allocator
// Paged GPU descriptor heaps with coalescing free lists and frame-deferred reuse

#![warn(rust_2018_idioms)]

pub mod config;
pub mod descriptor;
pub mod frame;
pub mod metrics;

// Re-exports for convenience
pub use crate::config::{AllocatorConfig, DescriptorConfig};
pub use descriptor::{
    AllocatorStats, CpuDescriptorHandle, DescriptorAllocation, DescriptorAllocator,
    DescriptorAllocators, DescriptorHeapKind, DescriptorHeapProvider, DescriptorPage, NativeHeap,
    PageStats, SyntheticHeapProvider,
};
pub use frame::{FrameClock, FrameMarker};

/// Descriptor allocator error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Request too large: {requested} descriptors exceeds the page limit of {max}")]
        RequestTooLarge { requested: u32, max: u32 },

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Descriptor offset {offset} out of range for allocation of {count}")]
        OutOfRange { offset: u32, count: u32 },

        #[error("Heap error: {0}")]
        Heap(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Corrupted page: {0}")]
        Corrupted(String),

        #[error("Internal error: {0}")]
        Internal(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        let _version: &str = VERSION;
    }

    #[test]
    fn test_error_display() {
        let err = error::Error::RequestTooLarge {
            requested: 300,
            max: 256,
        };
        assert_eq!(
            err.to_string(),
            "Request too large: 300 descriptors exceeds the page limit of 256"
        );
    }
}
