//! End-to-end allocation scenarios through the public API

use photon_descriptors::error::{Error, Result};
use photon_descriptors::{
    CpuDescriptorHandle, DescriptorAllocation, DescriptorAllocator, DescriptorHeapKind,
    DescriptorPage, FrameClock, FrameMarker, NativeHeap,
};
use std::sync::Arc;

fn page(capacity: u32) -> Arc<DescriptorPage> {
    let heap = NativeHeap {
        base: CpuDescriptorHandle::new(0x10_0000),
        stride: 32,
    };
    Arc::new(DescriptorPage::new(
        DescriptorHeapKind::CbvSrvUav,
        capacity,
        heap,
        Arc::new(FrameClock::new()),
    ))
}

fn offset_of(page: &DescriptorPage, allocation: &DescriptorAllocation) -> u32 {
    page.offset_of(allocation.base()).expect("handle inside page")
}

#[test]
fn test_page_lifecycle_scenarios() -> Result<()> {
    let page = page(256);

    // A: first allocation starts at 0
    let first = page.allocate(64);
    assert_eq!(offset_of(&page, &first), 0);
    assert_eq!(first.count(), 64);
    assert_eq!(page.free_blocks(), vec![(64, 192)]);

    // B: second follows it
    let second = page.allocate(64);
    assert_eq!(offset_of(&page, &second), 64);
    assert_eq!(page.free_blocks(), vec![(128, 128)]);

    // C: freeing only queues; reclaiming does not merge across a live block
    page.free(first, FrameMarker(5))?;
    assert_eq!(page.free_blocks(), vec![(128, 128)]);
    page.release_stale(FrameMarker(5));
    assert_eq!(page.free_blocks(), vec![(0, 64), (128, 128)]);

    // D: the middle block merges with both neighbors
    page.free(second, FrameMarker(5))?;
    page.release_stale(FrameMarker(5));
    assert_eq!(page.free_blocks(), vec![(0, 256)]);
    assert_eq!(page.num_free(), 256);

    page.verify()
}

#[test]
fn test_oversized_request_scenario() -> Result<()> {
    // E: a page cannot, the pool can
    let page = page(256);
    assert!(page.allocate(300).is_null());

    let allocator = DescriptorAllocator::new(DescriptorHeapKind::CbvSrvUav, 256)?;
    let big = allocator.allocate(300)?;
    assert!(!big.is_null());
    assert!(big.page().unwrap().capacity() >= 300);
    allocator.verify()
}

#[test]
fn test_reclaim_order_follows_frames() -> Result<()> {
    let allocator = DescriptorAllocator::new(DescriptorHeapKind::Rtv, 30)?;
    let a = allocator.allocate(10)?;
    let b = allocator.allocate(10)?;
    let c = allocator.allocate(10)?;

    a.release(FrameMarker(1));
    b.release(FrameMarker(2));
    c.release(FrameMarker(3));

    assert_eq!(allocator.release_stale(FrameMarker(2)), 20);
    let stats = allocator.stats();
    assert_eq!(stats.free_descriptors, 20);
    assert_eq!(stats.stale_descriptors, 10);

    assert_eq!(allocator.release_stale(FrameMarker(2)), 0);
    assert_eq!(allocator.release_stale(FrameMarker(3)), 10);
    assert_eq!(allocator.stats().pages[0].free_blocks, 1);
    allocator.verify()
}

#[test]
fn test_handles_address_each_slot() -> Result<()> {
    let allocator = DescriptorAllocator::new(DescriptorHeapKind::Dsv, 16)?;
    let allocation = allocator.allocate(4)?;

    let handles: Vec<usize> = (0..4)
        .map(|i| allocation.handle(i).map(|h| h.ptr))
        .collect::<Result<_>>()?;
    let stride = allocation.stride() as usize;
    assert!(handles.windows(2).all(|w| w[1] - w[0] == stride));

    assert!(matches!(
        allocation.handle(4),
        Err(Error::OutOfRange { offset: 4, count: 4 })
    ));
    Ok(())
}

#[test]
fn test_drop_defers_reuse_until_frame_retires() -> Result<()> {
    let allocator = DescriptorAllocator::new(DescriptorHeapKind::Sampler, 8)?;
    let clock = Arc::clone(allocator.clock());

    let view = allocator.allocate(8)?;
    let first_page = view.page().unwrap().base();
    drop(view);
    let in_flight = clock.advance();

    // Frame still in flight: the pool must grow instead of reusing
    let other = allocator.allocate(8)?;
    assert_ne!(other.page().unwrap().base(), first_page);
    assert_eq!(allocator.page_count(), 2);

    allocator.release_stale(clock.retire(in_flight));
    let reused = allocator.allocate(8)?;
    assert_eq!(reused.page().unwrap().base(), first_page);
    assert_eq!(allocator.page_count(), 2);
    Ok(())
}
