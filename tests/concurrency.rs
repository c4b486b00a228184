//! Multi-threaded allocate / drop / reclaim

use photon_descriptors::error::Result;
use photon_descriptors::{DescriptorAllocator, DescriptorHeapKind, FrameMarker};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn test_concurrent_allocations_are_disjoint() -> Result<()> {
    init_tracing();
    let allocator = Arc::new(DescriptorAllocator::new(DescriptorHeapKind::CbvSrvUav, 64)?);

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || -> Result<Vec<(usize, usize)>> {
                let mut held = Vec::new();
                let mut ranges = Vec::new();
                for i in 0..50 {
                    let count = 1 + ((worker + i) % 7) as u32;
                    let allocation = allocator.allocate(count)?;
                    let start = allocation.base().ptr;
                    let end = start + (allocation.count() * allocation.stride()) as usize;
                    ranges.push((start, end));
                    held.push(allocation);
                }
                // Keep everything alive until the ranges are collected
                drop(held);
                Ok(ranges)
            })
        })
        .collect();

    let mut ranges = Vec::new();
    for worker in workers {
        ranges.extend(worker.join().expect("worker panicked")?);
    }

    allocator.verify()?;
    let stats = allocator.stats();
    assert_eq!(stats.allocated_descriptors(), 0);
    assert_eq!(
        stats.stale_descriptors,
        ranges
            .iter()
            .map(|(s, e)| ((e - s) / 32) as u64)
            .sum::<u64>()
    );

    // Nothing was reused while stale, so no two ranges may overlap
    ranges.sort();
    assert!(ranges.windows(2).all(|w| w[0].1 <= w[1].0));
    Ok(())
}

#[test]
fn test_reclaim_while_allocating() -> Result<()> {
    init_tracing();
    let allocator = Arc::new(DescriptorAllocator::new(DescriptorHeapKind::Rtv, 32)?);
    let clock = Arc::clone(allocator.clock());

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || -> Result<()> {
                for i in 0..200u32 {
                    let allocation = allocator.allocate(1 + i % 5)?;
                    drop(allocation);
                }
                Ok(())
            })
        })
        .collect();

    let reclaimer = {
        let allocator = Arc::clone(&allocator);
        let clock = Arc::clone(&clock);
        thread::spawn(move || {
            for _ in 0..100 {
                let ended = clock.advance();
                allocator.release_stale(clock.retire(ended));
                thread::yield_now();
            }
        })
    };

    for producer in producers {
        producer.join().expect("producer panicked")?;
    }
    reclaimer.join().expect("reclaimer panicked");

    allocator.release_stale(FrameMarker(u64::MAX));
    allocator.verify()?;

    let stats = allocator.stats();
    assert_eq!(stats.stale_descriptors, 0);
    assert_eq!(stats.free_descriptors, stats.total_descriptors);
    assert!(stats.pages.iter().all(|p| p.free_blocks == 1));
    Ok(())
}
