//! Heap-backed Region Allocator
//!
//! First-fit region allocator over a fixed arena, built on
//! `linked_list_allocator`. The kernel hands it the memory reserved for
//! process stacks and heaps at boot.
//!
//! # Time Complexity
//!
//! - Allocation: O(n) in the number of free blocks
//! - Deallocation: O(n), merging with adjacent free blocks

#![deny(missing_docs)]
#![warn(clippy::undocumented_unsafe_blocks)]

use core::alloc::Layout;
use core::ptr::NonNull;

use linked_list_allocator::Heap;

use super::{MemoryError, MemoryRegion, MemoryResult, REGION_ALIGN, RegionAllocator};

/// Allocation statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    /// Total successful allocations
    pub total_allocations: u64,
    /// Total releases
    pub total_releases: u64,
    /// Failed allocations
    pub failed_allocations: u64,
}

/// Region allocator over a single contiguous arena
pub struct HeapAllocator {
    heap: Heap,
    stats: AllocationStats,
}

impl HeapAllocator {
    /// Create an allocator that manages `size` bytes starting at `start`
    ///
    /// # Safety
    ///
    /// The memory in `start..start + size` must be valid for reads and writes,
    /// unused by anything else, and stay alive as long as the allocator and
    /// every region it hands out.
    pub unsafe fn new(start: *mut u8, size: usize) -> Self {
        // SAFETY: Forwarded from the caller's contract.
        let heap = unsafe { Heap::new(start, size) };
        Self {
            heap,
            stats: AllocationStats::default(),
        }
    }

    /// Allocation statistics since creation
    pub const fn stats(&self) -> AllocationStats {
        self.stats
    }

    /// Bytes currently handed out
    pub fn used(&self) -> usize {
        self.heap.used()
    }

    /// Bytes still available
    pub fn free(&self) -> usize {
        self.heap.free()
    }

    fn layout(size: usize) -> MemoryResult<Layout> {
        if size == 0 {
            return Err(MemoryError::InvalidSize);
        }
        Layout::from_size_align(size, REGION_ALIGN).map_err(|_| MemoryError::InvalidSize)
    }
}

// SAFETY: `Heap` hands out disjoint, writable blocks from the arena the caller
// of `HeapAllocator::new` vouched for, and every layout requests REGION_ALIGN.
unsafe impl RegionAllocator for HeapAllocator {
    fn allocate(&mut self, size: usize) -> MemoryResult<MemoryRegion> {
        let layout = Self::layout(size)?;
        match self.heap.allocate_first_fit(layout) {
            Ok(ptr) => {
                self.stats.total_allocations += 1;
                Ok(MemoryRegion::new(ptr.as_ptr() as usize, size))
            }
            Err(()) => {
                self.stats.failed_allocations += 1;
                Err(MemoryError::OutOfMemory)
            }
        }
    }

    fn release(&mut self, region: MemoryRegion) {
        let Ok(layout) = Self::layout(region.size) else {
            log::warn!("Ignoring release of zero-sized region at {:#x}", region.base);
            return;
        };
        let Some(ptr) = NonNull::new(region.base as *mut u8) else {
            log::warn!("Ignoring release of null region");
            return;
        };
        // SAFETY: Regions only come from `allocate`, which used the same
        // layout, and the ownership rules guarantee a single release.
        unsafe { self.heap.deallocate(ptr, layout) };
        self.stats.total_releases += 1;
    }
}
