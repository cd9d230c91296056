//! Memory Management Boundary
//!
//! The process core does not manage memory itself. It asks a raw region
//! allocator for a stack and a heap per process and hands both back when
//! the process is reaped.
//!
//! # Ownership Rules
//!
//! - A region handed out by [`RegionAllocator::allocate`] is owned by exactly
//!   one process until it is passed to [`RegionAllocator::release`]
//! - Regions are released exactly once, only by the reaper or by the
//!   creation rollback path
//! - Every region is aligned to [`REGION_ALIGN`]

#![deny(missing_docs)]
#![warn(clippy::undocumented_unsafe_blocks)]

use thiserror_no_std::Error;

pub mod allocator;

pub use allocator::HeapAllocator;

/// Alignment of every region handed out by an allocator
pub const REGION_ALIGN: usize = 16;

/// Memory management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The allocator has no block large enough
    #[error("out of memory")]
    OutOfMemory,
    /// Zero-sized or unrepresentable request
    #[error("invalid region size")]
    InvalidSize,
    /// Region was not handed out by this allocator
    #[error("invalid region address")]
    InvalidAddress,
}

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// A contiguous block of memory owned by one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// Lowest address of the region
    pub base: usize,
    /// Size of the region in bytes
    pub size: usize,
}

impl MemoryRegion {
    /// Create a region descriptor
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// One past the highest address of the region
    pub const fn end(&self) -> usize {
        self.base + self.size
    }

    /// Check if an address lies inside the region
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end()
    }
}

/// Raw allocator supplying fixed-size byte regions
///
/// # Safety
///
/// Implementors must hand out regions that are writable, aligned to
/// [`REGION_ALIGN`], disjoint from every other live region, and valid until
/// passed back to [`RegionAllocator::release`]. The process core writes the
/// initial stack frame directly into stack regions.
pub unsafe trait RegionAllocator {
    /// Allocate a region of `size` bytes
    fn allocate(&mut self, size: usize) -> MemoryResult<MemoryRegion>;

    /// Return a region previously handed out by [`RegionAllocator::allocate`]
    fn release(&mut self, region: MemoryRegion);
}
