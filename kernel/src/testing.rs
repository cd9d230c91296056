//! Host-side fixtures for unit tests

use crate::arch::{Architecture, CpuContext, Resumption};
use crate::memory::{HeapAllocator, MemoryRegion, MemoryResult, RegionAllocator};
use crate::process::{
    IDLE_PROCESS_NAME, Process, ProcessConfig, ProcessId, ProcessManager, ProcessState,
    ProcessStats, bounded_name,
};

/// Arena size backing test managers; fits a full table with `test_config`
const MANAGER_ARENA: usize = 256 * 1024;

/// Heap-backed memory the allocators under test carve regions from
pub struct Arena {
    memory: Box<[u128]>,
}

impl Arena {
    pub fn new(bytes: usize) -> Self {
        Self {
            memory: vec![0u128; bytes.div_ceil(16)].into_boxed_slice(),
        }
    }

    /// Allocator over the whole arena; the arena must outlive it
    pub fn allocator(&mut self) -> HeapAllocator {
        let size = self.memory.len() * 16;
        // SAFETY: The boxed buffer is exclusively borrowed here and does not
        // move when the `Arena` does; tests keep the arena alive.
        unsafe { HeapAllocator::new(self.memory.as_mut_ptr().cast(), size) }
    }
}

/// Bare record for registry tests
pub fn record(pid: u32, name: &str) -> Process {
    Process {
        id: ProcessId::new(pid),
        name: bounded_name(name),
        state: ProcessState::New,
        priority: 0,
        entry_point: 0,
        context: CpuContext::default(),
        stack: MemoryRegion::new(0, 0),
        heap: MemoryRegion::new(0, 0),
        links: Default::default(),
        stats: ProcessStats::default(),
    }
}

/// Architecture that records transfers instead of performing them
#[derive(Debug, Default)]
pub struct RecordingArch {
    /// Contexts passed to `restore_and_resume`, in order
    pub restored: Vec<CpuContext>,
    /// Number of `save_context` calls
    pub saves: usize,
    /// Report every save as a resumption
    pub resume_on_save: bool,
}

impl Architecture for RecordingArch {
    fn save_context(&mut self, _context: &mut CpuContext) -> Resumption {
        self.saves += 1;
        if self.resume_on_save {
            Resumption::Resumed
        } else {
            Resumption::Saved
        }
    }

    unsafe fn restore_and_resume(&mut self, context: &CpuContext) {
        self.restored.push(*context);
    }

    fn halt(message: &str) -> ! {
        panic!("{message}")
    }
}

/// Allocator that fails chosen requests and tracks every grant and release
pub struct FaultyAllocator {
    _arena: Arena,
    inner: HeapAllocator,
    requests: usize,
    fail_on: Option<usize>,
    granted: Vec<(usize, MemoryRegion)>,
    released: Vec<MemoryRegion>,
}

impl FaultyAllocator {
    pub fn new(bytes: usize) -> Self {
        let mut arena = Arena::new(bytes);
        let inner = arena.allocator();
        Self {
            _arena: arena,
            inner,
            requests: 0,
            fail_on: None,
            granted: Vec::new(),
            released: Vec::new(),
        }
    }

    /// Fail request number `request`, counting from zero
    pub fn fail_on_request(&mut self, request: usize) {
        self.fail_on = Some(request);
    }

    /// Region handed out for request number `request`
    pub fn granted(&self, request: usize) -> Option<MemoryRegion> {
        self.granted
            .iter()
            .find(|(number, _)| *number == request)
            .map(|(_, region)| *region)
    }

    pub fn release_count(&self, region: MemoryRegion) -> usize {
        self.released.iter().filter(|&&released| released == region).count()
    }

    /// Regions granted and not yet released
    pub fn live_regions(&self) -> usize {
        self.granted.len() - self.released.len()
    }
}

// SAFETY: Grants come straight from the wrapped `HeapAllocator`.
unsafe impl RegionAllocator for FaultyAllocator {
    fn allocate(&mut self, size: usize) -> MemoryResult<MemoryRegion> {
        let request = self.requests;
        self.requests += 1;
        if self.fail_on == Some(request) {
            return Err(crate::memory::MemoryError::OutOfMemory);
        }
        let region = self.inner.allocate(size)?;
        self.granted.push((request, region));
        Ok(region)
    }

    fn release(&mut self, region: MemoryRegion) {
        self.released.push(region);
        self.inner.release(region);
    }
}

pub type TestManager = ProcessManager<HeapAllocator, RecordingArch>;

/// Small regions so a full table fits in a test arena
pub fn test_config() -> ProcessConfig {
    ProcessConfig {
        stack_size: 512,
        heap_size: 256,
        idle_name: IDLE_PROCESS_NAME,
    }
}

/// Manager over a fresh arena; keep the arena alive alongside it
pub fn manager() -> (Arena, TestManager) {
    let mut arena = Arena::new(MANAGER_ARENA);
    let manager = manager_with(arena.allocator());
    (arena, manager)
}

pub fn manager_with<A: RegionAllocator>(allocator: A) -> ProcessManager<A, RecordingArch> {
    ProcessManager::init(allocator, RecordingArch::default(), test_config())
}
