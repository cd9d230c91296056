//! Process Lifecycle Manager
//!
//! [`ProcessManager`] is the single owned scheduler state of the kernel: the
//! registry, the state queues, the round-robin cursor, the current-process
//! handle, and the allocator and architecture collaborators. It is the only
//! component that frees a process's memory or clears its registry slot.

#![warn(clippy::undocumented_unsafe_blocks)]

use heapless::Vec;
use log::{debug, error, info, warn};

use crate::arch::Architecture;
use crate::memory::{MemoryRegion, RegionAllocator};
use crate::scheduler::{RoundRobin, idle_main};

use super::context::initial_context;
use super::entry::exit_entry_address;
use super::queue::{QueueKind, StateQueues};
use super::table::{ProcessTable, Slot};
use super::{
    MAX_PROCESSES, Priority, Process, ProcessConfig, ProcessError, ProcessId, ProcessResult,
    ProcessState, ProcessStats, ProcessSummary, bounded_name,
};

/// Kernel scheduler state
pub struct ProcessManager<A, M> {
    pub(crate) table: ProcessTable,
    pub(crate) queues: StateQueues,
    pub(crate) scheduler: RoundRobin,
    pub(crate) current: Option<Slot>,
    pub(crate) allocator: A,
    pub(crate) arch: M,
    pub(crate) config: ProcessConfig,
}

impl<A, M> ProcessManager<A, M>
where
    A: RegionAllocator,
    M: Architecture,
{
    /// Bootstrap the registry and create the idle process
    ///
    /// Halts the machine if the idle process cannot be created, since the
    /// scheduler cannot make progress without a fallback.
    pub fn init(allocator: A, arch: M, config: ProcessConfig) -> Self {
        match Self::try_init(allocator, arch, config) {
            Ok(manager) => manager,
            Err(err) => {
                error!("Failed to create idle process: {err}");
                M::halt("Failed to create idle process")
            }
        }
    }

    /// Bootstrap the registry and create the idle process, reporting failure
    pub fn try_init(allocator: A, arch: M, config: ProcessConfig) -> ProcessResult<Self> {
        info!("Initializing process manager...");

        let mut manager = Self {
            table: ProcessTable::new(),
            queues: StateQueues::new(),
            scheduler: RoundRobin::new(),
            current: None,
            allocator,
            arch,
            config,
        };

        let idle_entry: extern "C" fn() -> ! = idle_main;
        let idle_name = manager.config.idle_name;
        manager.create(idle_name, 0, idle_entry as usize)?;

        info!("Process manager ready");
        Ok(manager)
    }

    /// Create a process and make it ready to run
    pub fn create(&mut self, name: &str, priority: Priority, entry_point: usize) -> ProcessResult<Slot> {
        if self.table.is_full() {
            error!("Process table full");
            return Err(ProcessError::TableFull);
        }

        let stack = self.allocator.allocate(self.config.stack_size).map_err(|err| {
            error!("Failed to allocate stack for process: {err}");
            ProcessError::AllocationFailed
        })?;

        let heap = match self.allocator.allocate(self.config.heap_size) {
            Ok(heap) => heap,
            Err(err) => {
                error!("Failed to allocate heap for process: {err}");
                self.allocator.release(stack);
                return Err(ProcessError::AllocationFailed);
            }
        };

        let context = match initial_context(entry_point, stack, exit_entry_address()) {
            Ok(context) => context,
            Err(err) => {
                error!("Stack too small for bootstrap frame: {err}");
                self.release_regions(stack, heap);
                return Err(err);
            }
        };

        let id = match self.table.allocate_pid() {
            Ok(id) => id,
            Err(err) => {
                error!("Cannot create process {name}: {err}");
                self.release_regions(stack, heap);
                return Err(err);
            }
        };
        let process = Process {
            id,
            name: bounded_name(name),
            state: ProcessState::New,
            priority,
            entry_point,
            context,
            stack,
            heap,
            links: Default::default(),
            stats: ProcessStats::default(),
        };

        let slot = match self.table.insert(process) {
            Ok(slot) => slot,
            Err(err) => {
                self.release_regions(stack, heap);
                return Err(err);
            }
        };

        self.set_state(slot, ProcessState::Ready)?;

        info!("Created process: {name} (PID: {id})");
        Ok(slot)
    }

    /// Move a process to `new_state`, keeping queue membership consistent
    ///
    /// This is the only sanctioned way to change a process's state.
    pub fn set_state(&mut self, slot: Slot, new_state: ProcessState) -> ProcessResult<()> {
        let old_state = self.table.state(slot).ok_or(ProcessError::InvalidArgument)?;

        self.queues.remove_from_queue(&mut self.table, slot, old_state);

        let Some(process) = self.table.get_mut(slot) else {
            return Err(ProcessError::InvalidArgument);
        };
        process.state = new_state;
        process.stats.state_changes += 1;
        let id = process.id;

        self.queues.add_to_queue(&mut self.table, slot, new_state);

        debug!("Process {id}: {old_state} -> {new_state}");
        Ok(())
    }

    /// Release every zombie's memory and registry slot
    ///
    /// Drains the zombie queue completely and returns how many processes
    /// were reaped.
    pub fn reap_zombies(&mut self) -> usize {
        let mut reaped = 0;
        let mut cursor = self.queues.take(QueueKind::Zombie);

        while let Some(slot) = cursor {
            let Some(process) = self.table.remove(slot) else {
                warn!("Zombie queue referenced empty slot {}", slot.index());
                break;
            };
            cursor = process.links.next;

            info!("Reaping zombie process {}", process.id);
            self.release_regions(process.stack, process.heap);
            if self.current == Some(slot) {
                self.current = None;
            }
            reaped += 1;
        }

        reaped
    }

    /// Retire the current process as a zombie and switch to the next one
    ///
    /// On hardware this does not return once another process is dispatched.
    pub fn terminate_current(&mut self) -> ProcessResult<()> {
        let slot = self.current.ok_or(ProcessError::NotFound)?;
        if let Some(process) = self.table.get(slot) {
            info!("Process {} ({}) exiting", process.id, process.name);
        }

        self.set_state(slot, ProcessState::Zombie)?;
        self.yield_now();
        Ok(())
    }

    /// First process named `name`
    pub fn find(&self, name: &str) -> Option<Slot> {
        self.table.find_by_name(name)
    }

    /// Process with identifier `pid`
    pub fn find_by_pid(&self, pid: ProcessId) -> Option<Slot> {
        self.table.find_by_pid(pid)
    }

    /// Record in `slot`
    pub fn process(&self, slot: Slot) -> Option<&Process> {
        self.table.get(slot)
    }

    /// Summaries of every live process
    pub fn list(&self) -> Vec<ProcessSummary, MAX_PROCESSES> {
        self.table.list()
    }

    /// Dump the process table to the log
    pub fn list_all(&self) {
        info!("{}", self.table);
    }

    /// Serialize the process list into `buf`, returning the bytes written
    pub fn encode_snapshot(&self, buf: &mut [u8]) -> ProcessResult<usize> {
        postcard::to_slice(&self.list(), buf)
            .map(|encoded| encoded.len())
            .map_err(|_| ProcessError::SnapshotEncoding)
    }

    /// Number of live processes
    pub const fn count(&self) -> usize {
        self.table.len()
    }

    /// Currently running process
    pub const fn current(&self) -> Option<Slot> {
        self.current
    }

    /// Replace the current-process handle
    pub fn set_current(&mut self, slot: Option<Slot>) {
        self.current = slot;
    }

    /// Process registry
    pub const fn table(&self) -> &ProcessTable {
        &self.table
    }

    /// State queue heads
    pub const fn queues(&self) -> &StateQueues {
        &self.queues
    }

    /// Configuration the manager was created with
    pub const fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Region allocator
    pub const fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Architecture handle
    pub const fn arch(&self) -> &M {
        &self.arch
    }

    fn release_regions(&mut self, stack: MemoryRegion, heap: MemoryRegion) {
        self.allocator.release(stack);
        self.allocator.release(heap);
    }
}
