//! Process Management Subsystem
//!
//! This module provides process management for the kernel:
//!
//! - Process registry with fixed capacity and unique identifiers
//! - Ready, blocked and zombie queues linked through stable slot handles
//! - Process creation with stack and heap regions owned by the process
//! - State transitions that keep queue membership consistent
//! - Exit handling and zombie reaping
//!
//! # Process States
//!
//! ```text
//! New -> Ready <-> Running -> Zombie -> (reaped)
//!          ^          |
//!          +-Blocked--+   (reserved for blocking I/O)
//! ```
//!
//! `Suspended` and `Dead` are reserved; nothing in this core produces them.

#![deny(missing_docs)]
#![warn(clippy::undocumented_unsafe_blocks)]

use core::fmt;

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror_no_std::Error;

use crate::arch::CpuContext;
use crate::memory::MemoryRegion;

pub mod context;
pub mod entry;
pub mod manager;
pub mod queue;
pub mod table;

pub use manager::ProcessManager;
pub use queue::{QueueKind, QueueLinks, StateQueues};
pub use table::{ProcessTable, Slot};

/// Maximum number of processes in the system
pub const MAX_PROCESSES: usize = 64;

/// Capacity of a process name buffer; names keep at most `MAX_NAME_LEN - 1` bytes
pub const MAX_NAME_LEN: usize = 32;

/// Default process stack size (16KB)
pub const DEFAULT_STACK_SIZE: usize = 16 * 1024;

/// Default process heap size (64KB)
pub const DEFAULT_HEAP_SIZE: usize = 64 * 1024;

/// Name of the process run when nothing else is ready
pub const IDLE_PROCESS_NAME: &str = "idle";

const_assert!(MAX_PROCESSES > 0);
const_assert!(IDLE_PROCESS_NAME.len() < MAX_NAME_LEN);

/// Bounded process name
pub type ProcessName = heapless::String<MAX_NAME_LEN>;

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Create a new process ID
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// First identifier handed out after boot
    pub const FIRST: ProcessId = ProcessId(1);
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Process states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessState {
    /// Allocated but not yet scheduled
    #[default]
    New,
    /// Eligible to run, waiting in the ready queue
    Ready,
    /// Currently executing; referenced only by the current-process handle
    Running,
    /// Waiting on an external condition, held in the blocked queue
    Blocked,
    /// Reserved
    Suspended,
    /// Terminated, resources not yet reclaimed, held in the zombie queue
    Zombie,
    /// Reserved terminal state
    Dead,
}

impl ProcessState {
    /// Upper-case name used in diagnostics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Blocked => "BLOCKED",
            Self::Suspended => "SUSPENDED",
            Self::Zombie => "ZOMBIE",
            Self::Dead => "DEAD",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Scheduling priority
///
/// Carried for future policies; round-robin selection ignores it.
pub type Priority = u32;

/// Process creation parameters shared by every process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Stack region size in bytes
    pub stack_size: usize,
    /// Heap region size in bytes
    pub heap_size: usize,
    /// Name of the fallback process created at init
    pub idle_name: &'static str,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            heap_size: DEFAULT_HEAP_SIZE,
            idle_name: IDLE_PROCESS_NAME,
        }
    }
}

/// Process statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStats {
    /// Number of times dispatched
    pub schedule_count: u64,
    /// Number of state changes
    pub state_changes: u64,
}

/// Process control block (PCB)
#[derive(Debug)]
pub struct Process {
    /// Process identifier
    pub id: ProcessId,
    /// Process name
    pub name: ProcessName,
    /// Current state; changed only through `ProcessManager::set_state`
    pub(crate) state: ProcessState,
    /// Priority level
    pub priority: Priority,
    /// Address the process starts executing at
    pub entry_point: usize,
    /// CPU context for context switching
    pub context: CpuContext,
    /// Stack region owned by this process
    pub stack: MemoryRegion,
    /// Heap region owned by this process
    pub heap: MemoryRegion,
    /// Links into the queue matching `state`
    pub(crate) links: QueueLinks,
    /// Resource usage statistics
    pub stats: ProcessStats,
}

impl Process {
    /// Current lifecycle state
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// Diagnostic summary of this process
    pub fn summary(&self) -> ProcessSummary {
        ProcessSummary {
            pid: self.id,
            state: self.state,
            priority: self.priority,
            name: self.name.clone(),
        }
    }
}

/// Read-only view of one registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    /// Process identifier
    pub pid: ProcessId,
    /// Lifecycle state at the time of the query
    pub state: ProcessState,
    /// Priority level
    pub priority: Priority,
    /// Process name
    pub name: ProcessName,
}

/// Process management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// Every registry slot is occupied
    #[error("process table full")]
    TableFull,
    /// The allocator could not supply a stack or heap region
    #[error("failed to allocate process memory")]
    AllocationFailed,
    /// Handle does not refer to a live process
    #[error("invalid process handle")]
    InvalidArgument,
    /// No process matches the query
    #[error("process not found")]
    NotFound,
    /// Every process identifier has been issued
    #[error("process identifiers exhausted")]
    PidExhausted,
    /// Snapshot does not fit the output buffer
    #[error("process snapshot encoding failed")]
    SnapshotEncoding,
}

/// Result type for process operations
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Copy `name` into a bounded buffer, truncating on a character boundary
pub fn bounded_name(name: &str) -> ProcessName {
    let mut bounded = ProcessName::new();
    for ch in name.chars() {
        if bounded.len() + ch.len_utf8() > MAX_NAME_LEN - 1 || bounded.push(ch).is_err() {
            break;
        }
    }
    bounded
}
