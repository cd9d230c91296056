//! Process Core Library
//!
//! Process management and scheduling core for a small uniprocessor kernel.
//! This library owns process creation, process state transitions, the
//! ready/blocked/zombie queues, cooperative context switching, and zombie
//! reaping.
//!
//! # Architecture
//!
//! All scheduler state lives in a single owned [`ProcessManager`]:
//! - Process registry: fixed-capacity slot table with monotonically assigned PIDs
//! - State queues: handle-linked doubly-linked lists keyed by process state
//! - Lifecycle manager: creation, state transitions, exit, reaping
//! - Round-robin scheduler with idle-process fallback
//! - Context switch primitive behind the [`arch::Architecture`] trait
//!
//! The kernel around this core supplies the raw memory allocator
//! ([`memory::RegionAllocator`]), the diagnostic console
//! ([`logging::Console`]), and the decision of *when* to reschedule.
//!
//! # Safety
//!
//! This core assumes a single flow of control per processor. Every mutation
//! of the registry, the queues and the current-process handle happens between
//! a context save and the matching restore, so no locks are taken. Extending
//! the kernel to multiple cores requires revisiting that assumption.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(missing_docs)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::panic)]
#![warn(clippy::unwrap_used)]

pub mod arch;
pub mod logging;
pub mod memory;
pub mod process;
pub mod scheduler;

#[cfg(test)]
mod testing;

use thiserror_no_std::Error;

pub use memory::{MemoryError, MemoryRegion, RegionAllocator};
pub use process::{
    ProcessConfig, ProcessError, ProcessId, ProcessManager, ProcessResult, ProcessState,
    ProcessSummary, Slot,
};

/// Core kernel error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KernelError {
    /// Memory subsystem failure
    #[error("memory error: {0}")]
    Memory(MemoryError),
    /// Process subsystem failure
    #[error("process error: {0}")]
    Process(ProcessError),
    /// Logger could not be installed
    #[error("logger already installed")]
    LoggerInstalled,
}

impl From<MemoryError> for KernelError {
    fn from(err: MemoryError) -> Self {
        Self::Memory(err)
    }
}

impl From<ProcessError> for KernelError {
    fn from(err: ProcessError) -> Self {
        Self::Process(err)
    }
}

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;
