//! Initial Context Construction
//!
//! Builds the register snapshot a new process is first dispatched with and
//! writes its bootstrap frame into the top of its stack.
//!
//! # Bootstrap Frame
//!
//! ```text
//! stack top  ->  +----------------------+
//!                | 0 (alignment pad)    |
//!                +----------------------+
//!                | initial flags 0x202  |
//!                +----------------------+
//! initial rsp -> | exit entry address   |
//!                +----------------------+
//! ```
//!
//! Every dispatch, including the first, resumes from the register snapshot,
//! which already carries the entry point and the initial flags. The frame on
//! the stack only matters if the entry function executes a bare `ret`: it
//! pops the exit entry address and falls into exit handling.
//!
//! The pad puts the initial stack pointer at the alignment a called function
//! expects, so the entry function starts correctly aligned. After its `ret`
//! the stack pointer is 16-byte aligned instead, which is why the exit entry
//! address on x86_64 is a stub that realigns the stack and then calls
//! [`super::entry::process_exit_entry`].

#![warn(clippy::undocumented_unsafe_blocks)]

use crate::arch::{CpuContext, RFlags, WORD_SIZE};
use crate::memory::{MemoryRegion, REGION_ALIGN};

use super::{ProcessError, ProcessResult};

/// Words written at the top of every new stack
pub const BOOTSTRAP_WORDS: usize = 3;

/// Bytes occupied by the bootstrap frame
pub const BOOTSTRAP_FRAME_SIZE: usize = BOOTSTRAP_WORDS * WORD_SIZE;

/// Build the initial context for a process entering at `entry_point`
///
/// The bootstrap frame is written into `stack`, which must be a writable
/// region handed out by a [`crate::memory::RegionAllocator`] and owned by
/// the new process.
pub fn initial_context(
    entry_point: usize,
    stack: MemoryRegion,
    exit_entry: usize,
) -> ProcessResult<CpuContext> {
    let top = stack.end() & !(REGION_ALIGN - 1);
    if top < stack.base + BOOTSTRAP_FRAME_SIZE {
        return Err(ProcessError::InvalidArgument);
    }

    let frame = [exit_entry as u64, RFlags::INITIAL.bits(), 0];
    let stack_pointer = top - BOOTSTRAP_FRAME_SIZE;
    let words = stack_pointer as *mut u64;
    for (offset, word) in frame.into_iter().enumerate() {
        // SAFETY: `stack_pointer..top` lies inside `stack`, which the
        // allocator contract makes writable and exclusively ours. Both ends
        // are word aligned because `top` is REGION_ALIGN aligned.
        unsafe { words.add(offset).write(word) };
    }

    Ok(CpuContext::new(entry_point as u64, stack_pointer as u64))
}
