//! Architecture Abstraction Layer
//!
//! This module defines the boundary between the scheduler and raw hardware
//! state: the register snapshot kept per process and the primitive that
//! captures and resumes it.
//!
//! # Supported Architectures
//!
//! - x86_64 - bare-metal kernel target
//!
//! # Design Principles
//! - The register file is a structured record, one named field per register
//! - The hardware transfer is a narrow trait with an explicit contract
//! - Everything above this module stays architecture-agnostic

#![deny(missing_docs)]
#![warn(clippy::undocumented_unsafe_blocks)]

use bitflags::bitflags;
use static_assertions::const_assert_eq;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

/// Kernel code segment selector loaded on resume
pub const KERNEL_CODE_SELECTOR: u64 = 0x08;

/// Kernel data segment selector loaded on resume
pub const KERNEL_DATA_SELECTOR: u64 = 0x10;

/// Size of one machine word in bytes
pub const WORD_SIZE: usize = core::mem::size_of::<u64>();

bitflags! {
    /// Processor flags register bits relevant to process state
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RFlags: u64 {
        /// Carry flag
        const CARRY = 1 << 0;
        /// Reserved bit, always reads as one
        const RESERVED_1 = 1 << 1;
        /// Zero flag
        const ZERO = 1 << 6;
        /// Sign flag
        const SIGN = 1 << 7;
        /// Trap flag (single step)
        const TRAP = 1 << 8;
        /// Interrupt enable flag
        const INTERRUPT_ENABLE = 1 << 9;
        /// Direction flag
        const DIRECTION = 1 << 10;
        /// Overflow flag
        const OVERFLOW = 1 << 11;
    }
}

impl RFlags {
    /// Flags every new process starts with: interrupts enabled (0x202)
    pub const INITIAL: Self = Self::RESERVED_1.union(Self::INTERRUPT_ENABLE);
}

const_assert_eq!(RFlags::INITIAL.bits(), 0x202);

/// CPU execution context for process switching
///
/// Field order is part of the contract with the assembly in the
/// architecture implementations, which address fields by offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CpuContext {
    /// Accumulator
    pub rax: u64,
    /// Base register
    pub rbx: u64,
    /// Counter register
    pub rcx: u64,
    /// Data register
    pub rdx: u64,
    /// Source index
    pub rsi: u64,
    /// Destination index
    pub rdi: u64,
    /// Frame pointer
    pub rbp: u64,
    /// Stack pointer
    pub rsp: u64,
    /// General purpose register r8
    pub r8: u64,
    /// General purpose register r9
    pub r9: u64,
    /// General purpose register r10
    pub r10: u64,
    /// General purpose register r11
    pub r11: u64,
    /// General purpose register r12
    pub r12: u64,
    /// General purpose register r13
    pub r13: u64,
    /// General purpose register r14
    pub r14: u64,
    /// General purpose register r15
    pub r15: u64,
    /// Instruction pointer
    pub rip: u64,
    /// Processor flags
    pub rflags: u64,
    /// Code segment selector
    pub cs: u64,
    /// Stack segment selector
    pub ss: u64,
}

const_assert_eq!(core::mem::size_of::<CpuContext>(), 20 * WORD_SIZE);

impl CpuContext {
    /// Create a context that starts executing at `entry` with stack pointer `stack_pointer`
    ///
    /// All general purpose registers are zero; flags have interrupts enabled.
    pub const fn new(entry: u64, stack_pointer: u64) -> Self {
        Self {
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rsi: 0,
            rdi: 0,
            rbp: 0,
            rsp: stack_pointer,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: entry,
            rflags: RFlags::INITIAL.bits(),
            cs: KERNEL_CODE_SELECTOR,
            ss: KERNEL_DATA_SELECTOR,
        }
    }

    /// Saved processor flags
    pub const fn flags(&self) -> RFlags {
        RFlags::from_bits_retain(self.rflags)
    }
}

/// Outcome of capturing the current register state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumption {
    /// The snapshot was just taken; the caller continues switching away
    Saved,
    /// Control came back through a restore of this snapshot
    Resumed,
}

/// Hardware context transfer
///
/// Implementations assume a single flow of control per core and are never
/// re-entered while a save or restore is in progress.
pub trait Architecture {
    /// Capture the register set of the currently executing flow into `context`
    ///
    /// Returns [`Resumption::Saved`] on the capturing pass and
    /// [`Resumption::Resumed`] when a later restore of `context` brings
    /// control back to this point.
    fn save_context(&mut self, context: &mut CpuContext) -> Resumption;

    /// Load `context` and transfer control to it with interrupts enabled
    ///
    /// Hardware implementations never return. Hosted implementations used
    /// for simulation may return once the transfer has been recorded.
    ///
    /// # Safety
    ///
    /// `context` must describe a valid instruction pointer and a stack that
    /// stays alive for as long as the resumed flow runs, and the owning
    /// process must already be marked running.
    unsafe fn restore_and_resume(&mut self, context: &CpuContext);

    /// Halt the machine after a fatal error
    fn halt(message: &str) -> !;
}
