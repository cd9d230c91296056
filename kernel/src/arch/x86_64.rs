//! x86_64 Architecture Implementation
//!
//! Register capture and privilege-level transfer for bare-metal x86_64.
//!
//! # Resume Protocol
//!
//! [`X86_64::save_context`] stores every general purpose register, the
//! flags, the stack pointer and the segment selectors, and records the end
//! of its own instruction sequence as the resume address. The rax slot of
//! the snapshot is set to one, so when [`X86_64::restore_and_resume`] later
//! loads the snapshot and executes `iretq`, control reappears at the end of
//! the save sequence with rax reading one and the save reports
//! [`Resumption::Resumed`].
//!
//! A freshly created process has no save point; its snapshot points at the
//! entry function and the top of its own stack.

#![warn(clippy::undocumented_unsafe_blocks)]

use core::arch::{asm, global_asm};
use core::mem::offset_of;

use super::{Architecture, CpuContext, RFlags, Resumption};
use crate::logging::Console;
use crate::process::entry::process_exit_entry;

/// QEMU debug console I/O port
const DEBUG_PORT: u16 = 0xE9;

// A bare `ret` from a process entry function lands here with rsp 16-byte
// aligned, one word off the alignment a called function expects.
global_asm!(
    ".pushsection .text.process_core_exit_trampoline, \"ax\"",
    ".global process_core_exit_trampoline",
    "process_core_exit_trampoline:",
    "and rsp, -16",
    "call {exit}",
    "ud2",
    ".popsection",
    exit = sym process_exit_entry,
);

unsafe extern "C" {
    fn process_core_exit_trampoline() -> !;
}

/// Address of the stack-realigning stub in front of the exit routine
pub fn exit_trampoline_address() -> usize {
    let trampoline: unsafe extern "C" fn() -> ! = process_core_exit_trampoline;
    trampoline as usize
}

/// Bare-metal x86_64 context switch primitive
#[derive(Debug, Default)]
pub struct X86_64;

impl X86_64 {
    /// Create the architecture handle
    pub const fn new() -> Self {
        Self
    }
}

impl Architecture for X86_64 {
    #[inline(never)]
    fn save_context(&mut self, context: &mut CpuContext) -> Resumption {
        let resumed: u64;

        // SAFETY: Every store targets a field of `context`, which is borrowed
        // mutably for the duration of the block. The only stack use is the
        // balanced pushfq/pop pair.
        unsafe {
            asm!(
                "mov [rdi + {off_rbx}], rbx",
                "mov [rdi + {off_rcx}], rcx",
                "mov [rdi + {off_rdx}], rdx",
                "mov [rdi + {off_rsi}], rsi",
                "mov [rdi + {off_rdi}], rdi",
                "mov [rdi + {off_rbp}], rbp",
                "mov [rdi + {off_rsp}], rsp",
                "mov [rdi + {off_r8}], r8",
                "mov [rdi + {off_r9}], r9",
                "mov [rdi + {off_r10}], r10",
                "mov [rdi + {off_r11}], r11",
                "mov [rdi + {off_r12}], r12",
                "mov [rdi + {off_r13}], r13",
                "mov [rdi + {off_r14}], r14",
                "mov [rdi + {off_r15}], r15",
                "pushfq",
                "pop qword ptr [rdi + {off_rflags}]",
                "xor eax, eax",
                "mov ax, cs",
                "mov [rdi + {off_cs}], rax",
                "mov ax, ss",
                "mov [rdi + {off_ss}], rax",
                "mov qword ptr [rdi + {off_rax}], 1",
                "lea rax, [rip + 2f]",
                "mov [rdi + {off_rip}], rax",
                "xor eax, eax",
                "2:",
                inout("rdi") core::ptr::from_mut(context) => _,
                out("rax") resumed,
                off_rax = const offset_of!(CpuContext, rax),
                off_rbx = const offset_of!(CpuContext, rbx),
                off_rcx = const offset_of!(CpuContext, rcx),
                off_rdx = const offset_of!(CpuContext, rdx),
                off_rsi = const offset_of!(CpuContext, rsi),
                off_rdi = const offset_of!(CpuContext, rdi),
                off_rbp = const offset_of!(CpuContext, rbp),
                off_rsp = const offset_of!(CpuContext, rsp),
                off_r8 = const offset_of!(CpuContext, r8),
                off_r9 = const offset_of!(CpuContext, r9),
                off_r10 = const offset_of!(CpuContext, r10),
                off_r11 = const offset_of!(CpuContext, r11),
                off_r12 = const offset_of!(CpuContext, r12),
                off_r13 = const offset_of!(CpuContext, r13),
                off_r14 = const offset_of!(CpuContext, r14),
                off_r15 = const offset_of!(CpuContext, r15),
                off_rip = const offset_of!(CpuContext, rip),
                off_rflags = const offset_of!(CpuContext, rflags),
                off_cs = const offset_of!(CpuContext, cs),
                off_ss = const offset_of!(CpuContext, ss),
            );
        }

        if resumed == 0 {
            Resumption::Saved
        } else {
            Resumption::Resumed
        }
    }

    unsafe fn restore_and_resume(&mut self, context: &CpuContext) {
        // SAFETY: The caller guarantees `context` holds a valid instruction
        // pointer, stack and selectors. The iretq frame is built on the
        // current stack, which is abandoned once the transfer happens.
        unsafe {
            asm!(
                "push qword ptr [rdi + {off_ss}]",
                "push qword ptr [rdi + {off_rsp}]",
                "push qword ptr [rdi + {off_rflags}]",
                "or qword ptr [rsp], {interrupt_enable}",
                "push qword ptr [rdi + {off_cs}]",
                "push qword ptr [rdi + {off_rip}]",
                "mov rax, [rdi + {off_rax}]",
                "mov rbx, [rdi + {off_rbx}]",
                "mov rcx, [rdi + {off_rcx}]",
                "mov rdx, [rdi + {off_rdx}]",
                "mov rsi, [rdi + {off_rsi}]",
                "mov rbp, [rdi + {off_rbp}]",
                "mov r8, [rdi + {off_r8}]",
                "mov r9, [rdi + {off_r9}]",
                "mov r10, [rdi + {off_r10}]",
                "mov r11, [rdi + {off_r11}]",
                "mov r12, [rdi + {off_r12}]",
                "mov r13, [rdi + {off_r13}]",
                "mov r14, [rdi + {off_r14}]",
                "mov r15, [rdi + {off_r15}]",
                "mov rdi, [rdi + {off_rdi}]",
                "iretq",
                in("rdi") core::ptr::from_ref(context),
                interrupt_enable = const RFlags::INTERRUPT_ENABLE.bits(),
                off_rax = const offset_of!(CpuContext, rax),
                off_rbx = const offset_of!(CpuContext, rbx),
                off_rcx = const offset_of!(CpuContext, rcx),
                off_rdx = const offset_of!(CpuContext, rdx),
                off_rsi = const offset_of!(CpuContext, rsi),
                off_rdi = const offset_of!(CpuContext, rdi),
                off_rbp = const offset_of!(CpuContext, rbp),
                off_rsp = const offset_of!(CpuContext, rsp),
                off_r8 = const offset_of!(CpuContext, r8),
                off_r9 = const offset_of!(CpuContext, r9),
                off_r10 = const offset_of!(CpuContext, r10),
                off_r11 = const offset_of!(CpuContext, r11),
                off_r12 = const offset_of!(CpuContext, r12),
                off_r13 = const offset_of!(CpuContext, r13),
                off_r14 = const offset_of!(CpuContext, r14),
                off_r15 = const offset_of!(CpuContext, r15),
                off_rip = const offset_of!(CpuContext, rip),
                off_rflags = const offset_of!(CpuContext, rflags),
                off_cs = const offset_of!(CpuContext, cs),
                off_ss = const offset_of!(CpuContext, ss),
                options(noreturn),
            );
        }
    }

    fn halt(message: &str) -> ! {
        log::error!("KERNEL PANIC: {message}");
        loop {
            // SAFETY: Disabling interrupts and halting has no memory effects.
            unsafe {
                asm!("cli", "hlt", options(nomem, nostack));
            }
        }
    }
}

/// Diagnostic console on the QEMU debug port (0xE9)
#[derive(Debug, Default)]
pub struct DebugConsole;

impl DebugConsole {
    /// Create a debug console handle
    pub const fn new() -> Self {
        Self
    }

    fn write_byte(byte: u8) {
        // SAFETY: Port 0xE9 is a write-only debug sink with no side effects
        // on kernel memory.
        unsafe {
            asm!(
                "out dx, al",
                in("dx") DEBUG_PORT,
                in("al") byte,
                options(nomem, nostack, preserves_flags),
            );
        }
    }
}

impl Console for DebugConsole {
    fn write_str(&self, text: &str) {
        for byte in text.bytes() {
            Self::write_byte(byte);
        }
    }
}
