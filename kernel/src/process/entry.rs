//! Process-Context Entry Points
//!
//! Two functions let code running on a process's own stack reach the
//! scheduler without holding the manager:
//!
//! - [`process_exit_entry`] is installed as the return address of every new
//!   process. A process reaches it by returning from its entry function, or
//!   by jumping to it explicitly when done. It marks the process a zombie and
//!   switches away for good.
//! - [`scheduler_yield`] gives up the caller's turn. Processes, the idle
//!   process and trap handlers call it to reschedule cooperatively.
//!
//! Neither can receive the manager as an argument, so the boot code
//! registers it once with [`register`] before the first dispatch.

#![warn(clippy::undocumented_unsafe_blocks)]

use core::cell::UnsafeCell;
use core::ptr::NonNull;

use log::{error, warn};

use crate::arch::Architecture;
use crate::memory::RegionAllocator;

use super::ProcessManager;

/// Scheduler operations reachable from process context
pub trait SchedulerPath {
    /// Retire the current process and switch away from it
    fn retire_current(&mut self);

    /// Give up the current process's turn
    fn yield_current(&mut self);
}

struct PathCell(UnsafeCell<Option<NonNull<dyn SchedulerPath>>>);

// SAFETY: The cell is written once during boot and read only from the entry
// points; the kernel runs a single flow of control per core.
unsafe impl Sync for PathCell {}

static SCHEDULER_PATH: PathCell = PathCell(UnsafeCell::new(None));

/// Register the manager the entry points hand control to
///
/// # Safety
///
/// - Must be called during boot, before the first process is dispatched
/// - `path` must stay valid for the lifetime of the kernel
/// - No other flow of control may run concurrently
pub unsafe fn register(path: NonNull<dyn SchedulerPath>) {
    // SAFETY: The caller guarantees exclusive access during boot.
    unsafe { *SCHEDULER_PATH.0.get() = Some(path) };
}

fn registered() -> Option<NonNull<dyn SchedulerPath>> {
    // SAFETY: Written once during boot by `register`; no writer runs now.
    unsafe { *SCHEDULER_PATH.0.get() }
}

/// Address written as the return address of every new process
pub fn exit_entry_address() -> usize {
    #[cfg(target_arch = "x86_64")]
    {
        crate::arch::x86_64::exit_trampoline_address()
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let entry: extern "C" fn() -> ! = process_exit_entry;
        entry as usize
    }
}

/// Exit routine executed in the context of a finishing process
pub extern "C" fn process_exit_entry() -> ! {
    retire_registered();
    // Only reached if nothing else could be dispatched.
    park()
}

/// Give up the current process's turn
///
/// Returns immediately when no scheduler is registered yet.
pub extern "C" fn scheduler_yield() {
    match registered() {
        // SAFETY: `register` requires the pointee to outlive the kernel, and
        // the caller is the only flow of control on this core.
        Some(mut path) => unsafe { path.as_mut() }.yield_current(),
        None => warn!("Yield before a scheduler was registered"),
    }
}

fn retire_registered() {
    match registered() {
        // SAFETY: As in `scheduler_yield`.
        Some(mut path) => unsafe { path.as_mut() }.retire_current(),
        None => error!("Process exited before a scheduler was registered"),
    }
}

/// Spin forever doing nothing
pub(crate) fn park() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

impl<A, M> SchedulerPath for ProcessManager<A, M>
where
    A: RegionAllocator,
    M: Architecture,
{
    fn retire_current(&mut self) {
        if let Err(err) = self.terminate_current() {
            error!("Exit without a current process: {err}");
        }
    }

    fn yield_current(&mut self) {
        self.yield_now();
    }
}
