//! Process Registry
//!
//! Fixed-capacity table of process records. Records live inline in their
//! slot from creation until reaping, and a [`Slot`] is the stable handle the
//! queues and the scheduler use to refer to them.

#![warn(clippy::undocumented_unsafe_blocks)]

use core::fmt;

use heapless::Vec;

use super::queue::{LinkArena, QueueLinks};
use super::{MAX_PROCESSES, Process, ProcessError, ProcessId, ProcessResult, ProcessState, ProcessSummary};

/// Handle to a registry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(usize);

impl Slot {
    /// Create a handle for slot `index`
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw slot index
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Process table
pub struct ProcessTable {
    slots: [Option<Process>; MAX_PROCESSES],
    count: usize,
    /// `None` once every identifier has been issued
    next_pid: Option<u32>,
}

impl ProcessTable {
    /// Create an empty table; the first identifier issued is [`ProcessId::FIRST`]
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_PROCESSES],
            count: 0,
            next_pid: Some(ProcessId::FIRST.as_u32()),
        }
    }

    /// Number of live processes
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Check if no process exists
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Check if every slot is occupied
    pub const fn is_full(&self) -> bool {
        self.count >= MAX_PROCESSES
    }

    /// Issue the next process identifier
    ///
    /// Identifiers are never reissued; after `u32::MAX` every call fails with
    /// [`ProcessError::PidExhausted`].
    pub fn allocate_pid(&mut self) -> ProcessResult<ProcessId> {
        let raw = self.next_pid.ok_or(ProcessError::PidExhausted)?;
        self.next_pid = raw.checked_add(1);
        Ok(ProcessId::new(raw))
    }

    /// Make `next` the next identifier issued
    #[cfg(test)]
    pub(crate) fn skip_pids_to(&mut self, next: u32) {
        self.next_pid = Some(next);
    }

    /// Place `process` in the first free slot
    pub fn insert(&mut self, process: Process) -> ProcessResult<Slot> {
        let (index, entry) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, entry)| entry.is_none())
            .ok_or(ProcessError::TableFull)?;
        *entry = Some(process);
        self.count += 1;
        Ok(Slot::new(index))
    }

    /// Clear a slot, returning the record it held
    pub fn remove(&mut self, slot: Slot) -> Option<Process> {
        let process = self.slots.get_mut(slot.index())?.take()?;
        self.count -= 1;
        Some(process)
    }

    /// Record in `slot`
    pub fn get(&self, slot: Slot) -> Option<&Process> {
        self.slots.get(slot.index())?.as_ref()
    }

    /// Mutable record in `slot`
    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Process> {
        self.slots.get_mut(slot.index())?.as_mut()
    }

    /// State of the record in `slot`
    pub fn state(&self, slot: Slot) -> Option<ProcessState> {
        self.get(slot).map(Process::state)
    }

    /// First process whose name equals `name`
    pub fn find_by_name(&self, name: &str) -> Option<Slot> {
        self.iter()
            .find(|(_, process)| process.name.as_str() == name)
            .map(|(slot, _)| slot)
    }

    /// Process with identifier `pid`
    pub fn find_by_pid(&self, pid: ProcessId) -> Option<Slot> {
        self.iter()
            .find(|(_, process)| process.id == pid)
            .map(|(slot, _)| slot)
    }

    /// Occupied slots in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Process)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|process| (Slot::new(index), process)))
    }

    /// Summaries of every live process in slot order
    pub fn list(&self) -> Vec<ProcessSummary, MAX_PROCESSES> {
        // The table never holds more than MAX_PROCESSES records, so no push fails.
        self.iter()
            .map(|(_, process)| process.summary())
            .collect()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Processes ({}) ===", self.count)?;
        write!(f, "PID   State     Pri Name")?;
        for (_, process) in self.iter() {
            write!(
                f,
                "\n{:<5} {:<9} {:<3} {}",
                process.id, process.state, process.priority, process.name
            )?;
        }
        Ok(())
    }
}

impl LinkArena for ProcessTable {
    fn links(&self, slot: Slot) -> Option<&QueueLinks> {
        self.get(slot).map(|process| &process.links)
    }

    fn links_mut(&mut self, slot: Slot) -> Option<&mut QueueLinks> {
        self.get_mut(slot).map(|process| &mut process.links)
    }
}
