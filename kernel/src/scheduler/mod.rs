//! Scheduler - Round Robin Selection & Context Switching
//!
//! This module implements process dispatch:
//! - Round-robin selection over the ready queue
//! - Idle-process fallback when nothing is ready
//! - Context switching through the architecture primitive
//! - Cooperative yielding and the main scheduling loop
//!
//! ## Selection
//!
//! The scheduler remembers the last process it chose. Each selection starts
//! at the ready-queue member after that process and scans forward, wrapping
//! once to the head. Dispatching a process takes it out of the ready queue,
//! so the successor it had when chosen is remembered too and used as the
//! starting point while the last choice is not queued. Priority does not
//! influence the order.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut manager = ProcessManager::init(allocator, X86_64::new(), ProcessConfig::default());
//! manager.create("shell", 1, shell_main as usize)?;
//! manager.scheduler_loop();
//! ```

#![warn(clippy::undocumented_unsafe_blocks)]

use log::{info, warn};

use crate::arch::{Architecture, Resumption};
use crate::memory::RegionAllocator;
use crate::process::entry::scheduler_yield;
use crate::process::queue::{LinkArena, QueueKind, StateQueues};
use crate::process::{MAX_PROCESSES, ProcessId, ProcessManager, ProcessState, ProcessTable, Slot};

/// Entry point of the idle process
pub extern "C" fn idle_main() -> ! {
    loop {
        scheduler_yield();
        core::hint::spin_loop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Choice {
    slot: Slot,
    pid: ProcessId,
    successor: Option<Slot>,
}

/// Round-robin selection state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundRobin {
    last: Option<Choice>,
}

impl RoundRobin {
    /// Create a scheduler that has chosen nothing yet
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// The process chosen by the most recent round-robin selection
    pub fn last(&self) -> Option<Slot> {
        self.last.map(|choice| choice.slot)
    }

    /// Pick the next ready process, or the process named `idle_name`
    pub fn select(&mut self, table: &ProcessTable, queues: &StateQueues, idle_name: &str) -> Option<Slot> {
        let Some(head) = queues.head(QueueKind::Ready) else {
            return table.find_by_name(idle_name);
        };

        let start = self.resume_point(table).unwrap_or(Some(head));
        let chosen = Self::scan(table, start).or_else(|| Self::scan(table, Some(head)));

        let Some(slot) = chosen else {
            return table.find_by_name(idle_name);
        };
        if let Some(process) = table.get(slot) {
            self.last = Some(Choice {
                slot,
                pid: process.id,
                successor: table.links(slot).and_then(|links| links.next),
            });
        }

        #[cfg(feature = "debug-scheduler")]
        log::trace!("[sched] selected slot {}", slot.index());

        Some(slot)
    }

    /// Where the scan starts; `None` when there is no previous choice
    fn resume_point(&self, table: &ProcessTable) -> Option<Option<Slot>> {
        let last = self.last?;
        let still_queued = table
            .get(last.slot)
            .is_some_and(|process| process.id == last.pid && process.state() == ProcessState::Ready);

        if still_queued {
            return Some(table.links(last.slot).and_then(|links| links.next));
        }
        match last.successor {
            Some(successor) if table.state(successor) == Some(ProcessState::Ready) => Some(Some(successor)),
            _ => None,
        }
    }

    /// First `Ready` entry from `from` to the tail
    fn scan(table: &ProcessTable, from: Option<Slot>) -> Option<Slot> {
        let mut cursor = from;
        for _ in 0..MAX_PROCESSES {
            let slot = cursor?;
            let process = table.get(slot)?;
            if process.state() == ProcessState::Ready {
                return Some(slot);
            }
            cursor = process.links.next;
        }
        None
    }
}

impl<A, M> ProcessManager<A, M>
where
    A: RegionAllocator,
    M: Architecture,
{
    /// Choose the next process to run
    pub fn select_next(&mut self) -> Option<Slot> {
        self.scheduler.select(&self.table, &self.queues, self.config.idle_name)
    }

    /// Save `from`, dispatch `to`, and transfer control to it
    ///
    /// A `from` that is no longer running (for example a zombie yielding
    /// away) keeps its state. A missing `to` is a no-op.
    pub fn switch(&mut self, from: Option<Slot>, to: Option<Slot>) {
        let Some(to) = to else {
            return;
        };

        if let Some(from) = from {
            if let Some(process) = self.table.get_mut(from) {
                if self.arch.save_context(&mut process.context) == Resumption::Resumed {
                    return;
                }
                if process.state() == ProcessState::Running {
                    if let Err(err) = self.set_state(from, ProcessState::Ready) {
                        warn!("Could not requeue slot {}: {err}", from.index());
                    }
                }
            }
        }

        if self.set_state(to, ProcessState::Running).is_err() {
            return;
        }
        self.current = Some(to);

        let Some(process) = self.table.get_mut(to) else {
            return;
        };
        process.stats.schedule_count += 1;
        let context = process.context;

        // SAFETY: `to` was built by `initial_context` or captured by
        // `save_context`, its stack is owned by the process until reaping,
        // and it is now marked running.
        unsafe { self.arch.restore_and_resume(&context) };
    }

    /// Give up the current turn voluntarily
    pub fn yield_now(&mut self) {
        let next = self.select_next();
        if next.is_some() && next != self.current {
            self.switch(self.current, next);
        }
    }

    /// One iteration of the scheduling loop: dispatch, then maintenance
    pub fn run_once(&mut self) {
        let next = self.select_next();
        if next.is_some() && next != self.current {
            self.switch(self.current, next);
        }
        self.maintenance();
    }

    /// Main scheduling loop
    pub fn scheduler_loop(&mut self) -> ! {
        info!("Starting scheduler loop");
        loop {
            self.run_once();
        }
    }

    fn maintenance(&mut self) {
        self.reap_zombies();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingArch, TestManager, manager};
    use proptest::prelude::*;

    const ENTRY: usize = 0x40_0000;

    fn spawn(manager: &mut TestManager, names: &[&str]) -> Vec<Slot> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| manager.create(name, index as u32 + 1, ENTRY).unwrap())
            .collect()
    }

    #[test]
    fn consecutive_selections_cycle_through_ready_queue() {
        let (_arena, mut manager) = manager();
        let mut expected = spawn(&mut manager, &["a", "b", "c"]);
        expected.push(manager.find("idle").unwrap());

        let first: Vec<_> = (0..4).map(|_| manager.select_next().unwrap()).collect();
        let second: Vec<_> = (0..4).map(|_| manager.select_next().unwrap()).collect();

        let mut visited = first.clone();
        visited.sort();
        expected.sort();
        assert_eq!(visited, expected);
        assert_eq!(first, second);
    }

    #[test]
    fn selection_order_follows_queue_order() {
        let (_arena, mut manager) = manager();
        let slots = spawn(&mut manager, &["a", "b", "c"]);
        let idle = manager.find("idle").unwrap();

        let order: Vec<_> = (0..4).map(|_| manager.select_next().unwrap()).collect();

        assert_eq!(order, [slots[2], slots[1], slots[0], idle]);
    }

    #[test]
    fn empty_ready_queue_falls_back_to_idle() {
        let (_arena, mut manager) = manager();
        let idle = manager.find("idle").unwrap();
        let worker = manager.create("worker", 1, ENTRY).unwrap();
        manager.select_next();
        let last = manager.scheduler.last();
        manager.set_state(worker, ProcessState::Blocked).unwrap();
        manager.set_state(idle, ProcessState::Running).unwrap();

        for _ in 0..3 {
            assert_eq!(manager.select_next(), Some(idle));
        }
        assert_eq!(manager.scheduler.last(), last);
    }

    #[test]
    fn switch_saves_requeues_and_resumes() {
        let (_arena, mut manager) = manager();
        let slots = spawn(&mut manager, &["a", "b"]);

        manager.switch(None, Some(slots[0]));
        manager.switch(Some(slots[0]), Some(slots[1]));

        assert_eq!(manager.current(), Some(slots[1]));
        assert_eq!(manager.process(slots[0]).unwrap().state(), ProcessState::Ready);
        assert_eq!(manager.process(slots[1]).unwrap().state(), ProcessState::Running);
        assert!(manager.queues().contains(manager.table(), QueueKind::Ready, slots[0]));
        assert!(!manager.queues().contains(manager.table(), QueueKind::Ready, slots[1]));

        let arch: &RecordingArch = manager.arch();
        assert_eq!(arch.saves, 1);
        assert_eq!(arch.restored.len(), 2);
        assert_eq!(arch.restored[1], manager.process(slots[1]).unwrap().context);
        assert_eq!(manager.process(slots[1]).unwrap().stats.schedule_count, 1);
    }

    #[test]
    fn switch_to_nothing_is_a_noop() {
        let (_arena, mut manager) = manager();
        let worker = manager.create("worker", 1, ENTRY).unwrap();
        manager.switch(None, Some(worker));

        manager.switch(Some(worker), None);

        assert_eq!(manager.current(), Some(worker));
        assert_eq!(manager.arch().saves, 0);
        assert_eq!(manager.arch().restored.len(), 1);
    }

    #[test]
    fn resumed_save_returns_without_redispatch() {
        let (_arena, mut manager) = manager();
        let slots = spawn(&mut manager, &["a", "b"]);
        manager.switch(None, Some(slots[0]));
        manager.arch.resume_on_save = true;

        manager.switch(Some(slots[0]), Some(slots[1]));

        assert_eq!(manager.current(), Some(slots[0]));
        assert_eq!(manager.process(slots[0]).unwrap().state(), ProcessState::Running);
        assert_eq!(manager.process(slots[1]).unwrap().state(), ProcessState::Ready);
        assert_eq!(manager.arch().restored.len(), 1);
    }

    // A process switched out goes back to the head of the ready queue, so
    // dispatch order is not a strict rotation; every process is still reached.
    #[test]
    fn run_once_reaches_every_process_without_immediate_repeats() {
        let (_arena, mut manager) = manager();
        let mut expected = spawn(&mut manager, &["a", "b", "c"]);
        expected.push(manager.find("idle").unwrap());

        let mut dispatched = Vec::new();
        for _ in 0..8 {
            manager.run_once();
            dispatched.push(manager.current().unwrap());
        }

        for slot in &expected {
            assert!(dispatched.contains(slot), "slot {slot:?} never dispatched");
        }
        for pair in dispatched.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn run_once_reaps_zombies() {
        let (_arena, mut manager) = manager();
        let slots = spawn(&mut manager, &["a", "b"]);
        manager.set_state(slots[0], ProcessState::Zombie).unwrap();

        manager.run_once();

        assert_eq!(manager.count(), 2);
        assert_eq!(manager.find("a"), None);
        assert!(manager.queues().is_empty(QueueKind::Zombie));
    }

    #[test]
    fn yield_with_single_runnable_process_stays_put() {
        let (_arena, mut manager) = manager();
        let idle = manager.find("idle").unwrap();
        manager.switch(None, Some(idle));

        manager.yield_now();

        assert_eq!(manager.current(), Some(idle));
        assert_eq!(manager.arch().restored.len(), 1);
    }

    #[test]
    fn yield_rotates_to_another_ready_process() {
        let (_arena, mut manager) = manager();
        let worker = manager.create("worker", 1, ENTRY).unwrap();
        let idle = manager.find("idle").unwrap();
        manager.switch(None, Some(worker));

        manager.yield_now();

        assert_eq!(manager.current(), Some(idle));
        assert_eq!(manager.process(worker).unwrap().state(), ProcessState::Ready);
    }

    proptest! {
        #[test]
        fn selection_visits_each_ready_process_once_per_cycle(count in 1usize..20, offset in 0usize..20) {
            let (_arena, mut manager) = manager();
            for index in 0..count {
                manager.create("worker", index as u32, ENTRY).unwrap();
            }
            let ready = manager.queues().len(manager.table(), QueueKind::Ready);
            for _ in 0..offset {
                manager.select_next();
            }

            let mut cycle: Vec<_> = (0..ready).map(|_| manager.select_next().unwrap()).collect();
            cycle.sort();
            cycle.dedup();

            prop_assert_eq!(cycle.len(), ready);
        }

        #[test]
        fn every_transition_leaves_exactly_one_matching_queue(
            transitions in proptest::collection::vec((0usize..4, 0usize..7), 1..40)
        ) {
            const STATES: [ProcessState; 7] = [
                ProcessState::New,
                ProcessState::Ready,
                ProcessState::Running,
                ProcessState::Blocked,
                ProcessState::Suspended,
                ProcessState::Zombie,
                ProcessState::Dead,
            ];
            let (_arena, mut manager) = manager();
            let slots = spawn(&mut manager, &["a", "b", "c", "d"]);

            for (target, state) in transitions {
                manager.set_state(slots[target], STATES[state]).unwrap();

                for &slot in &slots {
                    let state = manager.process(slot).unwrap().state();
                    for kind in QueueKind::ALL {
                        let member = manager.queues().contains(manager.table(), kind, slot);
                        prop_assert_eq!(member, QueueKind::for_state(state) == Some(kind));
                    }
                }
            }
        }
    }
}
