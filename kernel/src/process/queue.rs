//! State Queues
//!
//! Ready, blocked and zombie queues as doubly-linked lists threaded through
//! the process records. Links are slot handles into the registry instead of
//! pointers, so a stale link can at worst name an empty or reused slot; it
//! can never dangle.
//!
//! Insertion is always at the head. `New`, `Running`, `Suspended` and `Dead`
//! processes are members of no queue.

#![warn(clippy::undocumented_unsafe_blocks)]

use super::ProcessState;
use super::table::Slot;

/// Number of state queues
pub const QUEUE_COUNT: usize = 3;

/// The queue a process belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Processes eligible for dispatch
    Ready,
    /// Processes waiting on an external condition
    Blocked,
    /// Terminated processes awaiting reaping
    Zombie,
}

impl QueueKind {
    /// All queues, in index order
    pub const ALL: [QueueKind; QUEUE_COUNT] = [Self::Ready, Self::Blocked, Self::Zombie];

    /// Queue implied by a lifecycle state, if any
    pub const fn for_state(state: ProcessState) -> Option<Self> {
        match state {
            ProcessState::Ready => Some(Self::Ready),
            ProcessState::Blocked => Some(Self::Blocked),
            ProcessState::Zombie => Some(Self::Zombie),
            ProcessState::New
            | ProcessState::Running
            | ProcessState::Suspended
            | ProcessState::Dead => None,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Ready => 0,
            Self::Blocked => 1,
            Self::Zombie => 2,
        }
    }
}

/// Intrusive queue links stored in each process record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueLinks {
    /// Previous member, `None` at the head
    pub prev: Option<Slot>,
    /// Next member, `None` at the tail
    pub next: Option<Slot>,
}

/// Storage that holds the links of every queued record
pub trait LinkArena {
    /// Links of the record in `slot`, if the slot is occupied
    fn links(&self, slot: Slot) -> Option<&QueueLinks>;

    /// Mutable links of the record in `slot`, if the slot is occupied
    fn links_mut(&mut self, slot: Slot) -> Option<&mut QueueLinks>;
}

/// Heads of the three state queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateQueues {
    heads: [Option<Slot>; QUEUE_COUNT],
}

impl StateQueues {
    /// Create three empty queues
    pub const fn new() -> Self {
        Self {
            heads: [None; QUEUE_COUNT],
        }
    }

    /// First member of a queue
    pub fn head(&self, kind: QueueKind) -> Option<Slot> {
        self.heads.get(kind.index()).copied().flatten()
    }

    /// Check if a queue has no members
    pub fn is_empty(&self, kind: QueueKind) -> bool {
        self.head(kind).is_none()
    }

    /// Insert `slot` into the queue implied by `state`; no-op for unqueued states
    pub fn add_to_queue<A: LinkArena>(&mut self, arena: &mut A, slot: Slot, state: ProcessState) {
        if let Some(kind) = QueueKind::for_state(state) {
            self.push_front(arena, slot, kind);
        }
    }

    /// Unlink `slot` from the queue implied by `state`; no-op for unqueued states
    pub fn remove_from_queue<A: LinkArena>(
        &mut self,
        arena: &mut A,
        slot: Slot,
        state: ProcessState,
    ) {
        if let Some(kind) = QueueKind::for_state(state) {
            self.unlink(arena, slot, kind);
        }
    }

    /// Insert `slot` at the head of `kind`
    pub fn push_front<A: LinkArena>(&mut self, arena: &mut A, slot: Slot, kind: QueueKind) {
        let old_head = self.head(kind);

        let Some(links) = arena.links_mut(slot) else {
            return;
        };
        links.prev = None;
        links.next = old_head;

        if let Some(old_head) = old_head {
            if let Some(head_links) = arena.links_mut(old_head) {
                head_links.prev = Some(slot);
            }
        }
        self.set_head(kind, Some(slot));
    }

    /// Remove `slot` from `kind`, re-pointing its neighbours and the head
    pub fn unlink<A: LinkArena>(&mut self, arena: &mut A, slot: Slot, kind: QueueKind) {
        let Some(links) = arena.links_mut(slot) else {
            return;
        };
        let QueueLinks { prev, next } = core::mem::take(links);

        if self.head(kind) == Some(slot) {
            self.set_head(kind, next);
        } else if let Some(prev) = prev {
            if let Some(prev_links) = arena.links_mut(prev) {
                prev_links.next = next;
            }
        }

        if let Some(next) = next {
            if let Some(next_links) = arena.links_mut(next) {
                next_links.prev = prev;
            }
        }
    }

    /// Detach a whole queue at once, returning its former head
    ///
    /// The members keep their links so the caller can still walk the chain.
    pub fn take(&mut self, kind: QueueKind) -> Option<Slot> {
        let head = self.head(kind);
        self.set_head(kind, None);
        head
    }

    /// Iterate over the members of `kind` from head to tail
    pub fn iter<'a, A: LinkArena>(&self, arena: &'a A, kind: QueueKind) -> QueueIter<'a, A> {
        QueueIter {
            arena,
            cursor: self.head(kind),
        }
    }

    /// Number of members in `kind`
    pub fn len<A: LinkArena>(&self, arena: &A, kind: QueueKind) -> usize {
        self.iter(arena, kind).count()
    }

    /// Check if `slot` is a member of `kind`
    pub fn contains<A: LinkArena>(&self, arena: &A, kind: QueueKind, slot: Slot) -> bool {
        self.iter(arena, kind).any(|member| member == slot)
    }

    fn set_head(&mut self, kind: QueueKind, head: Option<Slot>) {
        if let Some(entry) = self.heads.get_mut(kind.index()) {
            *entry = head;
        }
    }
}

/// Iterator over one state queue
pub struct QueueIter<'a, A> {
    arena: &'a A,
    cursor: Option<Slot>,
}

impl<A: LinkArena> Iterator for QueueIter<'_, A> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        let current = self.cursor?;
        self.cursor = self.arena.links(current).and_then(|links| links.next);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Links([QueueLinks; 8]);

    impl LinkArena for Links {
        fn links(&self, slot: Slot) -> Option<&QueueLinks> {
            self.0.get(slot.index())
        }

        fn links_mut(&mut self, slot: Slot) -> Option<&mut QueueLinks> {
            self.0.get_mut(slot.index())
        }
    }

    fn arena() -> Links {
        Links([QueueLinks::default(); 8])
    }

    fn members(queues: &StateQueues, arena: &Links, kind: QueueKind) -> Vec<usize> {
        queues.iter(arena, kind).map(Slot::index).collect()
    }

    #[test]
    fn insertion_is_at_the_head() {
        let mut arena = arena();
        let mut queues = StateQueues::new();

        for index in 0..3 {
            queues.push_front(&mut arena, Slot::new(index), QueueKind::Ready);
        }

        assert_eq!(members(&queues, &arena, QueueKind::Ready), vec![2, 1, 0]);
        assert_eq!(arena.0[2].prev, None);
        assert_eq!(arena.0[1].prev, Some(Slot::new(2)));
    }

    #[test]
    fn unlink_head_middle_and_tail() {
        let mut arena = arena();
        let mut queues = StateQueues::new();
        for index in 0..5 {
            queues.push_front(&mut arena, Slot::new(index), QueueKind::Blocked);
        }

        queues.unlink(&mut arena, Slot::new(4), QueueKind::Blocked);
        assert_eq!(members(&queues, &arena, QueueKind::Blocked), vec![3, 2, 1, 0]);

        queues.unlink(&mut arena, Slot::new(2), QueueKind::Blocked);
        assert_eq!(members(&queues, &arena, QueueKind::Blocked), vec![3, 1, 0]);
        assert_eq!(arena.0[1].prev, Some(Slot::new(3)));

        queues.unlink(&mut arena, Slot::new(0), QueueKind::Blocked);
        assert_eq!(members(&queues, &arena, QueueKind::Blocked), vec![3, 1]);
        assert_eq!(arena.0[1].next, None);

        for index in [0, 2, 4] {
            assert_eq!(arena.0[index], QueueLinks::default());
        }
    }

    #[test]
    fn queues_are_independent() {
        let mut arena = arena();
        let mut queues = StateQueues::new();

        queues.add_to_queue(&mut arena, Slot::new(0), ProcessState::Ready);
        queues.add_to_queue(&mut arena, Slot::new(1), ProcessState::Zombie);
        queues.add_to_queue(&mut arena, Slot::new(2), ProcessState::Running);

        assert_eq!(members(&queues, &arena, QueueKind::Ready), vec![0]);
        assert_eq!(members(&queues, &arena, QueueKind::Zombie), vec![1]);
        assert!(queues.is_empty(QueueKind::Blocked));
        assert!(!QueueKind::ALL.iter().any(|&kind| queues.contains(&arena, kind, Slot::new(2))));
    }

    #[test]
    fn removal_for_unqueued_state_is_a_noop() {
        let mut arena = arena();
        let mut queues = StateQueues::new();
        queues.push_front(&mut arena, Slot::new(0), QueueKind::Ready);
        queues.push_front(&mut arena, Slot::new(1), QueueKind::Ready);

        queues.remove_from_queue(&mut arena, Slot::new(1), ProcessState::New);
        queues.remove_from_queue(&mut arena, Slot::new(1), ProcessState::Dead);

        assert_eq!(members(&queues, &arena, QueueKind::Ready), vec![1, 0]);
    }

    #[test]
    fn take_detaches_the_whole_chain() {
        let mut arena = arena();
        let mut queues = StateQueues::new();
        queues.push_front(&mut arena, Slot::new(3), QueueKind::Zombie);
        queues.push_front(&mut arena, Slot::new(5), QueueKind::Zombie);

        let head = queues.take(QueueKind::Zombie);

        assert_eq!(head, Some(Slot::new(5)));
        assert!(queues.is_empty(QueueKind::Zombie));
        assert_eq!(arena.0[5].next, Some(Slot::new(3)));
    }
}
