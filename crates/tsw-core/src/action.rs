//! Switch protocol actions
//!
//! A switch from one input to another is a sequence of small steps
//! (start the new input, wait for it, move the "current" marker, stop the
//! old input, ...). Steps are queued as [`Action`]s and executed in order
//! by the coordinator. Wait steps stay at the head of the queue until the
//! matching event is found in the [`EventSet`].

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of a queued action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Nothing to do. Also marks the end of an action group.
    None,
    /// Start an input
    Start,
    /// Wait for start completion of an input
    WaitStarted,
    /// Wait for packets on an input
    WaitInput,
    /// Stop an input
    Stop,
    /// Wait for stop completion of an input
    WaitStopped,
    /// Tell an input whether it is the current one
    NotifyCurrent,
    /// Set the current input index
    SetCurrent,
}

impl ActionKind {
    /// Name used in debug messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Start => "START",
            Self::WaitStarted => "WAIT_STARTED",
            Self::WaitInput => "WAIT_INPUT",
            Self::Stop => "STOP",
            Self::WaitStopped => "WAIT_STOPPED",
            Self::NotifyCurrent => "NOTIF_CURRENT",
            Self::SetCurrent => "SET_CURRENT",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of the switch protocol
///
/// Identity is `(kind, index)`. The flag is a payload whose meaning
/// depends on the kind (start as current, success, is current) and is
/// ignored by `==` and hashing, so an event matches its wait action
/// whatever the payload.
#[derive(Debug, Clone, Copy)]
pub struct Action {
    pub kind: ActionKind,
    pub index: usize,
    pub flag: bool,
}

impl Action {
    /// Create an action
    pub fn new(kind: ActionKind, index: usize, flag: bool) -> Self {
        Self { kind, index, flag }
    }

    /// Create an action without payload
    pub fn plain(kind: ActionKind, index: usize) -> Self {
        Self::new(kind, index, false)
    }

    /// The empty action, used as group barrier
    pub fn none() -> Self {
        Self::plain(ActionKind::None, 0)
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.index == other.index
    }
}

impl Eq for Action {}

impl Hash for Action {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.kind, self.index, self.flag)
    }
}

/// FIFO of pending actions
#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: VecDeque<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push_back(action);
    }

    pub fn front(&self) -> Option<&Action> {
        self.actions.front()
    }

    pub fn pop(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }

    /// Drop the head action group, up to and including its NONE barrier.
    ///
    /// Returns the number of discarded actions.
    pub fn discard_group(&mut self) -> usize {
        let mut discarded = 0;
        while let Some(action) = self.actions.pop_front() {
            discarded += 1;
            if action.kind == ActionKind::None {
                break;
            }
        }
        discarded
    }

    /// Target of the last queued SET_CURRENT, if any
    pub fn last_target(&self) -> Option<usize> {
        self.actions
            .iter()
            .rev()
            .find(|a| a.kind == ActionKind::SetCurrent)
            .map(|a| a.index)
    }
}

impl fmt::Display for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, action) in self.actions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", action)?;
        }
        f.write_str("]")
    }
}

/// Events that fired but were not consumed by a wait action yet
#[derive(Debug, Default)]
pub struct EventSet {
    events: HashSet<Action>,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event. A pending event with the same identity is
    /// replaced so the newest payload wins.
    pub fn signal(&mut self, event: Action) {
        self.events.replace(event);
    }

    /// Consume the event matching `wait`, returning it with its payload
    pub fn take(&mut self, wait: &Action) -> Option<Action> {
        self.events.take(wait)
    }

    /// Drop a pending event without consuming it through a wait
    pub fn forget(&mut self, kind: ActionKind, index: usize) {
        self.events.remove(&Action::plain(kind, index));
    }

    pub fn contains(&self, kind: ActionKind, index: usize) -> bool {
        self.events.contains(&Action::plain(kind, index))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
