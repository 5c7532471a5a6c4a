//! Bounded record of recent scheduler events.
//!
//! The [`EventJournal`] keeps the last `capacity` events of a session so that
//! operators and late subscribers can ask what happened to a command or a
//! fleet without replaying the session. Oldest entries are evicted first.
//!
//! # Example
//!
//! ```
//! use helmsman_broadcast::event::{AlertKind, SchedulerEvent};
//! use helmsman_broadcast::journal::EventJournal;
//!
//! let mut journal = EventJournal::with_capacity(2);
//! journal.record(SchedulerEvent::alert(1, AlertKind::WatchdogPause, "a"));
//! journal.record(SchedulerEvent::alert(2, AlertKind::WatchdogPause, "b"));
//! journal.record(SchedulerEvent::alert(3, AlertKind::WatchdogPause, "c"));
//!
//! assert_eq!(journal.len(), 2);
//! assert_eq!(journal.since(3).count(), 1);
//! ```

use std::collections::VecDeque;

use helmsman_core::command::CommandId;
use helmsman_core::entity::EntityId;

use crate::event::SchedulerEvent;

/// Default number of events retained.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct EventJournal {
    entries: VecDeque<SchedulerEvent>,
    capacity: usize,
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_JOURNAL_CAPACITY)
    }
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_JOURNAL_CAPACITY)),
            capacity,
        }
    }

    pub fn record(&mut self, event: SchedulerEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event);
    }

    pub fn extend<'a>(&mut self, events: impl IntoIterator<Item = &'a SchedulerEvent>) {
        for event in events {
            self.record(event.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &SchedulerEvent> {
        self.entries.iter()
    }

    pub fn for_command(&self, id: CommandId) -> impl Iterator<Item = &SchedulerEvent> {
        self.entries.iter().filter(move |e| e.command_id() == Some(id))
    }

    pub fn for_entity(&self, id: EntityId) -> impl Iterator<Item = &SchedulerEvent> {
        self.entries.iter().filter(move |e| e.entity_id() == Some(id))
    }

    /// Events raised at or after `tick`.
    pub fn since(&self, tick: u64) -> impl Iterator<Item = &SchedulerEvent> {
        self.entries.iter().filter(move |e| e.tick() >= tick)
    }
}
