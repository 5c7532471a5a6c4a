//! Per-fleet ordered queue of pending commands.
//!
//! Pending commands are kept in a `BTreeMap` keyed by
//! `(execute_tick, priority desc, issue_tick, seq)`: on equal execute ticks
//! the higher priority runs first, then the earlier issue, then insertion
//! order. The key is fixed at insertion, so a command's execute tick is stable
//! once [`CommandQueue::submit`] returns.
//!
//! At most one command per [`ExclusivityGroup`] is executing at any time.
//! Accepting a command cancels every older queued command of its group that
//! the player could still cancel (reported back as superseded), and a due command interrupts an in-flight
//! command of its group before it starts.
//!
//! # Example
//!
//! ```
//! use helmsman_core::prelude::*;
//!
//! let mut queue = CommandQueue::new(EntityId(1), QueueSettings::default());
//! let req = CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(5.0, 0.0));
//! let cmd = Command::from_request(CommandId(1), req, 0, DelayBreakdown::immediate(3));
//! queue.enqueue(cmd).unwrap();
//!
//! assert!(queue.tick(2, |_| Ok(EffectOutcome::Completed)).is_empty());
//! let transitions = queue.tick(3, |_| Ok(EffectOutcome::Completed));
//! assert_eq!(transitions.len(), 2); // executing, completed
//! ```

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::admission::{admit, AdmissionContext};
use crate::command::{
    CancelReason, Command, CommandId, CommandRequest, CommandStatus, ExclusivityGroup, Priority,
};
use crate::delay::DelayBreakdown;
use crate::entity::EntityId;
use crate::error::EnqueueError;
use crate::error::{CancelError, ExecutionFailure, RejectReason};

// ---------------------------------------------------------------------------
// Settings / keys
// ---------------------------------------------------------------------------

/// Queue-wide tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Ticks after issuance during which an emergency command may still be
    /// cancelled.
    pub emergency_grace_ticks: u64,
    /// Terminal commands remembered for status lookups.
    pub history_limit: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            emergency_grace_ticks: 20,
            history_limit: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct QueueKey {
    execute_tick: u64,
    priority: Reverse<Priority>,
    issue_tick: u64,
    seq: u64,
}

impl QueueKey {
    fn of(cmd: &Command) -> Self {
        Self {
            execute_tick: cmd.execute_tick,
            priority: Reverse(cmd.priority),
            issue_tick: cmd.issue_tick,
            seq: cmd.seq,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What an effect applier did with an executing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectOutcome {
    /// The effect is fully applied.
    Completed,
    /// The effect continues over later ticks (e.g. travel). The command stays
    /// executing until the owner finishes it.
    InProgress,
}

/// A successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReceipt {
    /// The queued command as stored.
    pub command: Command,
    /// Older commands of the same exclusivity group that this one replaced.
    pub superseded: Vec<Command>,
    /// Command points the caller must deduct.
    pub cost: u32,
}

/// One lifecycle step produced by [`CommandQueue::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Executing(Command),
    Completed {
        command: Command,
        /// Set when a newer command of the same group cut this one short.
        interrupted_by: Option<CommandId>,
    },
    Failed {
        command: Command,
        failure: ExecutionFailure,
    },
}

impl Transition {
    pub fn command(&self) -> &Command {
        match self {
            Transition::Executing(c) => c,
            Transition::Completed { command, .. } | Transition::Failed { command, .. } => command,
        }
    }
}

/// Queue entry as shown to clients. Progress figures are derived from the
/// current tick, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedCommand {
    pub id: CommandId,
    pub entity_id: EntityId,
    pub command_type: crate::command::CommandType,
    pub priority: Priority,
    pub status: CommandStatus,
    pub payload: crate::command::Payload,
    pub issue_tick: u64,
    pub execute_tick: u64,
    pub remaining_ticks: u64,
    pub remaining_seconds: f64,
    /// Fraction of the delay already elapsed, `0.0..=1.0`.
    pub progress: f64,
    pub delay_breakdown: DelayBreakdown,
    pub cancellable: bool,
}

impl QueuedCommand {
    pub fn derive(cmd: &Command, now: u64, tick_rate_hz: f64, emergency_grace_ticks: u64) -> Self {
        let remaining_ticks = cmd.execute_tick.saturating_sub(now);
        let total = cmd.delay.total_delay;
        let progress = if cmd.status != CommandStatus::Queued || total == 0 {
            1.0
        } else {
            (now.saturating_sub(cmd.issue_tick) as f64 / total as f64).clamp(0.0, 1.0)
        };
        Self {
            id: cmd.id,
            entity_id: cmd.entity_id,
            command_type: cmd.command_type,
            priority: cmd.priority,
            status: cmd.status,
            payload: cmd.payload.clone(),
            issue_tick: cmd.issue_tick,
            execute_tick: cmd.execute_tick,
            remaining_ticks,
            remaining_seconds: remaining_ticks as f64 / tick_rate_hz,
            progress,
            delay_breakdown: cmd.delay,
            cancellable: cmd.is_cancellable_at(now, emergency_grace_ticks),
        }
    }
}

/// Serializable form of a queue, used by checkpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    pub pending: Vec<Command>,
    pub executing: Vec<Command>,
    pub history: Vec<Command>,
    pub next_seq: u64,
}

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

/// Ordered pending commands for one fleet.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    entity_id: EntityId,
    settings: QueueSettings,
    pending: BTreeMap<QueueKey, Command>,
    index: HashMap<CommandId, QueueKey>,
    executing: BTreeMap<ExclusivityGroup, Command>,
    history: VecDeque<Command>,
    next_seq: u64,
}

impl CommandQueue {
    pub fn new(entity_id: EntityId, settings: QueueSettings) -> Self {
        Self {
            entity_id,
            settings,
            pending: BTreeMap::new(),
            index: HashMap::new(),
            executing: BTreeMap::new(),
            history: VecDeque::new(),
            next_seq: 0,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    /// Admit `request` and queue it as command `id`.
    ///
    /// # Errors
    ///
    /// Returns the admission's [`RejectReason`]; the queue is untouched.
    pub fn submit(
        &mut self,
        id: CommandId,
        request: CommandRequest,
        ctx: &AdmissionContext<'_>,
    ) -> Result<SubmitReceipt, RejectReason> {
        if request.entity_id != self.entity_id {
            return Err(RejectReason::UnknownEntity(request.entity_id));
        }
        let admission = admit(&request, ctx)?;
        let cmd = Command::from_request(id, request, ctx.now, admission.delay);
        let (command, superseded) = self.insert(cmd, ctx.now);
        Ok(SubmitReceipt {
            command,
            superseded,
            cost: admission.cost,
        })
    }

    /// Queue an already-built command, superseding older queued commands of
    /// its group. Returns the superseded commands.
    ///
    /// # Errors
    ///
    /// The command must be QUEUED, belong to this queue's fleet and carry an
    /// id this queue has not seen. The queue is untouched on error.
    pub fn enqueue(&mut self, cmd: Command) -> Result<Vec<Command>, EnqueueError> {
        if cmd.status != CommandStatus::Queued {
            return Err(EnqueueError::NotQueued {
                id: cmd.id,
                status: cmd.status,
            });
        }
        if cmd.entity_id != self.entity_id {
            return Err(EnqueueError::WrongEntity {
                id: cmd.id,
                owner: cmd.entity_id,
                queue: self.entity_id,
            });
        }
        if self.get(cmd.id).is_some() {
            return Err(EnqueueError::Duplicate(cmd.id));
        }
        let now = cmd.issue_tick;
        Ok(self.insert(cmd, now).1)
    }

    fn insert(&mut self, mut cmd: Command, now: u64) -> (Command, Vec<Command>) {
        debug_assert_eq!(cmd.status, CommandStatus::Queued);
        let superseded = self.supersede(cmd.group(), cmd.id, now);
        cmd.seq = self.next_seq;
        self.next_seq += 1;
        let key = QueueKey::of(&cmd);
        debug!(
            entity = %self.entity_id,
            command = %cmd.id,
            kind = %cmd.command_type,
            execute_tick = cmd.execute_tick,
            "command queued"
        );
        self.index.insert(cmd.id, key);
        self.pending.insert(key, cmd.clone());
        (cmd, superseded)
    }

    fn supersede(&mut self, group: ExclusivityGroup, by: CommandId, now: u64) -> Vec<Command> {
        // Commands a player could not cancel are not superseded either.
        let grace = self.settings.emergency_grace_ticks;
        let keys: Vec<QueueKey> = self
            .pending
            .iter()
            .filter(|(_, c)| c.group() == group && c.is_cancellable_at(now, grace))
            .map(|(k, _)| *k)
            .collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(mut old) = self.pending.remove(&key) {
                self.index.remove(&old.id);
                old.transition(CommandStatus::Cancelled, now);
                debug!(entity = %self.entity_id, command = %old.id, by = %by, "command superseded");
                self.retire(old.clone());
                out.push(old);
            }
        }
        out
    }

    /// Cancel a queued command on the player's behalf.
    ///
    /// # Errors
    ///
    /// - [`CancelError::UnknownCommand`] if the id was never seen (or has
    ///   aged out of history).
    /// - [`CancelError::NotQueued`] if it is executing or already terminal.
    /// - [`CancelError::NotCancellable`] if it is an emergency command past
    ///   its grace window, or marked non-cancellable.
    pub fn cancel(&mut self, id: CommandId, now: u64) -> Result<Command, CancelError> {
        let Some(key) = self.index.get(&id).copied() else {
            return Err(match self.get(id) {
                Some(c) => CancelError::NotQueued { id, status: c.status },
                None => CancelError::UnknownCommand(id),
            });
        };
        let cancellable = self
            .pending
            .get(&key)
            .is_some_and(|c| c.is_cancellable_at(now, self.settings.emergency_grace_ticks));
        if !cancellable {
            return Err(CancelError::NotCancellable(id));
        }
        let mut cmd = self
            .pending
            .remove(&key)
            .ok_or(CancelError::UnknownCommand(id))?;
        self.index.remove(&id);
        cmd.transition(CommandStatus::Cancelled, now);
        debug!(entity = %self.entity_id, command = %id, "command cancelled by player");
        self.retire(cmd.clone());
        Ok(cmd)
    }

    /// Cancel every queued command. Executing commands are left alone.
    pub fn cancel_all(&mut self, reason: CancelReason, now: u64) -> Vec<Command> {
        let pending = std::mem::take(&mut self.pending);
        self.index.clear();
        let mut out = Vec::with_capacity(pending.len());
        for (_, mut cmd) in pending {
            cmd.transition(CommandStatus::Cancelled, now);
            debug!(entity = %self.entity_id, command = %cmd.id, reason = reason.as_str(), "command flushed");
            self.retire(cmd.clone());
            out.push(cmd);
        }
        out
    }

    /// Execute every command due at `now`, in queue order.
    ///
    /// Each due command first interrupts any in-flight command of its group,
    /// is marked executing, and is handed to `apply`. Commands whose effect
    /// completes (or fails) are retired; in-progress ones stay executing.
    pub fn tick<F>(&mut self, now: u64, mut apply: F) -> Vec<Transition>
    where
        F: FnMut(&Command) -> Result<EffectOutcome, ExecutionFailure>,
    {
        let mut transitions = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().execute_tick > now {
                break;
            }
            let mut cmd = entry.remove();
            self.index.remove(&cmd.id);
            let group = cmd.group();

            if let Some(mut prev) = self.executing.remove(&group) {
                prev.transition(CommandStatus::Completed, now);
                debug!(entity = %self.entity_id, command = %prev.id, by = %cmd.id, "in-flight command interrupted");
                self.retire(prev.clone());
                transitions.push(Transition::Completed {
                    command: prev,
                    interrupted_by: Some(cmd.id),
                });
            }

            cmd.transition(CommandStatus::Executing, now);
            transitions.push(Transition::Executing(cmd.clone()));

            match apply(&cmd) {
                Ok(EffectOutcome::Completed) => {
                    cmd.transition(CommandStatus::Completed, now);
                    self.retire(cmd.clone());
                    transitions.push(Transition::Completed {
                        command: cmd,
                        interrupted_by: None,
                    });
                }
                Ok(EffectOutcome::InProgress) => {
                    self.executing.insert(group, cmd);
                }
                Err(failure) => {
                    cmd.transition(CommandStatus::Failed, now);
                    self.retire(cmd.clone());
                    transitions.push(Transition::Failed {
                        command: cmd,
                        failure,
                    });
                }
            }
        }
        transitions
    }

    /// Finish the in-flight command of `group` successfully.
    pub fn complete_in_flight(&mut self, group: ExclusivityGroup, now: u64) -> Option<Command> {
        let mut cmd = self.executing.remove(&group)?;
        cmd.transition(CommandStatus::Completed, now);
        self.retire(cmd.clone());
        Some(cmd)
    }

    /// Fail the in-flight command of `group`.
    pub fn fail_in_flight(&mut self, group: ExclusivityGroup, now: u64) -> Option<Command> {
        let mut cmd = self.executing.remove(&group)?;
        cmd.transition(CommandStatus::Failed, now);
        self.retire(cmd.clone());
        Some(cmd)
    }

    pub fn executing(&self, group: ExclusivityGroup) -> Option<&Command> {
        self.executing.get(&group)
    }

    pub fn executing_commands(&self) -> impl Iterator<Item = &Command> {
        self.executing.values()
    }

    /// Pending commands in execution order.
    pub fn pending(&self) -> impl Iterator<Item = &Command> {
        self.pending.values()
    }

    /// Look up a command in any state this queue still remembers.
    pub fn get(&self, id: CommandId) -> Option<&Command> {
        if let Some(key) = self.index.get(&id) {
            return self.pending.get(key);
        }
        self.executing
            .values()
            .find(|c| c.id == id)
            .or_else(|| self.history.iter().rev().find(|c| c.id == id))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Executing commands followed by pending ones in execution order.
    pub fn inspect(&self, now: u64, tick_rate_hz: f64) -> Vec<QueuedCommand> {
        let grace = self.settings.emergency_grace_ticks;
        self.executing
            .values()
            .chain(self.pending.values())
            .map(|c| QueuedCommand::derive(c, now, tick_rate_hz, grace))
            .collect()
    }

    /// Verify internal bookkeeping. Returns a description of the first
    /// inconsistency found.
    pub fn check_integrity(&self) -> Result<(), String> {
        if self.index.len() != self.pending.len() {
            return Err(format!(
                "index holds {} entries but {} commands are pending",
                self.index.len(),
                self.pending.len()
            ));
        }
        for (key, cmd) in &self.pending {
            if cmd.status != CommandStatus::Queued {
                return Err(format!("pending command {} has status {}", cmd.id, cmd.status));
            }
            if *key != QueueKey::of(cmd) || self.index.get(&cmd.id) != Some(key) {
                return Err(format!("command {} is filed under a stale key", cmd.id));
            }
            if cmd.entity_id != self.entity_id {
                return Err(format!("command {} belongs to {}", cmd.id, cmd.entity_id));
            }
        }
        for (group, cmd) in &self.executing {
            if cmd.status != CommandStatus::Executing || cmd.group() != *group {
                return Err(format!(
                    "in-flight slot {group:?} holds {} with status {}",
                    cmd.id, cmd.status
                ));
            }
        }
        Ok(())
    }

    pub fn to_state(&self) -> QueueState {
        QueueState {
            pending: self.pending.values().cloned().collect(),
            executing: self.executing.values().cloned().collect(),
            history: self.history.iter().cloned().collect(),
            next_seq: self.next_seq,
        }
    }

    /// Rebuild a queue from [`to_state`](Self::to_state) output.
    ///
    /// # Errors
    ///
    /// Returns a description if the state violates the queue invariants.
    pub fn from_state(
        entity_id: EntityId,
        settings: QueueSettings,
        state: QueueState,
    ) -> Result<Self, String> {
        let mut queue = Self::new(entity_id, settings);
        queue.next_seq = state.next_seq;
        for cmd in state.pending {
            let key = QueueKey::of(&cmd);
            queue.index.insert(cmd.id, key);
            if queue.pending.insert(key, cmd).is_some() {
                return Err("duplicate queue key in checkpoint".to_owned());
            }
        }
        for cmd in state.executing {
            if queue.executing.insert(cmd.group(), cmd).is_some() {
                return Err("two in-flight commands share an exclusivity group".to_owned());
            }
        }
        queue.history = state.history.into();
        queue.check_integrity()?;
        Ok(queue)
    }

    fn retire(&mut self, cmd: Command) {
        if self.settings.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.settings.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(cmd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandType, Payload};
    use crate::entity::CommanderId;
    use crate::geometry::Point;

    fn cmd(id: u64, ty: CommandType, priority: Priority, issue: u64, delay: u64) -> Command {
        let payload = match ty {
            CommandType::Move | CommandType::Retreat | CommandType::ParallelMove => {
                Payload::Position { target: Point::new(1.0, 1.0) }
            }
            _ => Payload::None,
        };
        let req = CommandRequest::new(EntityId(1), CommanderId(1), ty)
            .with_priority(priority)
            .with_payload(payload);
        Command::from_request(CommandId(id), req, issue, DelayBreakdown::immediate(delay))
    }

    fn queue() -> CommandQueue {
        CommandQueue::new(EntityId(1), QueueSettings::default())
    }

    fn executed_ids(transitions: &[Transition]) -> Vec<u64> {
        transitions
            .iter()
            .filter_map(|t| match t {
                Transition::Executing(c) => Some(c.id.0),
                _ => None,
            })
            .collect()
    }

    // -- 1. Ordering ---------------------------------------------------------

    #[test]
    fn higher_priority_wins_equal_execute_tick() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Formation, Priority::Normal, 0, 10)).unwrap();
        q.enqueue(cmd(2, CommandType::Repair, Priority::High, 0, 10)).unwrap();
        let t = q.tick(10, |_| Ok(EffectOutcome::Completed));
        assert_eq!(executed_ids(&t), vec![2, 1]);
    }

    #[test]
    fn earlier_issue_wins_equal_tick_and_priority() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Formation, Priority::Normal, 4, 6)).unwrap();
        q.enqueue(cmd(2, CommandType::Repair, Priority::Normal, 2, 8)).unwrap();
        q.enqueue(cmd(3, CommandType::Attack, Priority::Normal, 2, 8)).unwrap();
        let t = q.tick(10, |_| Ok(EffectOutcome::Completed));
        assert_eq!(executed_ids(&t), vec![2, 3, 1]);
    }

    #[test]
    fn nothing_runs_before_its_tick() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Stop, Priority::Emergency, 0, 5)).unwrap();
        assert!(q.tick(4, |_| Ok(EffectOutcome::Completed)).is_empty());
        assert_eq!(q.len(), 1);
        assert_eq!(executed_ids(&q.tick(5, |_| Ok(EffectOutcome::Completed))), vec![1]);
        assert!(q.is_empty());
    }

    // -- 2. Superseding ------------------------------------------------------

    #[test]
    fn retreat_supersedes_queued_move() {
        let mut q = queue();
        assert!(q.enqueue(cmd(1, CommandType::Move, Priority::Normal, 0, 10)).unwrap().is_empty());
        let superseded = q.enqueue(cmd(2, CommandType::Retreat, Priority::Normal, 0, 15)).unwrap();
        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].id, CommandId(1));
        assert_eq!(superseded[0].status, CommandStatus::Cancelled);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get(CommandId(1)).map(|c| c.status), Some(CommandStatus::Cancelled));
    }

    #[test]
    fn emergency_past_grace_is_not_superseded() {
        let mut q = CommandQueue::new(
            EntityId(1),
            QueueSettings {
                emergency_grace_ticks: 2,
                history_limit: 8,
            },
        );
        q.enqueue(cmd(1, CommandType::Stop, Priority::Emergency, 0, 40)).unwrap();
        let superseded = q.enqueue(cmd(2, CommandType::Move, Priority::Normal, 5, 10)).unwrap();
        assert!(superseded.is_empty());
        assert_eq!(q.get(CommandId(1)).map(|c| c.status), Some(CommandStatus::Queued));
        assert_eq!(q.len(), 2);

        let superseded = q
            .enqueue(cmd(3, CommandType::Surrender, Priority::Emergency, 6, 40))
            .unwrap();
        assert_eq!(superseded.iter().map(|c| c.id.0).collect::<Vec<_>>(), vec![2]);

        // Inside the window it is replaced as usual.
        let superseded = q.enqueue(cmd(4, CommandType::Retreat, Priority::Normal, 7, 15)).unwrap();
        assert_eq!(superseded.iter().map(|c| c.id.0).collect::<Vec<_>>(), vec![3]);
        assert_eq!(q.pending().map(|c| c.id.0).collect::<Vec<_>>(), vec![4, 1]);
        assert!(q.check_integrity().is_ok());
    }

    #[test]
    fn orthogonal_groups_do_not_supersede() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Move, Priority::Normal, 0, 10)).unwrap();
        let superseded = q.enqueue(cmd(2, CommandType::EnergyDistribution, Priority::Normal, 0, 5)).unwrap();
        assert!(superseded.is_empty());
        assert_eq!(q.len(), 2);
    }

    // -- 3. Cancellation -----------------------------------------------------

    #[test]
    fn cancel_is_idempotent() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Move, Priority::Normal, 0, 10)).unwrap();
        assert!(q.cancel(CommandId(1), 3).is_ok());
        assert_eq!(
            q.cancel(CommandId(1), 3),
            Err(CancelError::NotQueued {
                id: CommandId(1),
                status: CommandStatus::Cancelled
            })
        );
        assert_eq!(q.cancel(CommandId(9), 3), Err(CancelError::UnknownCommand(CommandId(9))));
    }

    #[test]
    fn completed_command_cannot_be_cancelled() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Stop, Priority::Normal, 0, 1)).unwrap();
        q.tick(1, |_| Ok(EffectOutcome::Completed));
        assert!(matches!(
            q.cancel(CommandId(1), 2),
            Err(CancelError::NotQueued { status: CommandStatus::Completed, .. })
        ));
    }

    #[test]
    fn emergency_grace_window() {
        let mut q = CommandQueue::new(
            EntityId(1),
            QueueSettings {
                emergency_grace_ticks: 3,
                history_limit: 8,
            },
        );
        q.enqueue(cmd(1, CommandType::Stop, Priority::Emergency, 0, 50)).unwrap();
        q.enqueue(cmd(2, CommandType::Repair, Priority::Emergency, 0, 50)).unwrap();
        assert!(q.cancel(CommandId(1), 3).is_ok());
        assert_eq!(q.cancel(CommandId(2), 4), Err(CancelError::NotCancellable(CommandId(2))));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn executing_command_cannot_be_cancelled() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Move, Priority::Normal, 0, 1)).unwrap();
        q.tick(1, |_| Ok(EffectOutcome::InProgress));
        assert!(matches!(
            q.cancel(CommandId(1), 2),
            Err(CancelError::NotQueued { status: CommandStatus::Executing, .. })
        ));
        assert!(q.executing(ExclusivityGroup::Movement).is_some());
    }

    #[test]
    fn enqueue_refuses_commands_that_are_not_queued() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Stop, Priority::Normal, 0, 1)).unwrap();
        q.tick(1, |_| Ok(EffectOutcome::Completed));
        let done = q.get(CommandId(1)).cloned().unwrap();
        assert_eq!(
            q.enqueue(done),
            Err(EnqueueError::NotQueued {
                id: CommandId(1),
                status: CommandStatus::Completed
            })
        );

        let mut cancelled = cmd(2, CommandType::Repair, Priority::Normal, 1, 5);
        cancelled.transition(CommandStatus::Cancelled, 1);
        assert!(matches!(q.enqueue(cancelled), Err(EnqueueError::NotQueued { .. })));
        assert!(q.is_empty());
        assert_eq!(q.get(CommandId(1)).map(|c| c.status), Some(CommandStatus::Completed));
    }

    #[test]
    fn enqueue_refuses_foreign_and_repeated_commands() {
        let mut q = queue();
        let mut foreign = cmd(1, CommandType::Stop, Priority::Normal, 0, 5);
        foreign.entity_id = EntityId(2);
        assert!(matches!(q.enqueue(foreign), Err(EnqueueError::WrongEntity { .. })));

        let repair = cmd(2, CommandType::Repair, Priority::Normal, 0, 5);
        q.enqueue(repair.clone()).unwrap();
        assert_eq!(q.enqueue(repair), Err(EnqueueError::Duplicate(CommandId(2))));
        assert_eq!(q.len(), 1);
    }

    // -- 4. Exclusivity ------------------------------------------------------

    #[test]
    fn due_command_interrupts_in_flight_of_same_group() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Move, Priority::Normal, 0, 1)).unwrap();
        q.tick(1, |_| Ok(EffectOutcome::InProgress));
        q.enqueue(cmd(2, CommandType::Stop, Priority::Normal, 1, 2)).unwrap();
        q.enqueue(cmd(3, CommandType::EnergyDistribution, Priority::Normal, 1, 2)).unwrap();
        let t = q.tick(3, |_| Ok(EffectOutcome::Completed));
        assert!(t.iter().any(|tr| matches!(
            tr,
            Transition::Completed { command, interrupted_by: Some(CommandId(2)) } if command.id == CommandId(1)
        )));
        assert!(q.executing(ExclusivityGroup::Movement).is_none());
    }

    #[test]
    fn at_most_one_in_flight_per_group() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Move, Priority::Normal, 0, 1)).unwrap();
        q.enqueue(cmd(2, CommandType::Attack, Priority::Normal, 0, 1)).unwrap();
        q.tick(1, |_| Ok(EffectOutcome::InProgress));
        q.enqueue(cmd(3, CommandType::ParallelMove, Priority::Normal, 1, 1)).unwrap();
        q.tick(2, |_| Ok(EffectOutcome::InProgress));
        let in_flight: Vec<_> = q.executing_commands().map(|c| c.id.0).collect();
        assert_eq!(in_flight, vec![3, 2]);
        assert!(q.check_integrity().is_ok());
    }

    #[test]
    fn failed_effect_marks_failed() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Attack, Priority::Normal, 0, 1)).unwrap();
        let t = q.tick(1, |c| Err(ExecutionFailure::TargetMissing(c.entity_id)));
        assert!(matches!(&t[1], Transition::Failed { command, .. } if command.status == CommandStatus::Failed));
    }

    // -- 5. Inspection and state ---------------------------------------------

    #[test]
    fn inspect_derives_progress() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Move, Priority::Normal, 0, 20)).unwrap();
        let view = q.inspect(5, 10.0);
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].remaining_ticks, 15);
        assert!((view[0].remaining_seconds - 1.5).abs() < 1e-12);
        assert!((view[0].progress - 0.25).abs() < 1e-12);
        assert!(view[0].cancellable);
    }

    #[test]
    fn state_round_trip_preserves_order() {
        let mut q = queue();
        q.enqueue(cmd(1, CommandType::Formation, Priority::Low, 0, 10)).unwrap();
        q.enqueue(cmd(2, CommandType::Repair, Priority::High, 0, 10)).unwrap();
        q.enqueue(cmd(3, CommandType::Move, Priority::Normal, 0, 1)).unwrap();
        q.tick(1, |_| Ok(EffectOutcome::InProgress));

        let restored =
            CommandQueue::from_state(EntityId(1), QueueSettings::default(), q.to_state()).unwrap();
        let ids: Vec<_> = restored.pending().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(restored.executing(ExclusivityGroup::Movement).is_some());
    }

    #[test]
    fn history_is_bounded() {
        let mut q = CommandQueue::new(
            EntityId(1),
            QueueSettings {
                emergency_grace_ticks: 0,
                history_limit: 2,
            },
        );
        for i in 0..5 {
            q.enqueue(cmd(i, CommandType::Repair, Priority::Normal, i, 0)).unwrap();
            q.tick(i, |_| Ok(EffectOutcome::Completed));
        }
        assert!(q.get(CommandId(0)).is_none());
        assert!(q.get(CommandId(4)).is_some());
    }
}
