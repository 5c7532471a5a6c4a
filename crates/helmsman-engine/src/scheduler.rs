//! Tick scheduler: lifecycle, watchdog and fan-out around a [`Session`].
//!
//! The [`TickScheduler`] decides *when* a session steps, while the session
//! decides *what* a step does. It owns the session exclusively, so a
//! scheduler is the single writer of its battle's state. Every delta it
//! produces goes to the [`EventJournal`] and then to all subscribers.
//!
//! # Lifecycle
//!
//! ```text
//!            start             pause
//! Stopped ---------> Running ---------> Paused
//!    ^                 |  ^               |
//!    |      stop       |  |    resume     |
//!    +-----------------+  +---------------+
//!    ^                                    |
//!    +---------------- stop --------------+
//!
//! any state --(fatal step error / desync)--> Halted
//! ```
//!
//! Orders are accepted in every state except `Halted`. They wait in their
//! queues while the scheduler is stopped or paused.
//!
//! # Watchdog
//!
//! A step that takes longer than [`EngineConfig::watchdog_budget`] pauses
//! the scheduler and emits a `watchdog_pause` alert. An operator resumes it
//! explicitly.

use std::fmt;
use std::time::{Duration, Instant};

use helmsman_broadcast::broadcaster::{StateBroadcaster, Subscription, SubscriberId};
use helmsman_broadcast::delta::StateDelta;
use helmsman_broadcast::event::{AlertKind, SchedulerEvent};
use helmsman_broadcast::journal::EventJournal;
use helmsman_core::command::{CancelReason, Command, CommandId, CommandRequest};
use helmsman_core::entity::EntityId;
use helmsman_core::error::{CancelError, RejectReason};
use helmsman_core::geometry::Point;
use helmsman_core::jamming::JammingLevel;
use helmsman_core::queue::QueuedCommand;
use helmsman_core::terrain::TerrainCell;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::checkpoint::SessionCheckpoint;
use crate::config::EngineConfig;
use crate::replay::{ReplayLog, ReplayRecorder};
use crate::session::{MoveOrder, MoveReceipt, Session, SessionError, SessionId, SessionInput};

// ---------------------------------------------------------------------------
// State / errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
    Paused,
    /// Stopped for good after an unrecoverable error.
    Halted,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Running => "running",
            SchedulerState::Paused => "paused",
            SchedulerState::Halted => "halted",
        };
        f.write_str(s)
    }
}

/// What happens to queued commands on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Keep them queued; they run once the scheduler starts again.
    #[default]
    Retain,
    /// Cancel every queued command with reason `shutdown`.
    Flush,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    #[error("cannot {action} a {from} scheduler")]
    InvalidTransition {
        from: SchedulerState,
        action: &'static str,
    },

    #[error("scheduler halted: {0}")]
    Halted(String),
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidTransition { .. } => "invalid_transition",
            SchedulerError::Halted(_) => "session_halted",
        }
    }
}

/// Timing of the most recent step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickDiagnostics {
    pub tick: u64,
    pub step_time: Duration,
    pub events: usize,
    pub fleets_updated: usize,
    /// Subscribers the delta reached.
    pub delivered: usize,
}

// ---------------------------------------------------------------------------
// TickScheduler
// ---------------------------------------------------------------------------

pub struct TickScheduler {
    session: Session,
    state: SchedulerState,
    broadcaster: StateBroadcaster,
    journal: EventJournal,
    diagnostics: TickDiagnostics,
    halt_reason: Option<String>,
    recorder: Option<ReplayRecorder>,
}

impl fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickScheduler")
            .field("session", &self.session)
            .field("state", &self.state)
            .field("subscribers", &self.broadcaster.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl TickScheduler {
    pub fn new(session: Session) -> Self {
        let journal = EventJournal::with_capacity(session.config().journal_capacity);
        Self {
            session,
            state: SchedulerState::Stopped,
            broadcaster: StateBroadcaster::new(),
            journal,
            diagnostics: TickDiagnostics::default(),
            halt_reason: None,
            recorder: None,
        }
    }

    // -- lifecycle ----------------------------------------------------------

    pub fn start(&mut self) -> Result<(), SchedulerError> {
        self.transition(SchedulerState::Stopped, SchedulerState::Running, "start")
    }

    pub fn pause(&mut self) -> Result<(), SchedulerError> {
        self.transition(SchedulerState::Running, SchedulerState::Paused, "pause")
    }

    pub fn resume(&mut self) -> Result<(), SchedulerError> {
        self.transition(SchedulerState::Paused, SchedulerState::Running, "resume")
    }

    /// Stop the tick loop. Stopping a stopped scheduler is a no-op.
    pub fn stop(&mut self, mode: ShutdownMode) -> Result<(), SchedulerError> {
        self.ensure_live()?;
        if mode == ShutdownMode::Flush {
            let events = self.session.flush_queues(CancelReason::Shutdown);
            self.publish_events(events);
        }
        if self.state != SchedulerState::Stopped {
            info!(session = %self.session.id(), from = %self.state, ?mode, "scheduler stopped");
        }
        self.state = SchedulerState::Stopped;
        Ok(())
    }

    fn transition(
        &mut self,
        from: SchedulerState,
        to: SchedulerState,
        action: &'static str,
    ) -> Result<(), SchedulerError> {
        self.ensure_live()?;
        if self.state != from {
            return Err(SchedulerError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        info!(session = %self.session.id(), from = %from, to = %to, "scheduler {action}");
        self.state = to;
        Ok(())
    }

    fn ensure_live(&self) -> Result<(), SchedulerError> {
        match &self.halt_reason {
            Some(reason) => Err(SchedulerError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    // -- orders -------------------------------------------------------------

    pub fn submit(&mut self, request: CommandRequest) -> Result<QueuedCommand, RejectReason> {
        self.accepting()?;
        self.record(SessionInput::Submit {
            request: request.clone(),
        });
        let result = self.session.submit(request);
        self.flush_session_events();
        result
    }

    pub fn move_fleet(&mut self, order: MoveOrder) -> Result<MoveReceipt, RejectReason> {
        self.accepting()?;
        self.record(SessionInput::MoveFleet {
            order: order.clone(),
        });
        let result = self.session.move_fleet(order);
        self.flush_session_events();
        result
    }

    pub fn cancel(&mut self, id: CommandId) -> Result<Command, CancelError> {
        if self.state == SchedulerState::Halted {
            return Err(CancelError::SessionUnavailable);
        }
        self.record(SessionInput::Cancel { command_id: id });
        let result = self.session.cancel(id);
        self.flush_session_events();
        result
    }

    fn accepting(&self) -> Result<(), RejectReason> {
        if self.state == SchedulerState::Halted {
            return Err(RejectReason::SessionHalted);
        }
        Ok(())
    }

    fn record(&mut self, input: SessionInput) {
        let tick = self.session.tick();
        if let Some(recorder) = &mut self.recorder {
            if let Err(e) = recorder.record_input(tick, input) {
                warn!(session = %self.session.id(), error = %e, "input not recorded");
            }
        }
    }

    fn flush_session_events(&mut self) {
        let events = self.session.drain_events();
        self.publish_events(events);
    }

    fn publish_events(&mut self, events: Vec<SchedulerEvent>) {
        if events.is_empty() {
            return;
        }
        self.journal.extend(&events);
        let delta = StateDelta::events_only(self.session.tick(), events);
        self.broadcaster.publish(&delta);
    }

    // -- ticking ------------------------------------------------------------

    /// Step once if running. Returns the published delta, or `None` when
    /// the scheduler is not running.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Halted`] when the step failed fatally. The
    /// scheduler is then halted and an alert has been published.
    pub fn advance(&mut self) -> Result<Option<StateDelta>, SchedulerError> {
        match self.state {
            SchedulerState::Running => self.step().map(Some),
            SchedulerState::Halted => Err(SchedulerError::Halted(
                self.halt_reason.clone().unwrap_or_default(),
            )),
            SchedulerState::Stopped | SchedulerState::Paused => Ok(None),
        }
    }

    /// Step regardless of lifecycle state, except when halted.
    pub fn step(&mut self) -> Result<StateDelta, SchedulerError> {
        self.ensure_live()?;
        self.record_step();

        let started = Instant::now();
        let result = self.session.step();
        let step_time = started.elapsed();

        let mut delta = match result {
            Ok(delta) => delta,
            Err(err) => return Err(self.halt(err)),
        };

        let budget = self.session.config().watchdog_budget();
        if step_time > budget && self.state == SchedulerState::Running {
            self.state = SchedulerState::Paused;
            error!(
                session = %self.session.id(),
                tick = delta.tick,
                elapsed_ms = step_time.as_millis() as u64,
                budget_ms = budget.as_millis() as u64,
                "tick overran its budget, scheduler paused"
            );
            delta.events.push(SchedulerEvent::alert(
                delta.tick,
                AlertKind::WatchdogPause,
                format!(
                    "tick took {} ms, budget is {} ms",
                    step_time.as_millis(),
                    budget.as_millis()
                ),
            ));
        }

        self.journal.extend(&delta.events);
        let delivered = self.broadcaster.publish(&delta);
        self.diagnostics = TickDiagnostics {
            tick: delta.tick,
            step_time,
            events: delta.events.len(),
            fleets_updated: delta.fleets.len(),
            delivered,
        };
        Ok(delta)
    }

    /// Advance up to `count` ticks, stopping early if the scheduler leaves
    /// the running state. Returns the number of ticks executed.
    pub fn run_ticks(&mut self, count: u64) -> Result<u64, SchedulerError> {
        let mut executed = 0;
        for _ in 0..count {
            match self.advance()? {
                Some(_) => executed += 1,
                None => break,
            }
        }
        Ok(executed)
    }

    fn record_step(&mut self) {
        let tick = self.session.tick();
        let Some(recorder) = &self.recorder else {
            return;
        };
        let hash = if recorder.wants_checkpoint(tick) {
            match self.session.state_hash() {
                Ok(hash) => Some(hash),
                Err(e) => {
                    warn!(session = %self.session.id(), tick, error = %e, "checkpoint hash unavailable");
                    None
                }
            }
        } else {
            None
        };
        if let Some(recorder) = &mut self.recorder {
            if let Err(e) = recorder.record_step(tick, hash) {
                warn!(session = %self.session.id(), error = %e, "step not recorded");
            }
        }
    }

    fn halt(&mut self, err: SessionError) -> SchedulerError {
        let tick = self.session.tick();
        let reason = err.to_string();
        error!(
            session = %self.session.id(),
            tick,
            code = err.code(),
            %err,
            "session halted"
        );
        self.state = SchedulerState::Halted;
        self.halt_reason = Some(reason.clone());

        let mut events = self.session.drain_events();
        events.push(SchedulerEvent::alert(tick, AlertKind::SessionHalted, reason.clone()));
        self.journal.extend(&events);
        self.broadcaster
            .publish(&StateDelta::events_only(tick, events));
        SchedulerError::Halted(reason)
    }

    /// Compare the session's state hash with `expected`, halting on mismatch.
    pub fn verify_checkpoint(&mut self, expected: &str) -> Result<(), SchedulerError> {
        self.ensure_live()?;
        let tick = self.session.tick();
        let actual = match self.session.state_hash() {
            Ok(hash) => hash,
            Err(e) => return Err(self.halt(SessionError::Halted(e.to_string()))),
        };
        if actual != expected {
            return Err(self.halt(SessionError::RngDesync {
                tick,
                expected: expected.to_owned(),
                actual,
            }));
        }
        Ok(())
    }

    // -- replay recording ---------------------------------------------------

    /// Begin recording inputs from the current state.
    pub fn start_recording(&mut self, checkpoint_interval: u64) -> anyhow::Result<()> {
        let initial = self.session.checkpoint()?;
        self.recorder = Some(ReplayRecorder::new(initial, checkpoint_interval));
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn finish_recording(&mut self) -> Option<ReplayLog> {
        self.recorder.take().map(ReplayRecorder::finish)
    }

    pub fn checkpoint(&self) -> anyhow::Result<SessionCheckpoint> {
        self.session.checkpoint()
    }

    // -- clients ------------------------------------------------------------

    /// Attach a client. Its first message is a full snapshot.
    pub fn subscribe(&mut self) -> Subscription {
        self.broadcaster.subscribe(self.session.full_state())
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    pub fn inspect_queue(&self, entity: EntityId) -> Result<Vec<QueuedCommand>, RejectReason> {
        self.session.inspect_queue(entity)
    }

    pub fn terrain_at(&self, x: f64, y: f64) -> TerrainCell {
        self.session.terrain_at(x, y)
    }

    pub fn jamming_at(&self, p: Point) -> JammingLevel {
        self.session.jamming_at(p)
    }

    // -- accessors ----------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    pub fn tick(&self) -> u64 {
        self.session.tick()
    }

    pub fn config(&self) -> &EngineConfig {
        self.session.config()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.diagnostics
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}
