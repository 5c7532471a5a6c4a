//! Deterministic replay of a session from recorded inputs.
//!
//! A [`ReplayRecorder`] starts from a [`SessionCheckpoint`] and records every
//! accepted-or-rejected input together with the tick it arrived at, plus a
//! state hash before every Nth step. [`replay`] restores the checkpoint,
//! feeds the inputs back in order and compares hashes along the way.
//!
//! Inputs that arrive while the session sits at tick `t` are applied before
//! the step that advances it to `t + 1`. Rejected inputs are recorded too;
//! replaying a rejection reproduces it, including any warp rolls it spent.
//!
//! ```
//! use helmsman_engine::prelude::*;
//! use helmsman_engine::replay::{replay, ReplayRecorder};
//!
//! let build = || {
//!     let mut s = Session::new(
//!         SessionId(1),
//!         EngineConfig::default(),
//!         SharedField::new(TerrainField::new(100, 100)),
//!         SharedField::new(JammingField::default()),
//!         11,
//!     );
//!     s.add_commander(Commander::new(CommanderId(1), FactionId(0), 0, 100));
//!     s.add_entity(Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::ZERO));
//!     s
//! };
//!
//! let mut session = build();
//! let mut recorder = ReplayRecorder::new(session.checkpoint().unwrap(), 5);
//! let input = SessionInput::Submit {
//!     request: CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(20.0, 0.0)),
//! };
//! recorder.record_input(session.tick(), input.clone()).unwrap();
//! session.apply_input(input);
//! for _ in 0..30 {
//!     let hash = session.state_hash().unwrap();
//!     recorder.record_step(session.tick(), Some(hash)).unwrap();
//!     session.step().unwrap();
//! }
//! let log = recorder.finish();
//!
//! let mut fresh = build();
//! let result = replay(&mut fresh, &log).unwrap();
//! assert!(result.completed);
//! assert_eq!(fresh.state_hash().unwrap(), session.state_hash().unwrap());
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checkpoint::SessionCheckpoint;
use crate::session::{Session, SessionInput};

// ---------------------------------------------------------------------------
// Log types
// ---------------------------------------------------------------------------

/// A checkpoint plus everything needed to re-run the session from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayLog {
    pub initial: SessionCheckpoint,
    /// Number of steps recorded. Replay executes exactly this many.
    pub total_ticks: u64,
    /// Inputs and checkpoints in recording order.
    pub entries: Vec<ReplayEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayEntry {
    /// An input that arrived while the session was at `tick`.
    Input { tick: u64, input: SessionInput },
    /// State hash taken at `tick`, before the step that leaves it.
    Checkpoint { tick: u64, state_hash: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResult {
    pub completed: bool,
    pub ticks_replayed: u64,
    /// First checkpoint whose hash did not match. `None` if deterministic.
    pub first_divergence: Option<ReplayDivergence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayDivergence {
    pub tick: u64,
    pub expected_hash: String,
    pub actual_hash: String,
}

// ---------------------------------------------------------------------------
// ReplayRecorder
// ---------------------------------------------------------------------------

/// Builds a [`ReplayLog`] while a session runs.
///
/// Inputs must be recorded with non-decreasing ticks and steps with strictly
/// increasing ticks; an input may not be recorded for a tick that has
/// already been stepped past.
#[derive(Debug, Clone)]
pub struct ReplayRecorder {
    log: ReplayLog,
    checkpoint_interval: u64,
    last_step: Option<u64>,
}

impl ReplayRecorder {
    /// `checkpoint_interval` of 10 records hashes at ticks 0, 10, 20 and so
    /// on. 0 records one whenever a hash is supplied.
    pub fn new(initial: SessionCheckpoint, checkpoint_interval: u64) -> Self {
        Self {
            log: ReplayLog {
                initial,
                total_ticks: 0,
                entries: Vec::new(),
            },
            checkpoint_interval,
            last_step: None,
        }
    }

    /// Whether a hash supplied for the step at `tick` would be kept.
    pub fn wants_checkpoint(&self, tick: u64) -> bool {
        self.checkpoint_interval == 0 || tick % self.checkpoint_interval == 0
    }

    /// Record an input that arrived at `tick`.
    ///
    /// # Errors
    ///
    /// If `tick` lies before the recording start or has already been
    /// stepped past.
    pub fn record_input(&mut self, tick: u64, input: SessionInput) -> anyhow::Result<()> {
        if tick < self.log.initial.tick {
            anyhow::bail!(
                "input at tick {tick} predates the recording start {}",
                self.log.initial.tick
            );
        }
        if let Some(prev) = self.last_step {
            if tick <= prev {
                anyhow::bail!("input at tick {tick} arrived after the step at tick {prev}");
            }
        }
        self.log.entries.push(ReplayEntry::Input { tick, input });
        Ok(())
    }

    /// Record the step that leaves `tick`. Call before stepping.
    ///
    /// # Errors
    ///
    /// If `tick` is not strictly greater than the previous step's tick.
    pub fn record_step(&mut self, tick: u64, state_hash: Option<String>) -> anyhow::Result<()> {
        if let Some(prev) = self.last_step {
            if tick <= prev {
                anyhow::bail!("step at tick {tick} is not after the previous step at {prev}");
            }
        }
        self.last_step = Some(tick);
        self.log.total_ticks += 1;
        if let Some(state_hash) = state_hash {
            if self.wants_checkpoint(tick) {
                self.log
                    .entries
                    .push(ReplayEntry::Checkpoint { tick, state_hash });
            }
        }
        Ok(())
    }

    pub fn total_ticks(&self) -> u64 {
        self.log.total_ticks
    }

    pub fn finish(self) -> ReplayLog {
        self.log
    }
}

// ---------------------------------------------------------------------------
// replay()
// ---------------------------------------------------------------------------

/// Re-run `log` on `session`, verifying hashes at every checkpoint.
///
/// For each tick: apply the inputs recorded at that tick, compare the
/// checkpoint hash if one was recorded, then step. Inputs recorded at the
/// final tick (after the last step) are applied at the end. Replay stops at
/// the first divergence.
///
/// # Errors
///
/// A malformed log (duplicate checkpoints, inputs outside the tick range,
/// tick overflow), a failed restore, or a step that fails fatally. The log
/// is validated before the session is touched.
pub fn replay(session: &mut Session, log: &ReplayLog) -> anyhow::Result<ReplayResult> {
    let start_tick = log.initial.tick;
    let end_tick = start_tick.checked_add(log.total_ticks).ok_or_else(|| {
        anyhow::anyhow!(
            "tick range overflow: start {start_tick} + {} ticks exceeds u64::MAX",
            log.total_ticks
        )
    })?;

    let mut inputs: BTreeMap<u64, Vec<&SessionInput>> = BTreeMap::new();
    let mut checkpoints: BTreeMap<u64, &str> = BTreeMap::new();
    for entry in &log.entries {
        match entry {
            ReplayEntry::Input { tick, input } => {
                if !(start_tick..=end_tick).contains(tick) {
                    anyhow::bail!("replay log has an input at tick {tick} outside {start_tick}..={end_tick}");
                }
                inputs.entry(*tick).or_default().push(input);
            }
            ReplayEntry::Checkpoint { tick, state_hash } => {
                if checkpoints.insert(*tick, state_hash.as_str()).is_some() {
                    anyhow::bail!("replay log contains duplicate checkpoint at tick {tick}");
                }
            }
        }
    }

    session
        .restore(&log.initial)
        .map_err(|e| anyhow::anyhow!("failed to restore initial checkpoint for replay: {e}"))?;

    let apply = |session: &mut Session, tick: u64| {
        for input in inputs.get(&tick).into_iter().flatten() {
            session.apply_input((*input).clone());
        }
    };

    let mut ticks_replayed = 0;
    for tick in start_tick..end_tick {
        apply(session, tick);

        if let Some(expected) = checkpoints.get(&tick) {
            let actual = session.state_hash()?;
            if actual != *expected {
                warn!(session = %session.id(), tick, "replay diverged");
                return Ok(ReplayResult {
                    completed: false,
                    ticks_replayed,
                    first_divergence: Some(ReplayDivergence {
                        tick,
                        expected_hash: (*expected).to_owned(),
                        actual_hash: actual,
                    }),
                });
            }
        }

        session
            .step()
            .map_err(|e| anyhow::anyhow!("replayed step at tick {tick} failed: {e}"))?;
        ticks_replayed += 1;
    }
    apply(session, end_tick);

    debug!(session = %session.id(), ticks_replayed, "replay complete");
    Ok(ReplayResult {
        completed: true,
        ticks_replayed,
        first_divergence: None,
    })
}
