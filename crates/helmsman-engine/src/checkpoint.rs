//! Session checkpoints with BLAKE3 hashing.
//!
//! A [`SessionCheckpoint`] captures everything that decides how a session
//! evolves from a given tick: fleets, their command queues, commanders, the
//! command id counter and the warp RNG state. Restoring a checkpoint and
//! feeding the same inputs reproduces the same states tick for tick.
//!
//! ```
//! use helmsman_engine::prelude::*;
//!
//! let mut session = Session::new(
//!     SessionId(1),
//!     EngineConfig::default(),
//!     SharedField::new(TerrainField::new(100, 100)),
//!     SharedField::new(JammingField::default()),
//!     7,
//! );
//! session.add_entity(Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::ZERO));
//! for _ in 0..10 {
//!     session.step().unwrap();
//! }
//!
//! let checkpoint = session.checkpoint().unwrap();
//! assert_eq!(checkpoint.tick, 10);
//! assert_eq!(checkpoint.hash.len(), 64);
//!
//! for _ in 0..10 {
//!     session.step().unwrap();
//! }
//! session.restore(&checkpoint).unwrap();
//! assert_eq!(session.tick(), 10);
//! ```
//!
//! # What is not captured
//!
//! - **Terrain and jamming.** They are shared with other sessions and owned
//!   by world-event collaborators. A restored session reads whatever the
//!   shared fields currently hold.
//! - **The effect applier.** It stays attached to the session.
//! - **Buffered events and dirty markers.** Cleared on restore; the next
//!   delta reports every fleet.

use std::collections::BTreeMap;

use anyhow::Context;
use helmsman_core::entity::{Commander, CommanderId, Entity, EntityId};
use helmsman_core::queue::{CommandQueue, QueueState};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::effects::FleetMap;
use crate::session::{Session, SessionId};

/// One fleet and its queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetRecord {
    pub entity: Entity,
    pub queue: QueueState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCheckpoint {
    pub session_id: SessionId,
    pub tick: u64,
    pub seed: u64,
    pub rng: Pcg64,
    pub next_command_id: u64,
    /// Ordered by fleet id.
    pub fleets: Vec<FleetRecord>,
    /// Ordered by commander id.
    pub commanders: Vec<Commander>,
    /// BLAKE3 hex digest of every other field.
    pub hash: String,
}

impl SessionCheckpoint {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string(self).context("failed to serialize checkpoint")
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse checkpoint")
    }

    /// Recompute the digest from the checkpoint's contents.
    pub fn recompute_hash(&self) -> anyhow::Result<String> {
        compute_hash(&HashableState {
            session_id: self.session_id,
            tick: self.tick,
            seed: self.seed,
            rng: &self.rng,
            next_command_id: self.next_command_id,
            fleets: &self.fleets,
            commanders: &self.commanders,
        })
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HashableState<'a> {
    session_id: SessionId,
    tick: u64,
    seed: u64,
    rng: &'a Pcg64,
    next_command_id: u64,
    fleets: &'a [FleetRecord],
    commanders: &'a [Commander],
}

fn compute_hash(state: &HashableState<'_>) -> anyhow::Result<String> {
    let bytes = serde_json::to_vec(state).context("session state is not serializable")?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// ---------------------------------------------------------------------------
// Session capture / restore
// ---------------------------------------------------------------------------

impl Session {
    fn fleet_records(&self) -> Vec<FleetRecord> {
        self.entities()
            .map(|entity| FleetRecord {
                entity: entity.clone(),
                queue: self
                    .queue(entity.id)
                    .map(CommandQueue::to_state)
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Capture the session's deterministic state.
    ///
    /// # Errors
    ///
    /// Fails only if the state cannot be serialized for hashing.
    pub fn checkpoint(&self) -> anyhow::Result<SessionCheckpoint> {
        let fleets = self.fleet_records();
        let commanders: Vec<Commander> = self.commanders_map().values().cloned().collect();
        let hash = compute_hash(&HashableState {
            session_id: self.id(),
            tick: self.tick(),
            seed: self.seed(),
            rng: self.rng(),
            next_command_id: self.next_command_id(),
            fleets: &fleets,
            commanders: &commanders,
        })?;
        Ok(SessionCheckpoint {
            session_id: self.id(),
            tick: self.tick(),
            seed: self.seed(),
            rng: self.rng().clone(),
            next_command_id: self.next_command_id(),
            fleets,
            commanders,
            hash,
        })
    }

    /// Digest of the current state, equal to `checkpoint()?.hash`.
    pub fn state_hash(&self) -> anyhow::Result<String> {
        let fleets = self.fleet_records();
        let commanders: Vec<Commander> = self.commanders_map().values().cloned().collect();
        compute_hash(&HashableState {
            session_id: self.id(),
            tick: self.tick(),
            seed: self.seed(),
            rng: self.rng(),
            next_command_id: self.next_command_id(),
            fleets: &fleets,
            commanders: &commanders,
        })
    }

    /// Restore the session to `checkpoint`.
    ///
    /// The hash is verified and every queue rebuilt before anything is
    /// replaced, so on error the session is unchanged.
    ///
    /// # Errors
    ///
    /// A hash mismatch (corruption or tampering), duplicate fleet or
    /// commander ids, or a queue that fails its integrity check.
    pub fn restore(&mut self, checkpoint: &SessionCheckpoint) -> anyhow::Result<()> {
        let recomputed = checkpoint.recompute_hash()?;
        if recomputed != checkpoint.hash {
            anyhow::bail!(
                "checkpoint hash mismatch: recorded {} but recomputed {}",
                checkpoint.hash,
                recomputed
            );
        }

        let settings = self.config().queue_settings();
        let mut fleets = FleetMap::new();
        let mut queues: BTreeMap<EntityId, CommandQueue> = BTreeMap::new();
        for record in &checkpoint.fleets {
            let id = record.entity.id;
            let queue = CommandQueue::from_state(id, settings.clone(), record.queue.clone())
                .map_err(|e| anyhow::anyhow!("queue of {id} is invalid: {e}"))?;
            if fleets.insert(id, record.entity.clone()).is_some() {
                anyhow::bail!("checkpoint lists {id} twice");
            }
            queues.insert(id, queue);
        }

        let mut commanders: BTreeMap<CommanderId, Commander> = BTreeMap::new();
        for commander in &checkpoint.commanders {
            if commanders.insert(commander.id, commander.clone()).is_some() {
                anyhow::bail!("checkpoint lists {} twice", commander.id);
            }
        }

        self.restore_parts(
            checkpoint.tick,
            checkpoint.seed,
            checkpoint.rng.clone(),
            checkpoint.next_command_id,
            fleets,
            commanders,
            queues,
        );
        debug!(session = %self.id(), tick = checkpoint.tick, "checkpoint restored");
        Ok(())
    }
}
