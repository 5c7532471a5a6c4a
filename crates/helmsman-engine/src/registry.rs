//! Live sessions by id.

use std::collections::BTreeMap;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use crate::runner::{self, SessionHandle};
use crate::scheduler::TickScheduler;
use crate::session::SessionId;

/// Owns the session threads of one server.
///
/// Dropping the registry shuts every session down and joins its thread.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, (SessionHandle, JoinHandle<TickScheduler>)>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} is already running")]
    Duplicate(SessionId),

    #[error("failed to start session thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `scheduler` on its own thread with the tick period from its
    /// configuration.
    pub fn spawn(&mut self, scheduler: TickScheduler) -> Result<SessionHandle, RegistryError> {
        let period = scheduler.config().tick_period();
        self.spawn_with_period(scheduler, period)
    }

    pub fn spawn_with_period(
        &mut self,
        scheduler: TickScheduler,
        period: Duration,
    ) -> Result<SessionHandle, RegistryError> {
        let id = scheduler.id();
        if self.sessions.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        let (handle, join) = runner::spawn(scheduler, period)?;
        self.sessions.insert(id, (handle.clone(), join));
        info!(session = %id, live = self.sessions.len(), "session registered");
        Ok(handle)
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|(h, _)| h.clone())
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Stop a session's thread and hand back its scheduler.
    pub fn shutdown(&mut self, id: SessionId) -> Option<TickScheduler> {
        let (handle, join) = self.sessions.remove(&id)?;
        handle.shutdown();
        match join.join() {
            Ok(scheduler) => Some(scheduler),
            Err(_) => {
                warn!(session = %id, "session thread panicked");
                None
            }
        }
    }

    pub fn shutdown_all(&mut self) -> Vec<TickScheduler> {
        let ids = self.ids();
        ids.into_iter().filter_map(|id| self.shutdown(id)).collect()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
