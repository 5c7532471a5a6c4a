//! A session on its own thread.
//!
//! [`spawn`] moves a [`TickScheduler`] onto a dedicated thread. Everything
//! else talks to it through a [`SessionHandle`], which sends
//! [`SessionRequest`]s over a crossbeam channel and blocks on a one-shot
//! reply. The thread interleaves requests with ticks from a
//! `crossbeam_channel::tick` timer; requests that arrive before a tick fires
//! are always handled before that tick is processed.
//!
//! Because only the session thread ever touches the scheduler, no locks guard
//! fleet or queue state. Sessions on different threads share nothing except
//! terrain and jamming snapshots.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use helmsman_broadcast::broadcaster::Subscription;
use helmsman_core::command::{Command, CommandId, CommandRequest};
use helmsman_core::entity::EntityId;
use helmsman_core::error::{CancelError, RejectReason};
use helmsman_core::queue::QueuedCommand;
use helmsman_core::terrain::TerrainCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::SessionCheckpoint;
use crate::scheduler::{SchedulerError, SchedulerState, ShutdownMode, TickScheduler};
use crate::session::{MoveOrder, MoveReceipt, SessionId};

type Reply<T> = Sender<T>;

/// Messages accepted by a session thread.
#[derive(Debug)]
pub enum SessionRequest {
    Submit(CommandRequest, Reply<Result<QueuedCommand, RejectReason>>),
    MoveFleet(MoveOrder, Reply<Result<MoveReceipt, RejectReason>>),
    Cancel(CommandId, Reply<Result<Command, CancelError>>),
    InspectQueue(EntityId, Reply<Result<Vec<QueuedCommand>, RejectReason>>),
    Terrain(f64, f64, Reply<TerrainCell>),
    Subscribe(Reply<Subscription>),
    Start(Reply<Result<(), SchedulerError>>),
    Pause(Reply<Result<(), SchedulerError>>),
    Resume(Reply<Result<(), SchedulerError>>),
    Stop(ShutdownMode, Reply<Result<(), SchedulerError>>),
    Checkpoint(Reply<Result<SessionCheckpoint, String>>),
    Status(Reply<SessionStatus>),
    /// End the thread. It returns the scheduler from its join handle.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub state: SchedulerState,
    pub tick: u64,
    pub subscribers: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
}

/// Errors from the handle itself rather than the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("session thread is gone")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable, thread-safe client of one session thread.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    inbox: Sender<SessionRequest>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> SessionRequest) -> Result<T, HandleError> {
        let (tx, rx) = bounded(1);
        self.inbox
            .send(make(tx))
            .map_err(|_| HandleError::Disconnected)?;
        rx.recv().map_err(|_| HandleError::Disconnected)
    }

    pub fn submit(&self, request: CommandRequest) -> Result<QueuedCommand, RejectReason> {
        self.call(|r| SessionRequest::Submit(request, r))
            .unwrap_or(Err(RejectReason::SessionUnavailable))
    }

    pub fn move_fleet(&self, order: MoveOrder) -> Result<MoveReceipt, RejectReason> {
        self.call(|r| SessionRequest::MoveFleet(order, r))
            .unwrap_or(Err(RejectReason::SessionUnavailable))
    }

    pub fn cancel(&self, id: CommandId) -> Result<Command, CancelError> {
        self.call(|r| SessionRequest::Cancel(id, r))
            .unwrap_or(Err(CancelError::SessionUnavailable))
    }

    pub fn inspect_queue(&self, entity: EntityId) -> Result<Vec<QueuedCommand>, RejectReason> {
        self.call(|r| SessionRequest::InspectQueue(entity, r))
            .unwrap_or(Err(RejectReason::SessionUnavailable))
    }

    pub fn terrain_at(&self, x: f64, y: f64) -> Result<TerrainCell, HandleError> {
        self.call(|r| SessionRequest::Terrain(x, y, r))
    }

    pub fn subscribe(&self) -> Result<Subscription, HandleError> {
        self.call(SessionRequest::Subscribe)
    }

    pub fn start(&self) -> Result<Result<(), SchedulerError>, HandleError> {
        self.call(SessionRequest::Start)
    }

    pub fn pause(&self) -> Result<Result<(), SchedulerError>, HandleError> {
        self.call(SessionRequest::Pause)
    }

    pub fn resume(&self) -> Result<Result<(), SchedulerError>, HandleError> {
        self.call(SessionRequest::Resume)
    }

    pub fn stop(&self, mode: ShutdownMode) -> Result<Result<(), SchedulerError>, HandleError> {
        self.call(|r| SessionRequest::Stop(mode, r))
    }

    pub fn checkpoint(&self) -> Result<Result<SessionCheckpoint, String>, HandleError> {
        self.call(SessionRequest::Checkpoint)
    }

    pub fn status(&self) -> Result<SessionStatus, HandleError> {
        self.call(SessionRequest::Status)
    }

    /// Ask the thread to exit. Does not wait for it.
    pub fn shutdown(&self) {
        let _ = self.inbox.send(SessionRequest::Shutdown);
    }
}

// ---------------------------------------------------------------------------
// spawn
// ---------------------------------------------------------------------------

/// Run `scheduler` on a new thread, ticking every `period`.
///
/// # Errors
///
/// If the OS refuses to create the thread.
pub fn spawn(
    scheduler: TickScheduler,
    period: Duration,
) -> std::io::Result<(SessionHandle, JoinHandle<TickScheduler>)> {
    let id = scheduler.id();
    let (tx, rx) = unbounded();
    let join = thread::Builder::new()
        .name(format!("helmsman-{}", id.0))
        .spawn(move || run(scheduler, rx, period))?;
    Ok((SessionHandle { id, inbox: tx }, join))
}

fn run(mut scheduler: TickScheduler, inbox: Receiver<SessionRequest>, period: Duration) -> TickScheduler {
    let ticker = crossbeam_channel::tick(period);
    info!(session = %scheduler.id(), period_ms = period.as_millis() as u64, "session thread started");
    loop {
        select! {
            recv(inbox) -> msg => match msg {
                Ok(request) => {
                    if !handle(&mut scheduler, request) {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                // Orders that raced the timer go first.
                let queued: Vec<SessionRequest> = inbox.try_iter().collect();
                let mut open = true;
                for request in queued {
                    if !handle(&mut scheduler, request) {
                        open = false;
                        break;
                    }
                }
                if !open {
                    break;
                }
                if let Err(e) = scheduler.advance() {
                    debug!(session = %scheduler.id(), error = %e, "tick skipped");
                }
            }
        }
    }
    info!(session = %scheduler.id(), tick = scheduler.tick(), "session thread exiting");
    scheduler
}

/// Handle one request. Returns `false` on shutdown.
fn handle(scheduler: &mut TickScheduler, request: SessionRequest) -> bool {
    // A dropped reply receiver just means the caller stopped waiting.
    match request {
        SessionRequest::Submit(req, reply) => {
            let _ = reply.send(scheduler.submit(req));
        }
        SessionRequest::MoveFleet(order, reply) => {
            let _ = reply.send(scheduler.move_fleet(order));
        }
        SessionRequest::Cancel(id, reply) => {
            let _ = reply.send(scheduler.cancel(id));
        }
        SessionRequest::InspectQueue(entity, reply) => {
            let _ = reply.send(scheduler.inspect_queue(entity));
        }
        SessionRequest::Terrain(x, y, reply) => {
            let _ = reply.send(scheduler.terrain_at(x, y));
        }
        SessionRequest::Subscribe(reply) => {
            let _ = reply.send(scheduler.subscribe());
        }
        SessionRequest::Start(reply) => {
            let _ = reply.send(scheduler.start());
        }
        SessionRequest::Pause(reply) => {
            let _ = reply.send(scheduler.pause());
        }
        SessionRequest::Resume(reply) => {
            let _ = reply.send(scheduler.resume());
        }
        SessionRequest::Stop(mode, reply) => {
            let _ = reply.send(scheduler.stop(mode));
        }
        SessionRequest::Checkpoint(reply) => {
            let _ = reply.send(scheduler.checkpoint().map_err(|e| e.to_string()));
        }
        SessionRequest::Status(reply) => {
            let _ = reply.send(SessionStatus {
                session_id: scheduler.id(),
                state: scheduler.state(),
                tick: scheduler.tick(),
                subscribers: scheduler.subscriber_count(),
                halt_reason: scheduler.halt_reason().map(str::to_owned),
            });
        }
        SessionRequest::Shutdown => {
            if let Err(e) = scheduler.stop(ShutdownMode::Retain) {
                warn!(session = %scheduler.id(), error = %e, "shutdown of a halted session");
            }
            return false;
        }
    }
    true
}
