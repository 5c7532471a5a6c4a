//! Request/response surface for game clients.
//!
//! Request and response bodies are camelCase JSON. Every response carries an
//! explicit `success` flag; failures carry a machine-readable `code` and a
//! human-readable `message`.
//!
//! | Operation         | Request                | Response data            |
//! |-------------------|------------------------|--------------------------|
//! | `move_fleet`      | [`MoveFleetRequest`]   | [`MoveFleetData`]        |
//! | `issue_command`   | [`IssueCommandRequest`]| [`QueuedCommand`]        |
//! | `terrain`         | [`TerrainQuery`]       | [`TerrainCell`]          |
//! | `command_queue`   | [`CommandQueueQuery`]  | `Vec<QueuedCommand>`     |
//! | `cancel_command`  | [`CancelCommandRequest`] | [`CancelResponse`] (unwrapped) |
//!
//! State updates are pushed separately, as
//! [`PushMessage`](helmsman_broadcast::delta::PushMessage)s on each
//! session's subscriptions.

use helmsman_core::command::{CommandId, CommandRequest, Priority};
use helmsman_core::entity::{CommanderId, EntityId};
use helmsman_core::error::{CancelError, RejectReason};
use helmsman_core::geometry::Point;
use helmsman_core::queue::QueuedCommand;
use helmsman_core::terrain::TerrainCell;
use helmsman_core::warp::WarpOutcome;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::registry::SessionRegistry;
use crate::runner::{HandleError, SessionHandle};
use crate::session::{MoveOrder, MoveReceipt, SessionId};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_owned(),
            message: message.into(),
        }
    }

    fn unknown_session(id: SessionId) -> Self {
        Self::new("unknown_session", format!("{id} does not exist"))
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }
}

impl From<RejectReason> for ApiError {
    fn from(reason: RejectReason) -> Self {
        Self::new(reason.code(), reason.to_string())
    }
}

impl From<CancelError> for ApiError {
    fn from(err: CancelError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

impl From<HandleError> for ApiError {
    fn from(err: HandleError) -> Self {
        Self::new("session_unavailable", err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<ApiError>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl<T, E: Into<ApiError>> From<Result<T, E>> for ApiResponse<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFleetRequest {
    pub session_id: SessionId,
    pub fleet_id: EntityId,
    pub target: Point,
    pub controller_character_id: CommanderId,
    #[serde(default)]
    pub warp: bool,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveFleetData {
    pub queued_command: QueuedCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warp_outcome: Option<WarpOutcome>,
}

impl From<MoveReceipt> for MoveFleetData {
    fn from(receipt: MoveReceipt) -> Self {
        Self {
            queued_command: receipt.queued_command,
            warp_outcome: receipt.warp_outcome,
        }
    }
}

/// Any order, in the generic command shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCommandRequest {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub request: CommandRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainQuery {
    pub session_id: SessionId,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandQueueQuery {
    pub session_id: SessionId,
    pub entity_id: EntityId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelCommandRequest {
    pub session_id: SessionId,
    pub command_id: CommandId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
    /// Machine-readable code when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CancelResponse {
    fn refused(error: ApiError) -> Self {
        Self {
            success: false,
            reason: Some(error.code),
            message: Some(error.message),
        }
    }
}

// ---------------------------------------------------------------------------
// Api
// ---------------------------------------------------------------------------

/// Client-facing operations over a [`SessionRegistry`].
#[derive(Debug)]
pub struct Api<'a> {
    registry: &'a SessionRegistry,
}

impl<'a> Api<'a> {
    pub fn new(registry: &'a SessionRegistry) -> Self {
        Self { registry }
    }

    fn session(&self, id: SessionId) -> Result<SessionHandle, ApiError> {
        self.registry
            .get(id)
            .ok_or_else(|| ApiError::unknown_session(id))
    }

    pub fn move_fleet(&self, req: MoveFleetRequest) -> ApiResponse<MoveFleetData> {
        let handle = match self.session(req.session_id) {
            Ok(h) => h,
            Err(e) => return ApiResponse::err(e),
        };
        handle
            .move_fleet(MoveOrder {
                entity_id: req.fleet_id,
                issuer: req.controller_character_id,
                target: req.target,
                warp: req.warp,
                priority: req.priority,
            })
            .map(MoveFleetData::from)
            .into()
    }

    pub fn issue_command(&self, req: IssueCommandRequest) -> ApiResponse<QueuedCommand> {
        match self.session(req.session_id) {
            Ok(h) => h.submit(req.request).into(),
            Err(e) => ApiResponse::err(e),
        }
    }

    pub fn terrain(&self, query: TerrainQuery) -> ApiResponse<TerrainCell> {
        match self.session(query.session_id) {
            Ok(h) => h.terrain_at(query.x, query.y).into(),
            Err(e) => ApiResponse::err(e),
        }
    }

    pub fn command_queue(&self, query: CommandQueueQuery) -> ApiResponse<Vec<QueuedCommand>> {
        match self.session(query.session_id) {
            Ok(h) => h.inspect_queue(query.entity_id).into(),
            Err(e) => ApiResponse::err(e),
        }
    }

    pub fn cancel_command(&self, req: CancelCommandRequest) -> CancelResponse {
        let result = self
            .session(req.session_id)
            .and_then(|h| h.cancel(req.command_id).map_err(ApiError::from));
        match result {
            Ok(_) => CancelResponse {
                success: true,
                reason: None,
                message: None,
            },
            Err(e) => CancelResponse::refused(e),
        }
    }

    /// Route a JSON request body to `op` and return the JSON response.
    pub fn dispatch(&self, op: &str, body: &str) -> String {
        debug!(op, bytes = body.len(), "api request");
        match op {
            "move_fleet" => self.call(body, |req| self.move_fleet(req)),
            "issue_command" => self.call(body, |req| self.issue_command(req)),
            "terrain" => self.call(body, |req| self.terrain(req)),
            "command_queue" => self.call(body, |req| self.command_queue(req)),
            "cancel_command" => match serde_json::from_str(body) {
                Ok(req) => to_json(&self.cancel_command(req)),
                Err(e) => to_json(&CancelResponse::refused(ApiError::bad_request(e.to_string()))),
            },
            other => to_json(&ApiResponse::<()>::err(ApiError::bad_request(format!(
                "unknown operation {other:?}"
            )))),
        }
    }

    fn call<Req, Resp>(&self, body: &str, f: impl FnOnce(Req) -> ApiResponse<Resp>) -> String
    where
        Req: DeserializeOwned,
        Resp: Serialize,
    {
        match serde_json::from_str::<Req>(body) {
            Ok(req) => to_json(&f(req)),
            Err(e) => to_json(&ApiResponse::<Resp>::err(ApiError::bad_request(e.to_string()))),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        format!(r#"{{"success":false,"error":{{"code":"internal","message":{:?}}}}}"#, e.to_string())
    })
}
