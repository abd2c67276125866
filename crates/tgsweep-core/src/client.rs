use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Contact, PeerRef, UserId};

/// Errors surfaced by an account client.
///
/// Adapters map their transport-specific failures into this taxonomy so
/// retry classification stays uniform across implementations.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// Platform demands a pause before the call may be repeated.
    #[error("flood wait: retry in {}s", .0.as_secs())]
    FloodWait(Duration),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// The requested mutation has nothing left to do (already left the
    /// conversation, history already empty).
    #[error("already gone: {0}")]
    AlreadyGone(String),

    /// The account itself can no longer issue requests (logged out, banned).
    #[error("account unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Other(String),
}

/// One raw dialog row exactly as the directory reports it.
///
/// Classification relies on these discriminants only; titles are never
/// consulted.
#[derive(Clone, Debug)]
pub struct DialogInfo {
    pub peer: PeerRef,
    pub title: String,
    pub is_broadcast: bool,
    pub is_megagroup: bool,
    pub is_basic_group: bool,
    pub is_user: bool,
    pub is_bot: bool,
    pub is_self: bool,
    /// The platform's verification-code relay account. Must never be
    /// targeted by any cleanup action.
    pub is_service_notifications: bool,
    pub archived: bool,
}

/// One page of the dialog list.
#[derive(Clone, Debug, Default)]
pub struct DialogsPage {
    pub dialogs: Vec<DialogInfo>,
    /// Opaque offset for the next page; `None` when exhausted.
    pub next_offset: Option<String>,
}

/// Hexagonal port for an authenticated account connection.
///
/// The engine never authenticates; collaborators hand it a handle that can
/// already issue requests. All calls are single platform operations, with
/// retry and pacing living on the engine side.
#[async_trait]
pub trait AccountClient: Send + Sync {
    async fn dialogs_page(&self, offset: Option<String>) -> Result<DialogsPage, ClientError>;

    /// Leave a broadcast channel or supergroup.
    async fn leave_channel(&self, peer: PeerRef) -> Result<(), ClientError>;

    /// Remove the account from an ordinary (basic) group.
    async fn remove_self_from_group(&self, peer: PeerRef) -> Result<(), ClientError>;

    /// Delete the message history with a peer. `revoke = true` erases the
    /// messages for all participants, not just the local view.
    async fn delete_history(&self, peer: PeerRef, revoke: bool) -> Result<(), ClientError>;

    async fn contacts(&self) -> Result<Vec<Contact>, ClientError>;

    async fn delete_contact(&self, user_id: UserId) -> Result<(), ClientError>;

    /// Move a conversation into the archive folder.
    async fn archive_dialog(&self, peer: PeerRef) -> Result<(), ClientError>;
}
