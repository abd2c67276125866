use chrono::Utc;
use serde::Serialize;

/// Telegram chat/peer id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Addressing handle for one conversation (id plus the access hash some
/// peer types require).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PeerRef {
    pub chat_id: ChatId,
    pub access_hash: Option<i64>,
}

/// Conversation kind, resolved once at enumeration time.
///
/// Executors switch on this tag; capabilities are never probed per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogKind {
    Group,
    Channel,
    Private,
    Unknown,
}

impl DialogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogKind::Group => "group",
            DialogKind::Channel => "channel",
            DialogKind::Private => "private",
            DialogKind::Unknown => "unknown",
        }
    }
}

/// Per-target processing sub-state. Moves forward only; each state is
/// visited at most once within a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetState {
    Pending,
    DeletingHistory,
    Leaving,
    Done,
}

/// One conversation subject to cleanup.
///
/// A target is owned by exactly one in-flight task at a time; the
/// orchestrator hands it over by value, so no per-target lock exists.
#[derive(Clone, Debug)]
pub struct DialogTarget {
    pub peer: PeerRef,
    pub title: String,
    pub kind: DialogKind,
    /// Megagroups leave via the channel call even though they report as groups.
    pub supergroup: bool,
    /// Already sitting in the archive folder at enumeration time.
    pub archived: bool,
    /// True once the account is out of the conversation (left it).
    pub closed: bool,
    pub state: TargetState,
}

impl DialogTarget {
    /// Advance the sub-state; backward transitions are ignored.
    pub fn advance(&mut self, next: TargetState) {
        if next > self.state {
            self.state = next;
        }
    }
}

/// One contact in the account's address book.
#[derive(Clone, Debug)]
pub struct Contact {
    pub user_id: UserId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Leave,
    DeleteHistory,
    DeleteContact,
    Archive,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Leave => "leave",
            ActionKind::DeleteHistory => "delete_history",
            ActionKind::DeleteContact => "delete_contact",
            ActionKind::Archive => "archive",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Success,
    Partial,
    Failed,
    Skipped,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Partial => "partial",
            ActionStatus::Failed => "failed",
            ActionStatus::Skipped => "skipped",
        }
    }

    /// Ordering used when merging records into one per-target row:
    /// failed > partial > success > skipped.
    pub fn severity(&self) -> u8 {
        match self {
            ActionStatus::Failed => 3,
            ActionStatus::Partial => 2,
            ActionStatus::Success => 1,
            ActionStatus::Skipped => 0,
        }
    }
}

/// Who an action was performed against. Carries the display fields the
/// report needs alongside the id.
#[derive(Clone, Debug)]
pub struct Subject {
    pub chat_id: ChatId,
    pub title: String,
    pub kind: DialogKind,
}

impl From<&DialogTarget> for Subject {
    fn from(t: &DialogTarget) -> Self {
        Self {
            chat_id: t.peer.chat_id,
            title: t.title.clone(),
            kind: t.kind,
        }
    }
}

impl From<&Contact> for Subject {
    fn from(c: &Contact) -> Self {
        Self {
            chat_id: ChatId(c.user_id.0),
            title: c.name.clone(),
            kind: DialogKind::Private,
        }
    }
}

/// Immutable outcome of one (target, action) attempt. Appended once to the
/// report aggregator, never mutated afterwards.
#[derive(Clone, Debug)]
pub struct ActionRecord {
    pub chat_id: ChatId,
    pub title: String,
    pub kind: DialogKind,
    pub action: ActionKind,
    pub status: ActionStatus,
    /// What actually happened, e.g. `left` or `history_deleted(self_only)`.
    pub done: Option<String>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ActionRecord {
    fn new(
        subject: &Subject,
        action: ActionKind,
        status: ActionStatus,
        done: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            chat_id: subject.chat_id,
            title: subject.title.clone(),
            kind: subject.kind,
            action,
            status,
            done,
            error,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn success(subject: &Subject, action: ActionKind, done: &str) -> Self {
        Self::new(
            subject,
            action,
            ActionStatus::Success,
            Some(done.to_string()),
            None,
        )
    }

    pub fn partial(subject: &Subject, action: ActionKind, done: &str, error: String) -> Self {
        Self::new(
            subject,
            action,
            ActionStatus::Partial,
            Some(done.to_string()),
            Some(error),
        )
    }

    pub fn failed(subject: &Subject, action: ActionKind, error: String) -> Self {
        Self::new(subject, action, ActionStatus::Failed, None, Some(error))
    }

    pub fn skipped(subject: &Subject, action: ActionKind, reason: String) -> Self {
        Self::new(subject, action, ActionStatus::Skipped, None, Some(reason))
    }
}

/// Running statistics for one cleanup job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub groups_left: u64,
    pub channels_left: u64,
    pub histories_deleted: u64,
    pub contacts_deleted: u64,
    pub dialogs_closed: u64,
    pub errors: u64,
    pub skipped: u64,
}
