//! Scriptable account client for tests.
//!
//! Failures are queued per (operation, id) and consumed in order; every call
//! is logged with the virtual-clock instant it was issued at.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::client::{AccountClient, ClientError, DialogInfo, DialogsPage};
use crate::domain::{ChatId, Contact, PeerRef, UserId};

#[derive(Clone, Debug)]
pub struct CallRecord {
    pub op: &'static str,
    pub chat_id: i64,
    pub revoke: Option<bool>,
    pub at: Instant,
}

#[derive(Default)]
struct MockState {
    pages: Vec<Vec<DialogInfo>>,
    contacts: Vec<Contact>,
    failures: HashMap<(&'static str, i64), VecDeque<ClientError>>,
    calls: Vec<CallRecord>,
}

pub struct MockClient {
    state: Mutex<MockState>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_dialog_pages(self, pages: Vec<Vec<DialogInfo>>) -> Self {
        self.state.lock().unwrap().pages = pages;
        self
    }

    pub fn with_contacts(self, contacts: Vec<Contact>) -> Self {
        self.state.lock().unwrap().contacts = contacts;
        self
    }

    /// Queue one failure for the next call of `op` against `id`. Chain the
    /// builder to queue repeated failures.
    pub fn fail(self, op: &'static str, id: i64, err: ClientError) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry((op, id))
            .or_default()
            .push_back(err);
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_for(&self, op: &'static str) -> Vec<CallRecord> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    fn record(&self, op: &'static str, id: i64, revoke: Option<bool>) -> Result<(), ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(CallRecord {
            op,
            chat_id: id,
            revoke,
            at: Instant::now(),
        });
        if let Some(queue) = state.failures.get_mut(&(op, id)) {
            if let Some(err) = queue.pop_front() {
                return Err(err);
            }
        }
        Ok(())
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountClient for MockClient {
    async fn dialogs_page(&self, offset: Option<String>) -> Result<DialogsPage, ClientError> {
        self.record("dialogs_page", 0, None)?;

        let state = self.state.lock().unwrap();
        let idx = offset.and_then(|s| s.parse::<usize>().ok()).unwrap_or(0);
        let dialogs = state.pages.get(idx).cloned().unwrap_or_default();
        let next_offset = if idx + 1 < state.pages.len() {
            Some((idx + 1).to_string())
        } else {
            None
        };
        Ok(DialogsPage {
            dialogs,
            next_offset,
        })
    }

    async fn leave_channel(&self, peer: PeerRef) -> Result<(), ClientError> {
        self.record("leave_channel", peer.chat_id.0, None)
    }

    async fn remove_self_from_group(&self, peer: PeerRef) -> Result<(), ClientError> {
        self.record("remove_self_from_group", peer.chat_id.0, None)
    }

    async fn delete_history(&self, peer: PeerRef, revoke: bool) -> Result<(), ClientError> {
        self.record("delete_history", peer.chat_id.0, Some(revoke))
    }

    async fn contacts(&self) -> Result<Vec<Contact>, ClientError> {
        self.record("contacts", 0, None)?;
        Ok(self.state.lock().unwrap().contacts.clone())
    }

    async fn delete_contact(&self, user_id: UserId) -> Result<(), ClientError> {
        self.record("delete_contact", user_id.0, None)
    }

    async fn archive_dialog(&self, peer: PeerRef) -> Result<(), ClientError> {
        self.record("archive_dialog", peer.chat_id.0, None)
    }
}

/// Raw dialog rows for enumeration tests.
pub mod dialogs {
    use super::*;

    fn blank(id: i64, title: &str) -> DialogInfo {
        DialogInfo {
            peer: PeerRef {
                chat_id: ChatId(id),
                access_hash: Some(id * 1000),
            },
            title: title.to_string(),
            is_broadcast: false,
            is_megagroup: false,
            is_basic_group: false,
            is_user: false,
            is_bot: false,
            is_self: false,
            is_service_notifications: false,
            archived: false,
        }
    }

    pub fn channel(id: i64, title: &str) -> DialogInfo {
        DialogInfo {
            is_broadcast: true,
            ..blank(id, title)
        }
    }

    pub fn supergroup(id: i64, title: &str) -> DialogInfo {
        DialogInfo {
            is_megagroup: true,
            ..blank(id, title)
        }
    }

    pub fn group(id: i64, title: &str) -> DialogInfo {
        DialogInfo {
            is_basic_group: true,
            ..blank(id, title)
        }
    }

    pub fn user(id: i64, title: &str) -> DialogInfo {
        DialogInfo {
            is_user: true,
            ..blank(id, title)
        }
    }

    pub fn bot(id: i64, title: &str) -> DialogInfo {
        DialogInfo {
            is_user: true,
            is_bot: true,
            ..blank(id, title)
        }
    }

    pub fn saved_messages(id: i64) -> DialogInfo {
        DialogInfo {
            is_user: true,
            is_self: true,
            ..blank(id, "Saved Messages")
        }
    }

    pub fn service_notifications() -> DialogInfo {
        DialogInfo {
            is_user: true,
            is_service_notifications: true,
            ..blank(777000, "Telegram")
        }
    }
}

/// Ready-made targets for executor tests.
pub mod targets {
    use crate::domain::{DialogKind, DialogTarget, TargetState};

    use super::*;

    fn target(id: i64, title: &str, kind: DialogKind, supergroup: bool) -> DialogTarget {
        DialogTarget {
            peer: PeerRef {
                chat_id: ChatId(id),
                access_hash: Some(id * 1000),
            },
            title: title.to_string(),
            kind,
            supergroup,
            archived: false,
            closed: false,
            state: TargetState::Pending,
        }
    }

    pub fn channel(id: i64, title: &str) -> DialogTarget {
        target(id, title, DialogKind::Channel, false)
    }

    pub fn supergroup(id: i64, title: &str) -> DialogTarget {
        target(id, title, DialogKind::Group, true)
    }

    pub fn group(id: i64, title: &str) -> DialogTarget {
        target(id, title, DialogKind::Group, false)
    }

    pub fn private(id: i64, title: &str) -> DialogTarget {
        target(id, title, DialogKind::Private, false)
    }
}
