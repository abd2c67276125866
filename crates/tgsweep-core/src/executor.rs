use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    client::AccountClient,
    config::CleanupConfig,
    domain::{
        ActionKind, ActionRecord, ChatId, Contact, DialogKind, DialogTarget, Subject, TargetState,
    },
    errors::Error,
    limiter::RateLimiter,
    retry::{Disposition, RetryPolicy},
    Result,
};

/// Shared context for the per-action executors.
///
/// Every platform call goes through the rate limiter first; every failure
/// goes through the retry policy. Per-target failures come back as records,
/// only account-level failures surface as `Err`.
pub struct ExecutorContext {
    client: Arc<dyn AccountClient>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    revoke_by_default: bool,
    dry_run: bool,
}

impl ExecutorContext {
    pub fn new(client: Arc<dyn AccountClient>, limiter: Arc<RateLimiter>, cfg: &CleanupConfig) -> Self {
        Self {
            client,
            limiter,
            policy: RetryPolicy {
                max_attempts: cfg.max_attempts,
                network_backoff: cfg.network_backoff,
            },
            revoke_by_default: cfg.revoke_by_default,
            dry_run: cfg.dry_run,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Leave one conversation. Channels and supergroups go through the
    /// channel call, basic groups through self-removal; private chats have
    /// nothing to leave and are recorded as skipped.
    pub async fn leave(&self, target: &mut DialogTarget) -> Result<ActionRecord> {
        target.advance(TargetState::Leaving);
        let subject = Subject::from(&*target);

        if matches!(target.kind, DialogKind::Private | DialogKind::Unknown) {
            target.advance(TargetState::Done);
            return Ok(ActionRecord::skipped(
                &subject,
                ActionKind::Leave,
                "not applicable".to_string(),
            ));
        }

        if self.dry_run {
            target.advance(TargetState::Done);
            return Ok(ActionRecord::skipped(
                &subject,
                ActionKind::Leave,
                "dry run".to_string(),
            ));
        }

        let via_channel = target.kind == DialogKind::Channel || target.supergroup;
        let mut attempt = 1u32;
        let record = loop {
            self.limiter.await_turn(target.peer.chat_id).await;
            let res = if via_channel {
                self.client.leave_channel(target.peer).await
            } else {
                self.client.remove_self_from_group(target.peer).await
            };

            match res {
                Ok(()) => {
                    target.closed = true;
                    break ActionRecord::success(&subject, ActionKind::Leave, "left");
                }
                Err(err) => match self.policy.classify(&err, ActionKind::Leave, attempt) {
                    Disposition::WaitAndRetry { wait, reason } => {
                        warn!(chat_id = target.peer.chat_id.0, %reason, "leave will retry");
                        sleep(wait).await;
                        attempt += 1;
                    }
                    Disposition::Skip { reason } => {
                        // Already out of the conversation.
                        target.closed = true;
                        break ActionRecord::skipped(&subject, ActionKind::Leave, reason);
                    }
                    Disposition::Fatal { reason }
                    | Disposition::DegradeAndContinue { reason } => {
                        break ActionRecord::failed(&subject, ActionKind::Leave, reason);
                    }
                    Disposition::Abort { reason } => {
                        return Err(Error::AccountInvalid(reason));
                    }
                },
            }
        };

        target.advance(TargetState::Done);
        Ok(record)
    }

    /// Delete the message history with one peer, bidirectionally when the
    /// job allows it. On permission denial the deletion degrades once to
    /// self-only mode; the revoke call is never attempted again for the
    /// target.
    pub async fn delete_history(&self, target: &mut DialogTarget) -> Result<ActionRecord> {
        target.advance(TargetState::DeletingHistory);
        let subject = Subject::from(&*target);

        if self.dry_run {
            return Ok(ActionRecord::skipped(
                &subject,
                ActionKind::DeleteHistory,
                "dry run".to_string(),
            ));
        }

        let mut revoke = self.revoke_by_default;
        let mut degraded = false;
        let mut attempt = 1u32;
        let record = loop {
            self.limiter.await_turn(target.peer.chat_id).await;
            match self.client.delete_history(target.peer, revoke).await {
                Ok(()) => {
                    break if degraded {
                        ActionRecord::partial(
                            &subject,
                            ActionKind::DeleteHistory,
                            "history_deleted(self_only)",
                            "self-only: insufficient permission for full delete".to_string(),
                        )
                    } else {
                        ActionRecord::success(&subject, ActionKind::DeleteHistory, "history_deleted")
                    };
                }
                Err(err) => match self.policy.classify(&err, ActionKind::DeleteHistory, attempt) {
                    Disposition::WaitAndRetry { wait, reason } => {
                        warn!(
                            chat_id = target.peer.chat_id.0,
                            %reason,
                            "history deletion will retry"
                        );
                        sleep(wait).await;
                        attempt += 1;
                    }
                    Disposition::DegradeAndContinue { .. } => {
                        if revoke && !degraded {
                            degraded = true;
                            revoke = false;
                            info!(
                                chat_id = target.peer.chat_id.0,
                                "falling back to self-only history deletion"
                            );
                        } else {
                            break ActionRecord::failed(
                                &subject,
                                ActionKind::DeleteHistory,
                                "permission denied even for self-only deletion".to_string(),
                            );
                        }
                    }
                    Disposition::Skip { reason } => {
                        break ActionRecord::skipped(&subject, ActionKind::DeleteHistory, reason);
                    }
                    Disposition::Fatal { reason } => {
                        break ActionRecord::failed(&subject, ActionKind::DeleteHistory, reason);
                    }
                    Disposition::Abort { reason } => {
                        return Err(Error::AccountInvalid(reason));
                    }
                },
            }
        };

        Ok(record)
    }

    /// Remove one contact from the address book.
    pub async fn delete_contact(&self, contact: &Contact) -> Result<ActionRecord> {
        let subject = Subject::from(contact);

        if self.dry_run {
            return Ok(ActionRecord::skipped(
                &subject,
                ActionKind::DeleteContact,
                "dry run".to_string(),
            ));
        }

        let mut attempt = 1u32;
        let record = loop {
            self.limiter.await_turn(ChatId(contact.user_id.0)).await;
            match self.client.delete_contact(contact.user_id).await {
                Ok(()) => {
                    break ActionRecord::success(&subject, ActionKind::DeleteContact, "contact_deleted");
                }
                Err(err) => match self.policy.classify(&err, ActionKind::DeleteContact, attempt) {
                    Disposition::WaitAndRetry { wait, reason } => {
                        warn!(user_id = contact.user_id.0, %reason, "contact deletion will retry");
                        sleep(wait).await;
                        attempt += 1;
                    }
                    Disposition::Skip { reason } => {
                        break ActionRecord::skipped(&subject, ActionKind::DeleteContact, reason);
                    }
                    Disposition::Fatal { reason }
                    | Disposition::DegradeAndContinue { reason } => {
                        break ActionRecord::failed(&subject, ActionKind::DeleteContact, reason);
                    }
                    Disposition::Abort { reason } => {
                        return Err(Error::AccountInvalid(reason));
                    }
                },
            }
        };

        Ok(record)
    }

    /// Best-effort archive of one remaining conversation.
    pub async fn archive(&self, target: &mut DialogTarget) -> Result<ActionRecord> {
        let subject = Subject::from(&*target);

        if self.dry_run {
            return Ok(ActionRecord::skipped(
                &subject,
                ActionKind::Archive,
                "dry run".to_string(),
            ));
        }

        let mut attempt = 1u32;
        let record = loop {
            self.limiter.await_turn(target.peer.chat_id).await;
            match self.client.archive_dialog(target.peer).await {
                Ok(()) => {
                    target.archived = true;
                    break ActionRecord::success(&subject, ActionKind::Archive, "archived");
                }
                Err(err) => match self.policy.classify(&err, ActionKind::Archive, attempt) {
                    Disposition::WaitAndRetry { wait, reason } => {
                        warn!(chat_id = target.peer.chat_id.0, %reason, "archive will retry");
                        sleep(wait).await;
                        attempt += 1;
                    }
                    Disposition::Skip { reason } => {
                        break ActionRecord::skipped(&subject, ActionKind::Archive, reason);
                    }
                    Disposition::Fatal { reason }
                    | Disposition::DegradeAndContinue { reason } => {
                        break ActionRecord::failed(&subject, ActionKind::Archive, reason);
                    }
                    Disposition::Abort { reason } => {
                        return Err(Error::AccountInvalid(reason));
                    }
                },
            }
        };

        Ok(record)
    }
}
