use std::time::Duration;

use crate::{client::ClientError, domain::ActionKind};

/// What an executor should do with one failed attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Wait, then repeat the same call. Bounded by `RetryPolicy::max_attempts`.
    WaitAndRetry { wait: Duration, reason: String },
    /// Repeat once in a narrower mode (self-only history deletion).
    DegradeAndContinue { reason: String },
    /// Nothing left to do for this target; record `skipped`.
    Skip { reason: String },
    /// Give up on this target; record `failed`, the job continues.
    Fatal { reason: String },
    /// The whole job must stop (account unusable).
    Abort { reason: String },
}

/// Pure classification of client failures, decoupled from how executors
/// wait. `attempt` is 1-based: the first call is attempt 1.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub network_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            network_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn classify(&self, err: &ClientError, action: ActionKind, attempt: u32) -> Disposition {
        match err {
            ClientError::FloodWait(wait) => {
                if attempt < self.max_attempts {
                    Disposition::WaitAndRetry {
                        wait: *wait,
                        reason: format!("flood wait {}s", wait.as_secs()),
                    }
                } else {
                    Disposition::Fatal {
                        reason: format!(
                            "flood wait {}s, gave up after {attempt} attempts",
                            wait.as_secs()
                        ),
                    }
                }
            }
            ClientError::PermissionDenied(detail) => {
                if action == ActionKind::DeleteHistory {
                    Disposition::DegradeAndContinue {
                        reason: "self_only".to_string(),
                    }
                } else {
                    Disposition::Fatal {
                        reason: format!("permission denied: {detail}"),
                    }
                }
            }
            ClientError::PeerNotFound(detail) => Disposition::Fatal {
                reason: format!("peer not found: {detail}"),
            },
            ClientError::Network(detail) | ClientError::Timeout(detail) => {
                if attempt < self.max_attempts {
                    Disposition::WaitAndRetry {
                        wait: self.network_backoff,
                        reason: detail.clone(),
                    }
                } else {
                    Disposition::Fatal {
                        reason: format!("{detail} (after {attempt} attempts)"),
                    }
                }
            }
            ClientError::AlreadyGone(detail) => Disposition::Skip {
                reason: detail.clone(),
            },
            ClientError::Unauthorized(detail) => Disposition::Abort {
                reason: detail.clone(),
            },
            ClientError::Other(detail) => Disposition::Fatal {
                reason: detail.clone(),
            },
        }
    }

    /// Classification for the (read-only) dialog enumeration, which has no
    /// action kind and no degraded mode.
    pub fn classify_enumeration(&self, err: &ClientError, attempt: u32) -> Disposition {
        match err {
            ClientError::Unauthorized(detail) => Disposition::Abort {
                reason: detail.clone(),
            },
            ClientError::FloodWait(_) | ClientError::Network(_) | ClientError::Timeout(_) => {
                self.classify(err, ActionKind::Leave, attempt)
            }
            other => Disposition::Fatal {
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[test]
    fn flood_wait_retries_then_escalates() {
        let err = ClientError::FloodWait(Duration::from_secs(5));

        match policy().classify(&err, ActionKind::Leave, 1) {
            Disposition::WaitAndRetry { wait, .. } => assert_eq!(wait, Duration::from_secs(5)),
            other => panic!("expected retry, got {other:?}"),
        }

        // The wait reason is preserved once attempts run out.
        match policy().classify(&err, ActionKind::Leave, 3) {
            Disposition::Fatal { reason } => assert!(reason.contains("flood wait 5s")),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn permission_denied_degrades_only_history_deletion() {
        let err = ClientError::PermissionDenied("CHAT_WRITE_FORBIDDEN".to_string());

        assert_eq!(
            policy().classify(&err, ActionKind::DeleteHistory, 1),
            Disposition::DegradeAndContinue {
                reason: "self_only".to_string()
            }
        );

        match policy().classify(&err, ActionKind::Leave, 1) {
            Disposition::Fatal { reason } => assert!(reason.contains("CHAT_WRITE_FORBIDDEN")),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn network_failures_use_fixed_backoff() {
        let err = ClientError::Timeout("read timed out".to_string());

        match policy().classify(&err, ActionKind::DeleteContact, 2) {
            Disposition::WaitAndRetry { wait, .. } => {
                assert_eq!(wait, policy().network_backoff);
            }
            other => panic!("expected retry, got {other:?}"),
        }

        assert!(matches!(
            policy().classify(&err, ActionKind::DeleteContact, 3),
            Disposition::Fatal { .. }
        ));
    }

    #[test]
    fn not_found_is_fatal_with_verbatim_reason() {
        let err = ClientError::PeerNotFound("PEER_ID_INVALID".to_string());
        match policy().classify(&err, ActionKind::DeleteHistory, 1) {
            Disposition::Fatal { reason } => assert!(reason.contains("PEER_ID_INVALID")),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn already_gone_is_skipped() {
        let err = ClientError::AlreadyGone("not a participant".to_string());
        assert_eq!(
            policy().classify(&err, ActionKind::Leave, 1),
            Disposition::Skip {
                reason: "not a participant".to_string()
            }
        );
    }

    #[test]
    fn unauthorized_aborts_the_job() {
        let err = ClientError::Unauthorized("AUTH_KEY_UNREGISTERED".to_string());
        assert!(matches!(
            policy().classify(&err, ActionKind::Leave, 1),
            Disposition::Abort { .. }
        ));
        assert!(matches!(
            policy().classify_enumeration(&err, 1),
            Disposition::Abort { .. }
        ));
    }

    #[test]
    fn enumeration_retries_transient_failures() {
        let err = ClientError::Network("connection reset".to_string());
        assert!(matches!(
            policy().classify_enumeration(&err, 1),
            Disposition::WaitAndRetry { .. }
        ));
        assert!(matches!(
            policy().classify_enumeration(&err, 3),
            Disposition::Fatal { .. }
        ));
        // Anything non-transient is not worth blind retries.
        let denied = ClientError::PermissionDenied("nope".to_string());
        assert!(matches!(
            policy().classify_enumeration(&denied, 1),
            Disposition::Fatal { .. }
        ));
    }
}
