use std::sync::Arc;

use tracing::debug;

use crate::{
    client::{AccountClient, ClientError, DialogInfo},
    domain::{DialogKind, DialogTarget, TargetState},
};

/// Read-only listing of every open conversation for the account.
pub struct DialogEnumerator {
    client: Arc<dyn AccountClient>,
}

impl DialogEnumerator {
    pub fn new(client: Arc<dyn AccountClient>) -> Self {
        Self { client }
    }

    /// Paginate the dialog list until exhaustion and classify each entry.
    ///
    /// The saved-messages dialog and the platform's verification-code relay
    /// account are filtered out here so no executor ever sees them. Errors
    /// are transport conditions; the caller decides whether to retry.
    pub async fn list_targets(&self) -> Result<Vec<DialogTarget>, ClientError> {
        let mut targets = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let page = self.client.dialogs_page(offset.take()).await?;

            for info in &page.dialogs {
                if info.is_self || info.is_service_notifications {
                    continue;
                }
                targets.push(DialogTarget {
                    peer: info.peer,
                    title: info.title.clone(),
                    kind: classify(info),
                    supergroup: info.is_megagroup,
                    archived: info.archived,
                    closed: false,
                    state: TargetState::Pending,
                });
            }

            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        debug!(count = targets.len(), "enumerated dialogs");
        Ok(targets)
    }
}

/// Directory-level discriminants only; titles are never consulted.
fn classify(info: &DialogInfo) -> DialogKind {
    if info.is_broadcast {
        DialogKind::Channel
    } else if info.is_megagroup || info.is_basic_group {
        DialogKind::Group
    } else if info.is_user || info.is_bot {
        DialogKind::Private
    } else {
        DialogKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{dialogs, MockClient};

    #[test]
    fn classification_uses_discriminants() {
        assert_eq!(classify(&dialogs::channel(1, "news")), DialogKind::Channel);
        assert_eq!(classify(&dialogs::group(2, "friends")), DialogKind::Group);
        assert_eq!(
            classify(&dialogs::supergroup(3, "big group")),
            DialogKind::Group
        );
        assert_eq!(classify(&dialogs::user(4, "alice")), DialogKind::Private);
        assert_eq!(classify(&dialogs::bot(5, "somebot")), DialogKind::Private);

        let mut blank = dialogs::user(6, "???");
        blank.is_user = false;
        assert_eq!(classify(&blank), DialogKind::Unknown);
    }

    #[tokio::test]
    async fn paginates_until_exhaustion() {
        let client = Arc::new(MockClient::new().with_dialog_pages(vec![
            vec![dialogs::group(1, "a"), dialogs::channel(2, "b")],
            vec![dialogs::user(3, "c")],
        ]));

        let targets = DialogEnumerator::new(client.clone())
            .list_targets()
            .await
            .unwrap();

        assert_eq!(targets.len(), 3);
        assert_eq!(client.calls_for("dialogs_page").len(), 2);
        assert!(targets.iter().all(|t| t.state == TargetState::Pending));
    }

    #[tokio::test]
    async fn service_and_self_dialogs_are_never_targets() {
        let client = Arc::new(MockClient::new().with_dialog_pages(vec![vec![
            dialogs::service_notifications(),
            dialogs::saved_messages(10),
            dialogs::user(11, "alice"),
        ]]));

        let targets = DialogEnumerator::new(client).list_targets().await.unwrap();

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].peer.chat_id.0, 11);
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let client = Arc::new(MockClient::new().fail(
            "dialogs_page",
            0,
            ClientError::Network("connection reset".to_string()),
        ));

        let err = DialogEnumerator::new(client).list_targets().await;
        assert!(matches!(err, Err(ClientError::Network(_))));
    }
}
