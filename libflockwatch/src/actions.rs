//! Relationship mutations
//!
//! Follow, block and mute are idempotent toggles keyed `{action}-{did}`,
//! routed through the executor like every other call. Each one re-fetches
//! the target profile afterwards so displayed counts stay fresh; a failed
//! refresh is logged and the stale profile is returned instead.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::AgentClient;
use crate::error::ApiError;
use crate::executor::RateLimitedExecutor;
use crate::store::StateStore;
use crate::types::Account;

pub struct RelationshipActions {
    client: Arc<dyn AgentClient>,
    executor: Arc<RateLimitedExecutor>,
    store: Arc<StateStore>,
}

impl RelationshipActions {
    pub fn new(
        client: Arc<dyn AgentClient>,
        executor: Arc<RateLimitedExecutor>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            client,
            executor,
            store,
        }
    }

    /// Follow the account, or unfollow when a follow relation exists.
    pub async fn toggle_follow(&self, profile: &Account) -> Result<Account, ApiError> {
        let did = profile.did.clone();
        let key = format!("follow-{}", did);

        if let Some(reference) = profile.viewer.following.clone() {
            let rkey = record_key(&reference)?.to_string();
            self.executor
                .execute(&key, || {
                    let client = Arc::clone(&self.client);
                    let rkey = rkey.clone();
                    async move { client.delete_follow(&rkey).await }
                })
                .await
                .map_err(action_error)?;
            info!(%did, "unfollowed");
        } else {
            self.executor
                .execute(&key, || {
                    let client = Arc::clone(&self.client);
                    let did = did.clone();
                    async move { client.create_follow(&did).await.map(|_| ()) }
                })
                .await
                .map_err(action_error)?;
            info!(%did, "followed");
        }

        Ok(self.refresh_profile(profile).await)
    }

    /// Block the account, or unblock when a block relation exists.
    ///
    /// Unblocking needs the record key parsed from the relation reference;
    /// a reference without one is [`ApiError::InvalidRecord`].
    pub async fn toggle_block(&self, profile: &Account) -> Result<Account, ApiError> {
        let did = profile.did.clone();
        let key = format!("block-{}", did);

        if let Some(reference) = profile.viewer.blocking.clone() {
            let rkey = record_key(&reference)?.to_string();
            self.executor
                .execute(&key, || {
                    let client = Arc::clone(&self.client);
                    let rkey = rkey.clone();
                    async move { client.delete_block(&rkey).await }
                })
                .await
                .map_err(action_error)?;
            info!(%did, "unblocked");
        } else {
            self.executor
                .execute(&key, || {
                    let client = Arc::clone(&self.client);
                    let did = did.clone();
                    async move { client.create_block(&did).await.map(|_| ()) }
                })
                .await
                .map_err(action_error)?;
            info!(%did, "blocked");
        }

        Ok(self.refresh_profile(profile).await)
    }

    /// Mute the account, or unmute when the mute set says it is muted.
    ///
    /// The in-memory mute set is the display source of truth and is updated
    /// only after the server call succeeds.
    pub async fn toggle_mute(&self, profile: &Account) -> Result<Account, ApiError> {
        let did = profile.did.clone();
        let key = format!("mute-{}", did);

        if self.store.is_muted(&did) {
            self.executor
                .execute(&key, || {
                    let client = Arc::clone(&self.client);
                    let did = did.clone();
                    async move { client.unmute_actor(&did).await }
                })
                .await
                .map_err(action_error)?;
            self.store.remove_mute(&did);
            info!(%did, "unmuted");
        } else {
            self.executor
                .execute(&key, || {
                    let client = Arc::clone(&self.client);
                    let did = did.clone();
                    async move { client.mute_actor(&did).await }
                })
                .await
                .map_err(action_error)?;
            self.store.add_mute(&did);
            info!(%did, "muted");
        }

        Ok(self.refresh_profile(profile).await)
    }

    /// Best-effort profile refresh after a mutation.
    async fn refresh_profile(&self, profile: &Account) -> Account {
        let key = format!("profile-refresh-{}", profile.did);
        let result = self
            .executor
            .execute(&key, || {
                let client = Arc::clone(&self.client);
                let did = profile.did.clone();
                async move { client.get_profile(&did).await }
            })
            .await;

        match result {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(%err, did = %profile.did, "profile refresh failed");
                profile.clone()
            }
        }
    }
}

/// Extract the record key from a relation reference: the last path segment
/// of its AT-URI.
pub(crate) fn record_key(reference: &str) -> Result<&str, ApiError> {
    match reference.rsplit_once('/') {
        Some((_, rkey)) if !rkey.is_empty() => Ok(rkey),
        _ => Err(ApiError::InvalidRecord(format!(
            "no record key in reference: {}",
            reference
        ))),
    }
}

/// Unclassified mutation failures become the generic action error; the
/// specific taxonomy classes pass through.
fn action_error(err: ApiError) -> ApiError {
    match err {
        ApiError::Transport(inner) => ApiError::Action(inner.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClient;
    use crate::error::XrpcError;
    use crate::events::EventBus;
    use crate::executor::RateLimitLedger;
    use crate::session::SessionManager;
    use secrecy::SecretString;

    #[test]
    fn test_record_key_parses_last_segment() {
        let uri = "at://did:plc:me/app.bsky.graph.block/3k2aexample";
        assert_eq!(record_key(uri).unwrap(), "3k2aexample");
    }

    #[test]
    fn test_record_key_rejects_malformed_references() {
        assert!(matches!(
            record_key("no-slashes-here"),
            Err(ApiError::InvalidRecord(_))
        ));
        assert!(matches!(
            record_key("at://did:plc:me/app.bsky.graph.block/"),
            Err(ApiError::InvalidRecord(_))
        ));
        assert!(matches!(record_key(""), Err(ApiError::InvalidRecord(_))));
    }

    struct Harness {
        client: Arc<MockClient>,
        store: Arc<StateStore>,
        actions: RelationshipActions,
    }

    async fn harness(client: MockClient) -> Harness {
        let client = Arc::new(client);
        let store = Arc::new(StateStore::in_memory());
        let ledger = Arc::new(RateLimitLedger::new());
        let session = Arc::new(SessionManager::new(
            Arc::clone(&client) as Arc<dyn AgentClient>,
            Arc::clone(&store),
            Arc::clone(&ledger),
            EventBus::new(8),
        ));
        session
            .login("viewer.test", &SecretString::from("pw".to_string()))
            .await
            .unwrap();
        let executor = Arc::new(RateLimitedExecutor::new(ledger, session));
        let actions = RelationshipActions::new(
            Arc::clone(&client) as Arc<dyn AgentClient>,
            executor,
            Arc::clone(&store),
        );
        Harness {
            client,
            store,
            actions,
        }
    }

    fn target() -> Account {
        Account::new("did:plc:target", "target.test")
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_when_not_following() {
        let h = harness(MockClient::new().with_profile(target())).await;

        let refreshed = h.actions.toggle_follow(&target()).await.unwrap();
        assert_eq!(h.client.calls("create_follow"), 1);
        assert_eq!(h.client.calls("delete_follow"), 0);
        assert_eq!(h.client.calls("get_profile"), 1);
        assert_eq!(refreshed.did, "did:plc:target");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfollow_when_following() {
        let h = harness(MockClient::new().with_profile(target())).await;

        let mut profile = target();
        profile.viewer.following =
            Some("at://did:plc:viewer/app.bsky.graph.follow/3kfollow".to_string());

        h.actions.toggle_follow(&profile).await.unwrap();
        assert_eq!(h.client.calls("delete_follow"), 1);
        assert_eq!(h.client.calls("create_follow"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_then_unblock_round_trip() {
        let h = harness(MockClient::new().with_profile(target())).await;

        h.actions.toggle_block(&target()).await.unwrap();
        assert_eq!(h.client.calls("create_block"), 1);

        let mut blocked = target();
        blocked.viewer.blocking =
            Some("at://did:plc:viewer/app.bsky.graph.block/3kblock".to_string());
        h.actions.toggle_block(&blocked).await.unwrap();
        assert_eq!(h.client.calls("delete_block"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unblock_with_malformed_reference_fails_without_calling() {
        let h = harness(MockClient::new().with_profile(target())).await;

        let mut blocked = target();
        blocked.viewer.blocking = Some("opaque-without-a-key/".to_string());

        let err = h.actions.toggle_block(&blocked).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRecord(_)));
        assert_eq!(h.client.calls("delete_block"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_toggle_round_trips_the_set() {
        let h = harness(MockClient::new().with_profile(target())).await;
        assert!(!h.store.is_muted("did:plc:target"));

        h.actions.toggle_mute(&target()).await.unwrap();
        assert!(h.store.is_muted("did:plc:target"));
        assert_eq!(h.client.calls("mute_actor"), 1);

        h.actions.toggle_mute(&target()).await.unwrap();
        assert!(!h.store.is_muted("did:plc:target"));
        assert_eq!(h.client.calls("unmute_actor"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_mute_leaves_set_untouched() {
        let h = harness(MockClient::new().with_profile(target())).await;
        h.client.fail_next(
            "mute_actor",
            1,
            XrpcError::Status {
                status: 400,
                message: "InvalidRequest".to_string(),
            },
        );

        let err = h.actions.toggle_mute(&target()).await.unwrap_err();
        assert!(matches!(err, ApiError::Action(_)));
        assert!(!h.store.is_muted("did:plc:target"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_returns_stale_profile() {
        // No scripted profile: every get_profile fails.
        let h = harness(MockClient::new()).await;

        let stale = target();
        let returned = h.actions.toggle_follow(&stale).await.unwrap();
        assert_eq!(returned, stale);
        assert_eq!(h.client.calls("create_follow"), 1);
        assert_eq!(h.client.calls("get_profile"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_specific_error_classes_pass_through() {
        let h = harness(MockClient::new().with_profile(target())).await;
        h.client.fail_next(
            "create_follow",
            100,
            XrpcError::Status {
                status: 429,
                message: "RateLimitExceeded".to_string(),
            },
        );

        let err = h.actions.toggle_follow(&target()).await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited(_)));
        // Initial attempt plus the full retry budget.
        assert_eq!(h.client.calls("create_follow"), 4);
    }
}
