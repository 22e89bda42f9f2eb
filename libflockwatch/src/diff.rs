//! Follower diffing
//!
//! Compares the current follower list against the last known snapshot,
//! strictly by stable account id. Handles are mutable and never considered.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ApiError;
use crate::fetcher::ConnectionFetcher;
use crate::session::SessionManager;
use crate::store::StateStore;
use crate::types::{Account, ConnectionKind, FollowerDelta};

/// Set difference between two snapshots, keyed by `did`.
///
/// `gained` preserves current-snapshot order, `lost` preserves
/// prior-snapshot order.
pub fn snapshot_delta(prior: &[Account], current: &[Account]) -> FollowerDelta {
    let prior_ids: HashSet<&str> = prior.iter().map(|a| a.did.as_str()).collect();
    let current_ids: HashSet<&str> = current.iter().map(|a| a.did.as_str()).collect();

    FollowerDelta {
        gained: current
            .iter()
            .filter(|a| !prior_ids.contains(a.did.as_str()))
            .cloned()
            .collect(),
        lost: prior
            .iter()
            .filter(|a| !current_ids.contains(a.did.as_str()))
            .cloned()
            .collect(),
    }
}

/// What one follower check did.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// No valid session; nothing was fetched or written.
    Skipped,
    /// First run: the snapshot was seeded, no changes reported.
    Seeded,
    /// A prior snapshot existed and was compared against.
    Diffed(FollowerDelta),
}

pub struct FollowerDiffEngine {
    fetcher: Arc<ConnectionFetcher>,
    session: Arc<SessionManager>,
    store: Arc<StateStore>,
}

impl FollowerDiffEngine {
    pub fn new(
        fetcher: Arc<ConnectionFetcher>,
        session: Arc<SessionManager>,
        store: Arc<StateStore>,
    ) -> Self {
        Self {
            fetcher,
            session,
            store,
        }
    }

    /// Run one diff cycle.
    ///
    /// Fetches the current followers, compares against the stored snapshot
    /// and commits the result: gained/lost prepended to the bounded recent
    /// lists, the snapshot replaced wholesale, the check time stamped. A
    /// fetch failure leaves persisted state untouched.
    pub async fn check(&self) -> Result<CheckOutcome, ApiError> {
        if !self.session.is_valid() {
            debug!("skipping follower check, no active session");
            return Ok(CheckOutcome::Skipped);
        }

        let current = self.fetcher.fetch_all(ConnectionKind::Followers).await?;
        let now = chrono::Utc::now().timestamp();

        let prior = self.store.last_known_followers();
        if prior.is_empty() {
            self.store.seed_followers(current.accounts, now);
            info!("seeded follower snapshot");
            return Ok(CheckOutcome::Seeded);
        }

        let delta = snapshot_delta(&prior, &current.accounts);
        if !delta.is_empty() {
            info!(
                gained = delta.gained.len(),
                lost = delta.lost.len(),
                "follower changes detected"
            );
        }
        self.store.record_check(&delta, current.accounts, now);
        Ok(CheckOutcome::Diffed(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AgentClient, MockClient};
    use crate::error::XrpcError;
    use crate::events::EventBus;
    use crate::executor::{RateLimitLedger, RateLimitedExecutor};
    use crate::store::RECENT_LIST_CAP;
    use secrecy::SecretString;

    fn account(did: &str, handle: &str) -> Account {
        Account::new(did, handle)
    }

    #[test]
    fn test_delta_of_identical_snapshots_is_empty() {
        let snapshot = vec![account("did:plc:a", "a"), account("did:plc:b", "b")];
        let delta = snapshot_delta(&snapshot, &snapshot);
        assert!(delta.gained.is_empty());
        assert!(delta.lost.is_empty());
        assert!(delta.is_empty());
    }

    #[test]
    fn test_delta_partitions_by_id() {
        let prior = vec![account("did:plc:d1", "a"), account("did:plc:d2", "b")];
        let current = vec![account("did:plc:d2", "b"), account("did:plc:d3", "c")];

        let delta = snapshot_delta(&prior, &current);
        assert_eq!(delta.gained.len(), 1);
        assert_eq!(delta.gained[0].did, "did:plc:d3");
        assert_eq!(delta.lost.len(), 1);
        assert_eq!(delta.lost[0].did, "did:plc:d1");
    }

    #[test]
    fn test_handle_change_is_not_a_change() {
        // Same did, renamed handle: neither gained nor lost.
        let prior = vec![account("did:plc:d1", "old.handle")];
        let current = vec![account("did:plc:d1", "new.handle")];
        assert!(snapshot_delta(&prior, &current).is_empty());
    }

    #[test]
    fn test_delta_preserves_source_order() {
        let prior: Vec<Account> = (0..5)
            .map(|i| account(&format!("did:plc:old{}", i), "x"))
            .collect();
        let current: Vec<Account> = (0..5)
            .rev()
            .map(|i| account(&format!("did:plc:new{}", i), "y"))
            .collect();

        let delta = snapshot_delta(&prior, &current);
        // gained in current-snapshot order, lost in prior-snapshot order.
        assert_eq!(delta.gained[0].did, "did:plc:new4");
        assert_eq!(delta.gained[4].did, "did:plc:new0");
        assert_eq!(delta.lost[0].did, "did:plc:old0");
        assert_eq!(delta.lost[4].did, "did:plc:old4");
    }

    struct Harness {
        client: Arc<MockClient>,
        store: Arc<StateStore>,
        session: Arc<SessionManager>,
        engine: FollowerDiffEngine,
    }

    async fn harness(client: MockClient, login: bool) -> Harness {
        let client = Arc::new(client);
        let store = Arc::new(StateStore::in_memory());
        let ledger = Arc::new(RateLimitLedger::new());
        let session = Arc::new(SessionManager::new(
            Arc::clone(&client) as Arc<dyn AgentClient>,
            Arc::clone(&store),
            Arc::clone(&ledger),
            EventBus::new(8),
        ));
        if login {
            session
                .login("viewer.test", &SecretString::from("pw".to_string()))
                .await
                .unwrap();
        }
        let executor = Arc::new(RateLimitedExecutor::new(ledger, Arc::clone(&session)));
        let fetcher = Arc::new(ConnectionFetcher::new(
            Arc::clone(&client) as Arc<dyn AgentClient>,
            executor,
            Arc::clone(&session),
        ));
        let engine = FollowerDiffEngine::new(fetcher, Arc::clone(&session), Arc::clone(&store));
        Harness {
            client,
            store,
            session,
            engine,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_without_session_is_noop() {
        let h = harness(MockClient::new(), false).await;

        let outcome = h.engine.check().await.unwrap();
        assert_eq!(outcome, CheckOutcome::Skipped);
        assert_eq!(h.client.calls("get_followers"), 0);
        assert!(h.store.last_check().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_seeds_without_reporting() {
        let followers = vec![account("did:plc:a", "a"), account("did:plc:b", "b")];
        let h = harness(MockClient::new().with_followers(vec![followers]), true).await;

        let outcome = h.engine.check().await.unwrap();
        assert_eq!(outcome, CheckOutcome::Seeded);
        assert_eq!(h.store.last_known_followers().len(), 2);
        assert!(h.store.last_check().is_some());
        assert!(h.store.recent_followers().is_empty());
        assert!(h.store.recent_unfollowers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_check_reports_and_commits() {
        let h = harness(
            MockClient::new().with_followers(vec![vec![
                account("did:plc:d1", "a"),
                account("did:plc:d2", "b"),
            ]]),
            true,
        )
        .await;
        h.engine.check().await.unwrap();

        h.client.set_followers(vec![vec![
            account("did:plc:d2", "b"),
            account("did:plc:d3", "c"),
        ]]);

        let outcome = h.engine.check().await.unwrap();
        let delta = match outcome {
            CheckOutcome::Diffed(delta) => delta,
            other => panic!("expected a diff, got {:?}", other),
        };
        assert_eq!(delta.gained.len(), 1);
        assert_eq!(delta.gained[0].did, "did:plc:d3");
        assert_eq!(delta.lost.len(), 1);
        assert_eq!(delta.lost[0].did, "did:plc:d1");

        assert_eq!(h.store.recent_followers()[0].did, "did:plc:d3");
        assert_eq!(h.store.recent_unfollowers()[0].did, "did:plc:d1");
        let snapshot = h.store.last_known_followers();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].did, "did:plc:d2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_followers_diff_to_nothing() {
        let followers = vec![account("did:plc:a", "a")];
        let h = harness(MockClient::new().with_followers(vec![followers]), true).await;

        h.engine.check().await.unwrap();
        let outcome = h.engine.check().await.unwrap();
        assert_eq!(outcome, CheckOutcome::Diffed(FollowerDelta::default()));
        assert!(h.store.recent_followers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_leaves_state_untouched() {
        let h = harness(
            MockClient::new().with_followers(vec![vec![account("did:plc:a", "a")]]),
            true,
        )
        .await;
        h.engine.check().await.unwrap();
        let before_check = h.store.last_check();

        h.client.fail_next(
            "get_followers",
            100,
            XrpcError::Network("offline".to_string()),
        );

        let err = h.engine.check().await.unwrap_err();
        assert!(matches!(err, ApiError::FetchAborted(_)));
        assert_eq!(h.store.last_check(), before_check);
        assert_eq!(h.store.last_known_followers().len(), 1);
        assert!(h.store.recent_unfollowers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_lists_stay_capped_across_cycles() {
        // Seed with a large follower set.
        let initial: Vec<Account> = (0..150)
            .map(|i| account(&format!("did:plc:f{}", i), "f"))
            .collect();
        let h = harness(MockClient::new().with_followers(vec![initial]), true).await;
        h.engine.check().await.unwrap();

        // Then lose everyone: 150 candidates against a 100-entry cap.
        h.client.set_followers(vec![vec![account("did:plc:new", "n")]]);
        let outcome = h.engine.check().await.unwrap();
        let delta = match outcome {
            CheckOutcome::Diffed(delta) => delta,
            other => panic!("expected a diff, got {:?}", other),
        };
        assert_eq!(delta.lost.len(), 150);
        assert_eq!(h.store.recent_unfollowers().len(), RECENT_LIST_CAP);
        assert_eq!(h.store.recent_followers().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_after_logout_is_skipped() {
        let h = harness(
            MockClient::new().with_followers(vec![vec![account("did:plc:a", "a")]]),
            true,
        )
        .await;
        h.engine.check().await.unwrap();

        h.session.logout();
        let outcome = h.engine.check().await.unwrap();
        assert_eq!(outcome, CheckOutcome::Skipped);
    }
}
