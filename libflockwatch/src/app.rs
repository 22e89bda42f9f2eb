//! Composition root
//!
//! [`Flockwatch`] wires the client, session, executor, fetcher, diff engine,
//! actions and store together and exposes the whole UI-facing surface. Every
//! error that leaves this facade is already displayable text via `Display`.

use std::collections::BTreeSet;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::warn;

use crate::actions::RelationshipActions;
use crate::client::{AgentClient, Session, XrpcClient};
use crate::config::Config;
use crate::diff::{CheckOutcome, FollowerDiffEngine};
use crate::error::{ApiError, Result};
use crate::events::{EventBus, EventReceiver};
use crate::executor::{RateLimitLedger, RateLimitedExecutor};
use crate::fetcher::ConnectionFetcher;
use crate::session::SessionManager;
use crate::store::StateStore;
use crate::types::{Account, ConnectionKind, Snapshot};
use crate::watcher::FollowerWatcher;

pub struct Flockwatch {
    session: Arc<SessionManager>,
    executor: Arc<RateLimitedExecutor>,
    fetcher: Arc<ConnectionFetcher>,
    engine: Arc<FollowerDiffEngine>,
    actions: RelationshipActions,
    watcher: FollowerWatcher,
    store: Arc<StateStore>,
    client: Arc<dyn AgentClient>,
    events: EventBus,
}

impl Flockwatch {
    /// Build against a live PDS from configuration.
    pub fn new(config: Config) -> Result<Self> {
        let client = Arc::new(XrpcClient::new(config.service.url.as_str()).map_err(ApiError::from)?);
        Self::with_client(config, client)
    }

    /// Build with any client implementation; this is also the seam tests and
    /// offline embedders use.
    pub fn with_client(config: Config, client: Arc<dyn AgentClient>) -> Result<Self> {
        let store = if config.storage.persist_state {
            Arc::new(StateStore::load(config.storage.resolve_state_path()?)?)
        } else {
            Arc::new(StateStore::in_memory())
        };

        let events = EventBus::default();
        let ledger = Arc::new(RateLimitLedger::new());
        let session = Arc::new(SessionManager::new(
            Arc::clone(&client),
            Arc::clone(&store),
            Arc::clone(&ledger),
            events.clone(),
        ));
        let executor = Arc::new(RateLimitedExecutor::new(
            Arc::clone(&ledger),
            Arc::clone(&session),
        ));
        let fetcher = Arc::new(ConnectionFetcher::new(
            Arc::clone(&client),
            Arc::clone(&executor),
            Arc::clone(&session),
        ));
        let engine = Arc::new(FollowerDiffEngine::new(
            Arc::clone(&fetcher),
            Arc::clone(&session),
            Arc::clone(&store),
        ));
        let actions = RelationshipActions::new(
            Arc::clone(&client),
            Arc::clone(&executor),
            Arc::clone(&store),
        );
        let watcher = FollowerWatcher::new(
            Arc::clone(&engine),
            Arc::clone(&store),
            events.clone(),
            config.watcher.interval()?,
        );

        Ok(Self {
            session,
            executor,
            fetcher,
            engine,
            actions,
            watcher,
            store,
            client,
            events,
        })
    }

    // ------------------------------------------------------------------
    // Session

    /// Log in and start the periodic follower watcher.
    pub async fn login(&self, identifier: &str, password: &SecretString) -> Result<Session> {
        let session = self.session.login(identifier, password).await?;
        self.watcher.start();
        Ok(session)
    }

    /// Stop the watcher and clear session plus derived state.
    pub fn logout(&self) {
        self.watcher.stop();
        self.session.logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_valid()
    }

    pub fn session(&self) -> Option<Session> {
        self.session.current()
    }

    // ------------------------------------------------------------------
    // Lists

    pub async fn followers(&self) -> Result<Snapshot> {
        Ok(self.fetcher.fetch_all(ConnectionKind::Followers).await?)
    }

    pub async fn following(&self) -> Result<Snapshot> {
        Ok(self.fetcher.fetch_all(ConnectionKind::Following).await?)
    }

    /// Follower and following counts, fetched concurrently.
    pub async fn totals(&self) -> Result<(usize, usize)> {
        let (followers, following) =
            futures::future::try_join(self.followers(), self.following()).await?;
        Ok((followers.len(), following.len()))
    }

    pub fn recent_followers(&self) -> Vec<Account> {
        self.store.recent_followers()
    }

    pub fn recent_unfollowers(&self) -> Vec<Account> {
        self.store.recent_unfollowers()
    }

    // ------------------------------------------------------------------
    // Checks

    /// Run a follower check on demand, outside the timer.
    pub async fn check_now(&self) -> Result<CheckOutcome> {
        Ok(self.engine.check().await?)
    }

    /// Unix timestamp of the last committed check.
    pub fn last_check(&self) -> Option<i64> {
        self.store.last_check()
    }

    /// When the next scheduled check is expected, derived from the last one.
    pub fn next_check_at(&self) -> Option<i64> {
        self.store
            .last_check()
            .map(|last| last + self.watcher.period().as_secs() as i64)
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_running()
    }

    // ------------------------------------------------------------------
    // Profiles and relationship actions

    /// Fetch one profile, rate-limited under `profile-{actor}`.
    pub async fn profile(&self, actor: &str) -> Result<Account> {
        let key = format!("profile-{}", actor);
        let account = self
            .executor
            .execute(&key, || {
                let client = Arc::clone(&self.client);
                let actor = actor.to_string();
                async move { client.get_profile(&actor).await }
            })
            .await?;
        Ok(account)
    }

    pub async fn toggle_follow(&self, profile: &Account) -> Result<Account> {
        Ok(self.actions.toggle_follow(profile).await?)
    }

    pub async fn toggle_block(&self, profile: &Account) -> Result<Account> {
        Ok(self.actions.toggle_block(profile).await?)
    }

    pub async fn toggle_mute(&self, profile: &Account) -> Result<Account> {
        Ok(self.actions.toggle_mute(profile).await?)
    }

    // ------------------------------------------------------------------
    // Mutes

    pub fn is_muted(&self, did: &str) -> bool {
        self.store.is_muted(did)
    }

    pub fn mute_list(&self) -> BTreeSet<String> {
        self.store.mute_list()
    }

    /// Refresh the mute set from the server, keeping the cached set when the
    /// call fails.
    pub async fn refresh_mute_list(&self) -> BTreeSet<String> {
        match self.client.get_mutes().await {
            Ok(dids) => self.store.set_mute_list(dids),
            Err(err) => warn!(%err, "failed to refresh mute list"),
        }
        self.store.mute_list()
    }

    // ------------------------------------------------------------------
    // Events

    /// Subscribe to check/session notifications.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}
