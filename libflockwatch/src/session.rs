//! Session lifecycle
//!
//! Holds the one authenticated session, replaced atomically on
//! login/logout/resume. Resume failure is terminal: it logs the user out and
//! clears all derived state rather than retrying on its own.

use std::sync::{Arc, RwLock};

use secrecy::SecretString;
use tracing::{info, warn};

use crate::client::{AgentClient, Session};
use crate::error::{ApiError, XrpcError};
use crate::events::{Event, EventBus};
use crate::executor::RateLimitLedger;
use crate::store::StateStore;

pub struct SessionManager {
    client: Arc<dyn AgentClient>,
    store: Arc<StateStore>,
    ledger: Arc<RateLimitLedger>,
    events: EventBus,
    session: RwLock<Option<Session>>,
}

impl SessionManager {
    pub fn new(
        client: Arc<dyn AgentClient>,
        store: Arc<StateStore>,
        ledger: Arc<RateLimitLedger>,
        events: EventBus,
    ) -> Self {
        Self {
            client,
            store,
            ledger,
            events,
            session: RwLock::new(None),
        }
    }

    /// Exchange credentials for a session.
    ///
    /// On success the mute list is bootstrapped best-effort; a failure there
    /// is logged and does not fail the login.
    pub async fn login(
        &self,
        identifier: &str,
        password: &SecretString,
    ) -> Result<Session, ApiError> {
        let session = self
            .client
            .create_session(identifier, password)
            .await
            .map_err(login_error)?;
        *self.session.write().unwrap() = Some(session.clone());
        info!(handle = %session.handle, "logged in");

        match self.client.get_mutes().await {
            Ok(dids) => self.store.set_mute_list(dids),
            Err(err) => warn!(%err, "failed to bootstrap mute list"),
        }

        Ok(session)
    }

    /// Re-validate the session with the server.
    ///
    /// Failure logs the user out as a side effect and surfaces
    /// [`ApiError::SessionExpired`]; it is never retried here.
    pub async fn resume(&self) -> Result<(), ApiError> {
        match self.client.resume_session().await {
            Ok(session) => {
                *self.session.write().unwrap() = Some(session);
                Ok(())
            }
            Err(err) => {
                warn!(%err, "session resume failed, logging out");
                self.logout();
                let expired = ApiError::SessionExpired(err.to_string());
                self.events.emit(Event::SessionExpired {
                    message: expired.to_string(),
                });
                Err(expired)
            }
        }
    }

    /// Pure local check; no server round-trip.
    pub fn is_valid(&self) -> bool {
        self.session.read().unwrap().is_some()
    }

    pub fn current(&self) -> Option<Session> {
        self.session.read().unwrap().clone()
    }

    pub fn did(&self) -> Option<String> {
        self.session.read().unwrap().as_ref().map(|s| s.did.clone())
    }

    /// Clear the session and reset all derived state to initial values:
    /// recent lists, last known snapshot, last check, mute list, and the
    /// rate-limit ledger.
    pub fn logout(&self) {
        *self.session.write().unwrap() = None;
        self.client.clear_session();
        self.store.reset();
        self.ledger.clear();
        info!("logged out");
    }
}

/// Map login transport failures onto the login-specific taxonomy.
fn login_error(err: XrpcError) -> ApiError {
    match err {
        XrpcError::Status {
            status: 401,
            message,
        } => ApiError::InvalidCredentials(message),
        XrpcError::Status {
            status: 429,
            message,
        } => ApiError::TooManyAttempts(message),
        XrpcError::Network(message) => ApiError::Network(message),
        other => ApiError::Login(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClient;
    use crate::types::Account;

    fn password() -> SecretString {
        SecretString::from("app-password".to_string())
    }

    fn manager(client: Arc<MockClient>) -> SessionManager {
        SessionManager::new(
            client,
            Arc::new(StateStore::in_memory()),
            Arc::new(RateLimitLedger::new()),
            EventBus::new(8),
        )
    }

    fn status(code: u16, message: &str) -> XrpcError {
        XrpcError::Status {
            status: code,
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_success_holds_session() {
        let client = Arc::new(MockClient::new());
        let manager = manager(Arc::clone(&client));

        assert!(!manager.is_valid());
        let session = manager.login("alice.test", &password()).await.unwrap();
        assert_eq!(session.did, "did:plc:viewer");
        assert!(manager.is_valid());
        assert_eq!(manager.did().as_deref(), Some("did:plc:viewer"));
    }

    #[tokio::test]
    async fn test_login_maps_invalid_credentials() {
        let client = Arc::new(MockClient::new());
        client.fail_next("create_session", 1, status(401, "AuthenticationRequired"));
        let manager = manager(client);

        let err = manager.login("alice.test", &password()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials(_)));
        assert!(!manager.is_valid());
    }

    #[tokio::test]
    async fn test_login_maps_rate_limit() {
        let client = Arc::new(MockClient::new());
        client.fail_next("create_session", 1, status(429, "RateLimitExceeded"));
        let manager = manager(client);

        let err = manager.login("alice.test", &password()).await.unwrap_err();
        assert!(matches!(err, ApiError::TooManyAttempts(_)));
    }

    #[tokio::test]
    async fn test_login_maps_network_failure() {
        let client = Arc::new(MockClient::new());
        client.fail_next(
            "create_session",
            1,
            XrpcError::Network("dns failure".to_string()),
        );
        let manager = manager(client);

        let err = manager.login("alice.test", &password()).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }

    #[tokio::test]
    async fn test_login_maps_other_status_to_generic() {
        let client = Arc::new(MockClient::new());
        client.fail_next("create_session", 1, status(500, "InternalServerError"));
        let manager = manager(client);

        let err = manager.login("alice.test", &password()).await.unwrap_err();
        assert!(matches!(err, ApiError::Login(_)));
    }

    #[tokio::test]
    async fn test_login_bootstraps_mute_list() {
        let client = Arc::new(MockClient::new().with_mutes(vec!["did:plc:m1", "did:plc:m2"]));
        let store = Arc::new(StateStore::in_memory());
        let manager = SessionManager::new(
            Arc::clone(&client) as Arc<dyn AgentClient>,
            Arc::clone(&store),
            Arc::new(RateLimitLedger::new()),
            EventBus::new(8),
        );

        manager.login("alice.test", &password()).await.unwrap();
        assert!(store.is_muted("did:plc:m1"));
        assert!(store.is_muted("did:plc:m2"));
    }

    #[tokio::test]
    async fn test_mute_bootstrap_failure_does_not_fail_login() {
        let client = Arc::new(MockClient::new());
        client.fail_next("get_mutes", 1, status(500, "InternalServerError"));
        let manager = manager(client);

        assert!(manager.login("alice.test", &password()).await.is_ok());
        assert!(manager.is_valid());
    }

    #[tokio::test]
    async fn test_resume_success_keeps_session() {
        let client = Arc::new(MockClient::new());
        let manager = manager(client);
        manager.login("alice.test", &password()).await.unwrap();

        assert!(manager.resume().await.is_ok());
        assert!(manager.is_valid());
    }

    #[tokio::test]
    async fn test_resume_failure_logs_out_and_emits() {
        let client = Arc::new(MockClient::new());
        let store = Arc::new(StateStore::in_memory());
        let ledger = Arc::new(RateLimitLedger::new());
        let events = EventBus::new(8);
        let mut receiver = events.subscribe();
        let manager = SessionManager::new(
            Arc::clone(&client) as Arc<dyn AgentClient>,
            Arc::clone(&store),
            Arc::clone(&ledger),
            events,
        );

        manager.login("alice.test", &password()).await.unwrap();
        store.add_mute("did:plc:m");
        client.set_resume_ok(false);

        let err = manager.resume().await.unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired(_)));
        assert!(!manager.is_valid());
        assert!(!client.has_session());
        assert!(store.mute_list().is_empty());
        assert!(matches!(
            receiver.recv().await.unwrap(),
            Event::SessionExpired { .. }
        ));
    }

    #[tokio::test]
    async fn test_logout_resets_everything() {
        let client = Arc::new(MockClient::new());
        let store = Arc::new(StateStore::in_memory());
        let ledger = Arc::new(RateLimitLedger::new());
        let manager = SessionManager::new(
            Arc::clone(&client) as Arc<dyn AgentClient>,
            Arc::clone(&store),
            Arc::clone(&ledger),
            EventBus::new(8),
        );

        manager.login("alice.test", &password()).await.unwrap();
        store.seed_followers(vec![Account::new("did:plc:a", "a")], 42);
        store.add_mute("did:plc:m");

        manager.logout();

        assert!(!manager.is_valid());
        assert!(manager.did().is_none());
        assert!(store.last_known_followers().is_empty());
        assert!(store.last_check().is_none());
        assert!(store.mute_list().is_empty());
        assert!(ledger.is_empty());
    }
}
