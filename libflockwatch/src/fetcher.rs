//! Connection list fetching
//!
//! Walks the cursor-paginated followers/follows endpoints through the
//! executor, one rate-limit key per page. A failure anywhere aborts the whole
//! fetch; pages already received are discarded, there is no resumable fetch.

use std::sync::Arc;

use tracing::debug;

use crate::client::AgentClient;
use crate::error::ApiError;
use crate::executor::RateLimitedExecutor;
use crate::session::SessionManager;
use crate::types::{ConnectionKind, Snapshot};

/// Accounts requested per page; the server caps at 100.
pub const PAGE_LIMIT: u32 = 100;

pub struct ConnectionFetcher {
    client: Arc<dyn AgentClient>,
    executor: Arc<RateLimitedExecutor>,
    session: Arc<SessionManager>,
}

impl ConnectionFetcher {
    pub fn new(
        client: Arc<dyn AgentClient>,
        executor: Arc<RateLimitedExecutor>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            client,
            executor,
            session,
        }
    }

    /// Fetch the complete list of the given kind for the session user.
    ///
    /// Terminates when a page comes back empty or without a continuation
    /// cursor. Order is whatever the server sent.
    pub async fn fetch_all(&self, kind: ConnectionKind) -> Result<Snapshot, ApiError> {
        let session = self
            .session
            .current()
            .ok_or_else(|| ApiError::SessionExpired("not logged in".to_string()))?;

        let mut accounts = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let key = format!("fetch-{}-{}", kind, cursor.as_deref().unwrap_or("initial"));
            let page = self
                .executor
                .execute(&key, || {
                    let client = Arc::clone(&self.client);
                    let actor = session.did.clone();
                    let cursor = cursor.clone();
                    async move {
                        match kind {
                            ConnectionKind::Followers => {
                                client
                                    .get_followers(&actor, PAGE_LIMIT, cursor.as_deref())
                                    .await
                            }
                            ConnectionKind::Following => {
                                client
                                    .get_follows(&actor, PAGE_LIMIT, cursor.as_deref())
                                    .await
                            }
                        }
                    }
                })
                .await
                .map_err(|err| fetch_error(kind, err))?;

            if page.accounts.is_empty() {
                break;
            }
            accounts.extend(page.accounts);

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(%kind, count = accounts.len(), "fetched connection list");
        Ok(Snapshot::new(kind, accounts))
    }
}

/// Pagination failures become a typed fetch abort; a dead session passes
/// through so the caller can drop to the login screen.
fn fetch_error(kind: ConnectionKind, err: ApiError) -> ApiError {
    match err {
        ApiError::SessionExpired(_) => err,
        other => ApiError::FetchAborted(format!("failed to fetch {}: {}", kind, other)),
    }
}
