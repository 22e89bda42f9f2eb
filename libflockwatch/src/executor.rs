//! Rate-limited execution with retry and session recovery
//!
//! Every outbound call is keyed by a string naming the logical operation
//! ("fetch-followers-initial", "mute-did:plc:…"). Completions sharing a key
//! are spaced at least one second apart, and each call gets a shared budget
//! of three retries across the transient failure classes. A 401 triggers a
//! session resume and a retry instead of a backoff.
//!
//! Unlike an elapsed-time check alone, the ledger hands out one async mutex
//! per key and the executor holds it across pacing, the operation and the
//! completion record, so two concurrent calls with the same key cannot both
//! slip past the spacing check.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{ApiError, XrpcError};
use crate::session::SessionManager;

/// Minimum spacing between completions sharing a key.
pub const MIN_KEY_SPACING: Duration = Duration::from_millis(1000);
/// Backoff before retrying a network-class failure.
pub const NETWORK_BACKOFF: Duration = Duration::from_millis(3000);
/// Backoff before retrying after an HTTP 429.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_millis(5000);
/// Shared retry budget per call, across all failure classes.
pub const MAX_RETRIES: u32 = 3;

#[derive(Default)]
struct KeySlot {
    last_completed: Option<Instant>,
}

/// Per-key completion ledger.
///
/// Entries accumulate for the lifetime of the session and are dropped
/// wholesale on logout.
#[derive(Default)]
pub struct RateLimitLedger {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<KeySlot>>>>,
}

impl RateLimitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<KeySlot>> {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(key.to_string()).or_default().clone()
    }

    pub fn clear(&self) {
        self.slots.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }
}

enum FailureClass {
    Network,
    RateLimited,
    Unauthenticated,
    Other,
}

fn classify(err: &XrpcError) -> FailureClass {
    match err {
        XrpcError::Network(_) => FailureClass::Network,
        XrpcError::Status { status: 429, .. } => FailureClass::RateLimited,
        XrpcError::Status { status: 401, .. } => FailureClass::Unauthenticated,
        XrpcError::Status { .. } => FailureClass::Other,
    }
}

pub struct RateLimitedExecutor {
    ledger: Arc<RateLimitLedger>,
    session: Arc<SessionManager>,
}

impl RateLimitedExecutor {
    pub fn new(ledger: Arc<RateLimitLedger>, session: Arc<SessionManager>) -> Self {
        Self { ledger, session }
    }

    /// Run `operation` under the pacing and retry policy for `key`.
    ///
    /// The closure is invoked once per attempt and must produce a fresh
    /// future each time. Failure handling, most specific first:
    ///
    /// - network-class: back off 3s and retry while budget remains, then
    ///   surface [`ApiError::Network`]
    /// - HTTP 429: back off 5s and retry while budget remains, then surface
    ///   [`ApiError::RateLimited`]
    /// - HTTP 401: resume the session (logging out on resume failure) and
    ///   retry without extra delay; with the budget already spent, one more
    ///   grace retry is allowed after a successful resume
    /// - anything else: propagated unchanged
    pub async fn execute<T, F, Fut>(&self, key: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, XrpcError>>,
    {
        let slot_handle = self.ledger.slot(key);
        let mut slot = slot_handle.lock().await;

        let mut retries_remaining = MAX_RETRIES;
        let mut resume_grace_used = false;

        loop {
            if let Some(last) = slot.last_completed {
                let elapsed = last.elapsed();
                if elapsed < MIN_KEY_SPACING {
                    sleep(MIN_KEY_SPACING - elapsed).await;
                }
            }

            match operation().await {
                Ok(value) => {
                    slot.last_completed = Some(Instant::now());
                    return Ok(value);
                }
                Err(err) => match classify(&err) {
                    FailureClass::Network => {
                        if retries_remaining == 0 {
                            warn!(key, %err, "network retries exhausted");
                            let message = match err {
                                XrpcError::Network(message) => message,
                                other => other.to_string(),
                            };
                            return Err(ApiError::Network(message));
                        }
                        retries_remaining -= 1;
                        debug!(key, retries_remaining, "network failure, backing off");
                        sleep(NETWORK_BACKOFF).await;
                    }
                    FailureClass::RateLimited => {
                        if retries_remaining == 0 {
                            warn!(key, %err, "rate-limit retries exhausted");
                            return Err(ApiError::RateLimited(err.to_string()));
                        }
                        retries_remaining -= 1;
                        debug!(key, retries_remaining, "rate limited, backing off");
                        sleep(RATE_LIMIT_BACKOFF).await;
                    }
                    FailureClass::Unauthenticated => {
                        if retries_remaining == 0 && resume_grace_used {
                            warn!(key, "still unauthenticated after resume");
                            return Err(ApiError::SessionExpired(err.to_string()));
                        }
                        self.session.resume().await?;
                        if retries_remaining > 0 {
                            retries_remaining -= 1;
                        } else {
                            resume_grace_used = true;
                        }
                        debug!(key, retries_remaining, "session resumed, retrying");
                    }
                    FailureClass::Other => return Err(err.into()),
                },
            }
        }
    }
}
