//! AT Protocol client seam
//!
//! Everything above this module speaks [`AgentClient`]; the wire details live
//! in [`xrpc`]. [`mock`] is compiled into all builds so integration-style
//! tests can script the server side without a network.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::XrpcError;
use crate::types::Account;

pub mod mock;
pub mod xrpc;

pub use mock::MockClient;
pub use xrpc::XrpcClient;

pub type ClientResult<T> = std::result::Result<T, XrpcError>;

/// Identity of the authenticated session.
///
/// Access and refresh tokens stay inside the client implementation; this
/// descriptor is all the rest of the crate sees, and none of it is ever
/// written to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub did: String,
    pub handle: String,
}

/// One page of a followers or follows listing.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPage {
    pub accounts: Vec<Account>,
    /// Opaque continuation cursor; absent on the last page.
    pub cursor: Option<String>,
}

/// The API surface this crate consumes from an AT Protocol agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Exchange credentials for a session and hold it for later calls.
    async fn create_session(
        &self,
        identifier: &str,
        password: &SecretString,
    ) -> ClientResult<Session>;

    /// Re-validate the held session with the server, refreshing tokens.
    /// Fails if no session is held or the server rejects it.
    async fn resume_session(&self) -> ClientResult<Session>;

    /// Drop the held session. Local only; no server round-trip.
    fn clear_session(&self);

    async fn get_followers(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ClientResult<ConnectionPage>;

    async fn get_follows(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ClientResult<ConnectionPage>;

    async fn get_profile(&self, actor: &str) -> ClientResult<Account>;

    /// Create a follow record for `did`; returns the record's AT-URI.
    async fn create_follow(&self, did: &str) -> ClientResult<String>;

    /// Delete our follow record by record key.
    async fn delete_follow(&self, rkey: &str) -> ClientResult<()>;

    /// Create a block record for `did`; returns the record's AT-URI.
    async fn create_block(&self, did: &str) -> ClientResult<String>;

    /// Delete our block record by record key.
    async fn delete_block(&self, rkey: &str) -> ClientResult<()>;

    async fn mute_actor(&self, did: &str) -> ClientResult<()>;

    async fn unmute_actor(&self, did: &str) -> ClientResult<()>;

    /// All muted account ids for the session user.
    async fn get_mutes(&self) -> ClientResult<Vec<String>>;
}
