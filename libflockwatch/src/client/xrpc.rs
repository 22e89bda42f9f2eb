//! XRPC implementation of the client seam
//!
//! Talks plain JSON-over-HTTP to a PDS. Session tokens live behind a lock in
//! the client and never leave it; callers authenticate once and every later
//! request picks up the current access token.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AgentClient, ClientResult, ConnectionPage, Session};
use crate::error::XrpcError;
use crate::types::Account;

const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";
const BLOCK_COLLECTION: &str = "app.bsky.graph.block";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct SessionTokens {
    did: String,
    handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

pub struct XrpcClient {
    http: reqwest::Client,
    base_url: String,
    tokens: RwLock<Option<SessionTokens>>,
}

impl XrpcClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("flockwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| XrpcError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens: RwLock::new(None),
        })
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.base_url, nsid)
    }

    /// Current access token and repo did, or a 401-class error when no
    /// session is held.
    fn auth(&self) -> ClientResult<(String, String)> {
        match self.tokens.read().unwrap().as_ref() {
            Some(tokens) => Ok((tokens.access_jwt.clone(), tokens.did.clone())),
            None => Err(XrpcError::Status {
                status: 401,
                message: "no active session".to_string(),
            }),
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> ClientResult<T> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| XrpcError::Network(format!("invalid response body: {}", e)))
        } else {
            let code = status.as_u16();
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            Err(status_error(code, body))
        }
    }

    /// Like [`send`] but for procedures whose response body we discard.
    async fn send_unit(&self, request: reqwest::RequestBuilder) -> ClientResult<()> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let code = status.as_u16();
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            Err(status_error(code, body))
        }
    }

    fn store_session(&self, session: SessionResponse) -> Session {
        let descriptor = Session {
            did: session.did.clone(),
            handle: session.handle.clone(),
        };
        *self.tokens.write().unwrap() = Some(SessionTokens {
            did: session.did,
            handle: session.handle,
            access_jwt: session.access_jwt,
            refresh_jwt: session.refresh_jwt,
        });
        descriptor
    }

    async fn get_connection_page(
        &self,
        nsid: &str,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ClientResult<serde_json::Value> {
        let (access, _) = self.auth()?;
        let mut params: Vec<(&str, String)> =
            vec![("actor", actor.to_string()), ("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.send(
            self.http
                .get(self.endpoint(nsid))
                .bearer_auth(&access)
                .query(&params),
        )
        .await
    }

    async fn create_record(&self, collection: &str, subject: &str) -> ClientResult<String> {
        let (access, did) = self.auth()?;
        let body = serde_json::json!({
            "repo": did,
            "collection": collection,
            "record": {
                "$type": collection,
                "subject": subject,
                "createdAt": chrono::Utc::now().to_rfc3339(),
            }
        });
        let response: CreateRecordResponse = self
            .send(
                self.http
                    .post(self.endpoint("com.atproto.repo.createRecord"))
                    .bearer_auth(&access)
                    .json(&body),
            )
            .await?;
        debug!(collection, uri = %response.uri, "created record");
        Ok(response.uri)
    }

    async fn delete_record(&self, collection: &str, rkey: &str) -> ClientResult<()> {
        let (access, did) = self.auth()?;
        let body = DeleteRecordRequest {
            repo: &did,
            collection,
            rkey,
        };
        self.send_unit(
            self.http
                .post(self.endpoint("com.atproto.repo.deleteRecord"))
                .bearer_auth(&access)
                .json(&body),
        )
        .await
    }
}

#[async_trait]
impl AgentClient for XrpcClient {
    async fn create_session(
        &self,
        identifier: &str,
        password: &SecretString,
    ) -> ClientResult<Session> {
        debug!(identifier, "creating session");
        let body = CreateSessionRequest {
            identifier,
            password: password.expose_secret(),
        };
        let session: SessionResponse = self
            .send(
                self.http
                    .post(self.endpoint("com.atproto.server.createSession"))
                    .json(&body),
            )
            .await?;
        Ok(self.store_session(session))
    }

    async fn resume_session(&self) -> ClientResult<Session> {
        let refresh = match self.tokens.read().unwrap().as_ref() {
            Some(tokens) => tokens.refresh_jwt.clone(),
            None => {
                return Err(XrpcError::Status {
                    status: 401,
                    message: "no session to resume".to_string(),
                })
            }
        };
        debug!("refreshing session");
        let session: SessionResponse = self
            .send(
                self.http
                    .post(self.endpoint("com.atproto.server.refreshSession"))
                    .bearer_auth(&refresh),
            )
            .await?;
        Ok(self.store_session(session))
    }

    fn clear_session(&self) {
        *self.tokens.write().unwrap() = None;
    }

    async fn get_followers(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ClientResult<ConnectionPage> {
        let response: FollowersResponse = serde_json::from_value(
            self.get_connection_page("app.bsky.graph.getFollowers", actor, limit, cursor)
                .await?,
        )
        .map_err(|e| XrpcError::Network(format!("invalid response body: {}", e)))?;
        Ok(ConnectionPage {
            accounts: response.followers,
            cursor: response.cursor,
        })
    }

    async fn get_follows(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> ClientResult<ConnectionPage> {
        let response: FollowsResponse = serde_json::from_value(
            self.get_connection_page("app.bsky.graph.getFollows", actor, limit, cursor)
                .await?,
        )
        .map_err(|e| XrpcError::Network(format!("invalid response body: {}", e)))?;
        Ok(ConnectionPage {
            accounts: response.follows,
            cursor: response.cursor,
        })
    }

    async fn get_profile(&self, actor: &str) -> ClientResult<Account> {
        let (access, _) = self.auth()?;
        self.send(
            self.http
                .get(self.endpoint("app.bsky.actor.getProfile"))
                .bearer_auth(&access)
                .query(&[("actor", actor)]),
        )
        .await
    }

    async fn create_follow(&self, did: &str) -> ClientResult<String> {
        self.create_record(FOLLOW_COLLECTION, did).await
    }

    async fn delete_follow(&self, rkey: &str) -> ClientResult<()> {
        self.delete_record(FOLLOW_COLLECTION, rkey).await
    }

    async fn create_block(&self, did: &str) -> ClientResult<String> {
        self.create_record(BLOCK_COLLECTION, did).await
    }

    async fn delete_block(&self, rkey: &str) -> ClientResult<()> {
        self.delete_record(BLOCK_COLLECTION, rkey).await
    }

    async fn mute_actor(&self, did: &str) -> ClientResult<()> {
        let (access, _) = self.auth()?;
        self.send_unit(
            self.http
                .post(self.endpoint("app.bsky.graph.muteActor"))
                .bearer_auth(&access)
                .json(&MuteRequest { actor: did }),
        )
        .await
    }

    async fn unmute_actor(&self, did: &str) -> ClientResult<()> {
        let (access, _) = self.auth()?;
        self.send_unit(
            self.http
                .post(self.endpoint("app.bsky.graph.unmuteActor"))
                .bearer_auth(&access)
                .json(&MuteRequest { actor: did }),
        )
        .await
    }

    async fn get_mutes(&self) -> ClientResult<Vec<String>> {
        let (access, _) = self.auth()?;
        let response: GetMutesResponse = self
            .send(
                self.http
                    .get(self.endpoint("app.bsky.graph.getMutes"))
                    .bearer_auth(&access),
            )
            .await?;
        Ok(response.mutes.into_iter().map(|m| m.did).collect())
    }
}

fn network_error(e: reqwest::Error) -> XrpcError {
    XrpcError::Network(e.to_string())
}

fn status_error(status: u16, body: ErrorBody) -> XrpcError {
    let message = body
        .message
        .or(body.error)
        .unwrap_or_else(|| format!("HTTP {}", status));
    XrpcError::Status { status, message }
}

// Wire DTOs. Field names follow AT Protocol JSON.

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    did: String,
    handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

#[derive(Deserialize)]
struct FollowersResponse {
    followers: Vec<Account>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct FollowsResponse {
    follows: Vec<Account>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct CreateRecordResponse {
    uri: String,
}

#[derive(Serialize)]
struct DeleteRecordRequest<'a> {
    repo: &'a str,
    collection: &'a str,
    rkey: &'a str,
}

#[derive(Serialize)]
struct MuteRequest<'a> {
    actor: &'a str,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct GetMutesResponse {
    mutes: Vec<MuteEntry>,
}

#[derive(Deserialize)]
struct MuteEntry {
    did: String,
}
