//! Scriptable mock client
//!
//! Available in all builds (not just tests) so embedders can run the full
//! stack offline. Pages, profiles and failures are scripted up front; call
//! counts are recorded per operation for assertions.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;

use super::{AgentClient, ClientResult, ConnectionPage, Session};
use crate::error::XrpcError;
use crate::types::Account;

/// Scripted failure: the next `remaining` calls of one operation fail.
#[derive(Debug, Clone)]
struct FailPlan {
    remaining: u32,
    error: XrpcError,
}

#[derive(Default)]
struct MockState {
    session: Option<Session>,
    resume_ok: bool,
    follower_pages: Vec<ConnectionPage>,
    follow_pages: Vec<ConnectionPage>,
    profiles: HashMap<String, Account>,
    mutes: Vec<String>,
    fail_plans: HashMap<&'static str, FailPlan>,
    calls: HashMap<&'static str, usize>,
}

pub struct MockClient {
    state: Mutex<MockState>,
}

impl MockClient {
    /// A client that accepts any login and serves empty lists.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                resume_ok: true,
                ..Default::default()
            }),
        }
    }

    /// A client that is already logged in as `did:plc:viewer`.
    pub fn logged_in() -> Self {
        let client = Self::new();
        client.state.lock().unwrap().session = Some(Session {
            did: "did:plc:viewer".to_string(),
            handle: "viewer.test".to_string(),
        });
        client
    }

    /// Serve these follower pages, chained with generated cursors.
    pub fn with_followers(self, chunks: Vec<Vec<Account>>) -> Self {
        self.state.lock().unwrap().follower_pages = pages_from(chunks);
        self
    }

    /// Serve raw follower pages, cursors included, for termination edge cases.
    pub fn with_follower_pages(self, pages: Vec<ConnectionPage>) -> Self {
        self.state.lock().unwrap().follower_pages = pages;
        self
    }

    pub fn with_follows(self, chunks: Vec<Vec<Account>>) -> Self {
        self.state.lock().unwrap().follow_pages = pages_from(chunks);
        self
    }

    pub fn with_profile(self, account: Account) -> Self {
        let mut state = self.state.lock().unwrap();
        state.profiles.insert(account.did.clone(), account.clone());
        state.profiles.insert(account.handle.clone(), account);
        drop(state);
        self
    }

    pub fn with_mutes(self, dids: Vec<&str>) -> Self {
        self.state.lock().unwrap().mutes = dids.into_iter().map(String::from).collect();
        self
    }

    /// Make `resume_session` reject until re-armed.
    pub fn with_resume_rejected(self) -> Self {
        self.state.lock().unwrap().resume_ok = false;
        self
    }

    /// Fail the next `times` invocations of `op` with `error`.
    pub fn fail_next(&self, op: &'static str, times: u32, error: XrpcError) {
        self.state.lock().unwrap().fail_plans.insert(
            op,
            FailPlan {
                remaining: times,
                error,
            },
        );
    }

    /// Replace the scripted follower pages mid-test.
    pub fn set_followers(&self, chunks: Vec<Vec<Account>>) {
        self.state.lock().unwrap().follower_pages = pages_from(chunks);
    }

    pub fn set_resume_ok(&self, ok: bool) {
        self.state.lock().unwrap().resume_ok = ok;
    }

    /// How many times `op` has been invoked, failures included.
    pub fn calls(&self, op: &str) -> usize {
        *self.state.lock().unwrap().calls.get(op).unwrap_or(&0)
    }

    pub fn has_session(&self) -> bool {
        self.state.lock().unwrap().session.is_some()
    }

    /// Record the call and return the scripted failure, if one is armed.
    fn enter(&self, op: &'static str) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some(plan) = state.fail_plans.get_mut(op) {
            if plan.remaining > 0 {
                plan.remaining -= 1;
                return Err(plan.error.clone());
            }
        }
        Ok(())
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain account chunks into pages with `page-N` cursors, last page open.
fn pages_from(chunks: Vec<Vec<Account>>) -> Vec<ConnectionPage> {
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, accounts)| ConnectionPage {
            accounts,
            cursor: (i + 1 < count).then(|| format!("page-{}", i + 1)),
        })
        .collect()
}

fn page_for(pages: &[ConnectionPage], cursor: Option<&str>) -> ConnectionPage {
    let index = match cursor {
        None => 0,
        Some(c) => c
            .strip_prefix("page-")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(pages.len()),
    };
    pages.get(index).cloned().unwrap_or_default()
}

#[async_trait]
impl AgentClient for MockClient {
    async fn create_session(
        &self,
        identifier: &str,
        _password: &SecretString,
    ) -> ClientResult<Session> {
        self.enter("create_session")?;
        let session = Session {
            did: "did:plc:viewer".to_string(),
            handle: identifier.to_string(),
        };
        self.state.lock().unwrap().session = Some(session.clone());
        Ok(session)
    }

    async fn resume_session(&self) -> ClientResult<Session> {
        self.enter("resume_session")?;
        let state = self.state.lock().unwrap();
        match (&state.session, state.resume_ok) {
            (Some(session), true) => Ok(session.clone()),
            _ => Err(XrpcError::Status {
                status: 400,
                message: "ExpiredToken".to_string(),
            }),
        }
    }

    fn clear_session(&self) {
        self.state.lock().unwrap().session = None;
    }

    async fn get_followers(
        &self,
        _actor: &str,
        _limit: u32,
        cursor: Option<&str>,
    ) -> ClientResult<ConnectionPage> {
        self.enter("get_followers")?;
        let state = self.state.lock().unwrap();
        Ok(page_for(&state.follower_pages, cursor))
    }

    async fn get_follows(
        &self,
        _actor: &str,
        _limit: u32,
        cursor: Option<&str>,
    ) -> ClientResult<ConnectionPage> {
        self.enter("get_follows")?;
        let state = self.state.lock().unwrap();
        Ok(page_for(&state.follow_pages, cursor))
    }

    async fn get_profile(&self, actor: &str) -> ClientResult<Account> {
        self.enter("get_profile")?;
        let state = self.state.lock().unwrap();
        state
            .profiles
            .get(actor)
            .cloned()
            .ok_or_else(|| XrpcError::Status {
                status: 400,
                message: format!("Profile not found: {}", actor),
            })
    }

    async fn create_follow(&self, did: &str) -> ClientResult<String> {
        self.enter("create_follow")?;
        Ok(format!(
            "at://did:plc:viewer/app.bsky.graph.follow/rkey-{}",
            did.len()
        ))
    }

    async fn delete_follow(&self, _rkey: &str) -> ClientResult<()> {
        self.enter("delete_follow")?;
        Ok(())
    }

    async fn create_block(&self, did: &str) -> ClientResult<String> {
        self.enter("create_block")?;
        Ok(format!(
            "at://did:plc:viewer/app.bsky.graph.block/rkey-{}",
            did.len()
        ))
    }

    async fn delete_block(&self, _rkey: &str) -> ClientResult<()> {
        self.enter("delete_block")?;
        Ok(())
    }

    async fn mute_actor(&self, did: &str) -> ClientResult<()> {
        self.enter("mute_actor")?;
        self.state.lock().unwrap().mutes.push(did.to_string());
        Ok(())
    }

    async fn unmute_actor(&self, did: &str) -> ClientResult<()> {
        self.enter("unmute_actor")?;
        self.state.lock().unwrap().mutes.retain(|d| d != did);
        Ok(())
    }

    async fn get_mutes(&self) -> ClientResult<Vec<String>> {
        self.enter("get_mutes")?;
        Ok(self.state.lock().unwrap().mutes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password() -> SecretString {
        SecretString::from("hunter2".to_string())
    }

    #[tokio::test]
    async fn test_login_and_session_lifecycle() {
        let client = MockClient::new();
        assert!(!client.has_session());

        let session = client
            .create_session("alice.test", &password())
            .await
            .unwrap();
        assert_eq!(session.did, "did:plc:viewer");
        assert!(client.has_session());

        let resumed = client.resume_session().await.unwrap();
        assert_eq!(resumed.did, session.did);

        client.clear_session();
        assert!(client.resume_session().await.is_err());
    }

    #[tokio::test]
    async fn test_paging_follows_cursors() {
        let client = MockClient::logged_in().with_followers(vec![
            vec![Account::new("did:plc:a", "a"), Account::new("did:plc:b", "b")],
            vec![Account::new("did:plc:c", "c")],
        ]);

        let first = client.get_followers("me", 100, None).await.unwrap();
        assert_eq!(first.accounts.len(), 2);
        assert_eq!(first.cursor.as_deref(), Some("page-1"));

        let second = client
            .get_followers("me", 100, first.cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(second.accounts.len(), 1);
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let client = MockClient::logged_in();
        client.fail_next(
            "get_followers",
            2,
            XrpcError::Status {
                status: 429,
                message: "RateLimitExceeded".to_string(),
            },
        );

        assert!(client.get_followers("me", 100, None).await.is_err());
        assert!(client.get_followers("me", 100, None).await.is_err());
        assert!(client.get_followers("me", 100, None).await.is_ok());
        assert_eq!(client.calls("get_followers"), 3);
    }

    #[tokio::test]
    async fn test_mute_round_trip() {
        let client = MockClient::logged_in();
        client.mute_actor("did:plc:x").await.unwrap();
        assert_eq!(client.get_mutes().await.unwrap(), vec!["did:plc:x"]);
        client.unmute_actor("did:plc:x").await.unwrap();
        assert!(client.get_mutes().await.unwrap().is_empty());
    }
}
