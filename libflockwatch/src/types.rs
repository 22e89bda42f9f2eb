//! Core types for Flockwatch

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Accounts shown per page in list views.
pub const LIST_PAGE_SIZE: usize = 25;

/// Viewer-relative relationship state carried on a profile.
///
/// `following` and `blocking` hold the AT-URI of our own relation record when
/// the relation exists; deleting the relation requires the record key parsed
/// from that reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewerState {
    pub following: Option<String>,
    pub followed_by: bool,
    pub blocking: Option<String>,
    pub muted: bool,
}

/// A remote account.
///
/// `did` is the only stable identity; the handle is mutable and must never be
/// used for diffing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Account {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub followers_count: u64,
    pub follows_count: u64,
    pub viewer: ViewerState,
}

impl Account {
    pub fn new(did: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
            ..Default::default()
        }
    }

    /// Case-insensitive substring match over display name, handle and bio.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.handle.to_lowercase().contains(&query)
            || self
                .display_name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains(&query))
            || self
                .description
                .as_deref()
                .is_some_and(|bio| bio.to_lowercase().contains(&query))
    }

    pub fn follow_state(&self) -> FollowState {
        if self.viewer.following.is_some() {
            FollowState::Following
        } else if self.viewer.followed_by {
            FollowState::FollowBack
        } else {
            FollowState::NotFollowing
        }
    }
}

/// Relation of the viewer to an account, for follow-button labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Following,
    /// They follow us, we do not follow them.
    FollowBack,
    NotFollowing,
}

/// Which connection list a fetch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Followers,
    Following,
}

impl ConnectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionKind::Followers => "followers",
            ConnectionKind::Following => "following",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full follower or following list as observed at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub kind: ConnectionKind,
    pub accounts: Vec<Account>,
    /// Unix timestamp of the capture.
    pub captured_at: i64,
}

impl Snapshot {
    pub fn new(kind: ConnectionKind, accounts: Vec<Account>) -> Self {
        Self {
            kind,
            accounts,
            captured_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn dids(&self) -> HashSet<&str> {
        self.accounts.iter().map(|a| a.did.as_str()).collect()
    }
}

/// Result of comparing two follower snapshots by stable id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowerDelta {
    pub gained: Vec<Account>,
    pub lost: Vec<Account>,
}

impl FollowerDelta {
    pub fn is_empty(&self) -> bool {
        self.gained.is_empty() && self.lost.is_empty()
    }
}

/// Filter a list by the UI search query.
pub fn filter_accounts<'a>(accounts: &'a [Account], query: &str) -> Vec<&'a Account> {
    accounts
        .iter()
        .filter(|account| account.matches_query(query))
        .collect()
}

/// Slice out one 1-based page of a list; returns the page and the page count.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> (&[T], usize) {
    if per_page == 0 || items.is_empty() {
        return (&[], 0);
    }
    let total_pages = items.len().div_ceil(per_page);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(items.len());
    (&items[start..end], total_pages)
}
