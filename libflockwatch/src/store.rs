//! Persisted follower state
//!
//! One JSON blob holds exactly the durable subset: the recent gained/lost
//! lists, the last known follower snapshot, the last check timestamp and the
//! mute set. Session material is deliberately excluded. Saves are best-effort;
//! a disk problem is logged and never fails the operation that triggered it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::{Account, FollowerDelta};

/// Maximum entries kept in each recent list; oldest entries drop first.
pub const RECENT_LIST_CAP: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedState {
    /// Newest first, capped at [`RECENT_LIST_CAP`].
    pub recent_followers: Vec<Account>,
    /// Newest first, capped at [`RECENT_LIST_CAP`].
    pub recent_unfollowers: Vec<Account>,
    pub last_known_followers: Vec<Account>,
    /// Unix timestamp of the last committed check; `None` before the first.
    pub last_check: Option<i64>,
    pub mute_list: BTreeSet<String>,
}

pub struct StateStore {
    path: Option<PathBuf>,
    state: RwLock<PersistedState>,
}

impl StateStore {
    /// Store without a backing file; everything else behaves identically.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(PersistedState::default()),
        }
    }

    /// Load the blob at `path`, falling back to defaults when the file does
    /// not exist yet. A present-but-corrupt file is an error.
    pub fn load(path: PathBuf) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(StoreError::Read)?;
            serde_json::from_str(&content)?
        } else {
            PersistedState::default()
        };
        debug!(path = %path.display(), "loaded follower state");
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    pub fn recent_followers(&self) -> Vec<Account> {
        self.state.read().unwrap().recent_followers.clone()
    }

    pub fn recent_unfollowers(&self) -> Vec<Account> {
        self.state.read().unwrap().recent_unfollowers.clone()
    }

    pub fn last_known_followers(&self) -> Vec<Account> {
        self.state.read().unwrap().last_known_followers.clone()
    }

    pub fn last_check(&self) -> Option<i64> {
        self.state.read().unwrap().last_check
    }

    pub fn mute_list(&self) -> BTreeSet<String> {
        self.state.read().unwrap().mute_list.clone()
    }

    pub fn is_muted(&self, did: &str) -> bool {
        self.state.read().unwrap().mute_list.contains(did)
    }

    /// First-run seed: record the snapshot and timestamp without touching the
    /// recent lists.
    pub fn seed_followers(&self, followers: Vec<Account>, now: i64) {
        let mut state = self.state.write().unwrap();
        state.last_known_followers = followers;
        state.last_check = Some(now);
        self.save(&state);
    }

    /// Commit one diff cycle: prepend changes to the bounded recent lists,
    /// replace the snapshot wholesale and stamp the check time.
    pub fn record_check(&self, delta: &FollowerDelta, current: Vec<Account>, now: i64) {
        let mut state = self.state.write().unwrap();
        if !delta.gained.is_empty() {
            prepend_capped(&mut state.recent_followers, &delta.gained);
        }
        if !delta.lost.is_empty() {
            prepend_capped(&mut state.recent_unfollowers, &delta.lost);
        }
        state.last_known_followers = current;
        state.last_check = Some(now);
        self.save(&state);
    }

    pub fn set_mute_list(&self, dids: Vec<String>) {
        let mut state = self.state.write().unwrap();
        state.mute_list = dids.into_iter().collect();
        self.save(&state);
    }

    pub fn add_mute(&self, did: &str) {
        let mut state = self.state.write().unwrap();
        state.mute_list.insert(did.to_string());
        self.save(&state);
    }

    pub fn remove_mute(&self, did: &str) {
        let mut state = self.state.write().unwrap();
        state.mute_list.remove(did);
        self.save(&state);
    }

    /// Reset everything to initial values, e.g. on logout.
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        *state = PersistedState::default();
        self.save(&state);
    }

    /// Write the blob out now, surfacing any error. The mutators all save
    /// best-effort; this is for hosts that want a hard guarantee at shutdown.
    pub fn flush(&self) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => write_blob(path, &self.state.read().unwrap()),
            None => Ok(()),
        }
    }

    fn save(&self, state: &PersistedState) {
        if let Some(path) = &self.path {
            if let Err(err) = write_blob(path, state) {
                warn!(%err, path = %path.display(), "failed to save follower state");
            }
        }
    }
}

/// Atomic write: temp file in the target directory, then rename over.
fn write_blob(path: &Path, state: &PersistedState) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(StoreError::Write)?;
    }
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(StoreError::Write)?;
    fs::rename(&tmp, path).map_err(StoreError::Write)?;
    Ok(())
}

fn prepend_capped(list: &mut Vec<Account>, newest: &[Account]) {
    let mut merged = newest.to_vec();
    merged.extend(list.drain(..));
    merged.truncate(RECENT_LIST_CAP);
    *list = merged;
}
