//! Flockwatch - follower management core for the AT Protocol
//!
//! Authenticates against a PDS, keeps follower/following lists fresh, diffs
//! followers on a timer against a persisted snapshot, and toggles
//! follow/block/mute relationships. All outbound calls go through a keyed,
//! rate-limited executor with retry and session recovery. This crate is the
//! core behind a UI shell; it has no rendering, CLI or server surface of its
//! own.

pub mod actions;
pub mod app;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod executor;
pub mod fetcher;
pub mod logging;
pub mod session;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export the types an embedder touches day to day.
pub use app::Flockwatch;
pub use client::{AgentClient, MockClient, Session, XrpcClient};
pub use config::Config;
pub use diff::{snapshot_delta, CheckOutcome};
pub use error::{ApiError, FlockwatchError, Result, XrpcError};
pub use events::{Event, EventBus, EventReceiver};
pub use types::{Account, ConnectionKind, FollowerDelta, Snapshot};
