//! The version-control collaborator.
//!
//! The annotation core only talks to `VersionControl`; `GitRepository` is the
//! git2-backed implementation the server wires in. Every method fails with a
//! classified `VcsError`, never a raw library error.

pub mod history;
pub mod repository;

use async_trait::async_trait;

use crate::error::VcsError;
use crate::models::{AttributionLine, CommitMessage};

pub use repository::{format_relative_time, GitRepository};

/// Revision name that identifies the version blame is computed against.
pub const BASE_REVISION: &str = "HEAD";

#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Per-line attribution of the base version of `path`.
    async fn blame(&self, path: &str) -> Result<Vec<AttributionLine>, VcsError>;

    /// Messages walking back from `to` until `from` (inclusive), at most `limit`.
    async fn log(&self, from: &str, to: &str, limit: usize) -> Result<Vec<CommitMessage>, VcsError>;

    /// Messages for an arbitrary set of revisions in one round-trip.
    /// Unknown revisions are omitted from the result.
    async fn log_batch(&self, revisions: &[String]) -> Result<Vec<CommitMessage>, VcsError>;

    /// Cheap pre-check; fails with `NotVersioned` for paths outside version control.
    async fn info(&self, path: &str) -> Result<(), VcsError>;

    /// Text content of `path` at `revision`.
    async fn show(&self, path: &str, revision: &str) -> Result<String, VcsError>;
}
