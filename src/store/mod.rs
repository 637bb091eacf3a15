//! Persistence contract for groups, content and round history.
//!
//! The store is the only mutable state shared between the scheduler, voters
//! and admins. Races are resolved by the constraints it enforces, not by locks
//! held in the service layer.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::types::*;

pub use memory::{MemoryStore, StoreSnapshot, SNAPSHOT_SCHEMA_VERSION};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by store backends regardless of the underlying database
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("constraint violated: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Typed access to every persisted entity
#[async_trait]
pub trait Store: Send + Sync {
    // Editions
    /// Fails with `Conflict` when the slug is already taken
    async fn insert_edition(&self, edition: Edition) -> StoreResult<()>;
    async fn update_edition(&self, edition: Edition) -> StoreResult<()>;
    /// Statements of a deleted edition are left in place
    async fn delete_edition(&self, id: &str) -> StoreResult<bool>;
    async fn get_edition(&self, id: &str) -> StoreResult<Option<Edition>>;
    async fn list_editions(&self) -> StoreResult<Vec<Edition>>;

    // Statements
    async fn insert_statement(&self, statement: Statement) -> StoreResult<()>;
    async fn update_statement(&self, statement: Statement) -> StoreResult<()>;
    async fn get_statement(&self, id: &str) -> StoreResult<Option<Statement>>;
    /// All statements of an edition, soft-deleted ones included
    async fn list_statements(&self, edition_id: &str) -> StoreResult<Vec<Statement>>;

    // Groups
    async fn insert_group(&self, group: Group) -> StoreResult<()>;
    /// Owner, edition and members are not touched
    async fn rename_group(&self, id: &str, name: &str) -> StoreResult<()>;
    /// Returns false when the user already was a member; `NotFound` for an
    /// unknown group
    async fn add_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool>;
    /// Returns false when the user was not a member
    async fn remove_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool>;
    /// Removes the group together with its rounds, votes, results, comments,
    /// used-statement markers and points
    async fn delete_group(&self, id: &str) -> StoreResult<bool>;
    async fn get_group(&self, id: &str) -> StoreResult<Option<Group>>;
    async fn list_groups(&self) -> StoreResult<Vec<Group>>;

    // Rounds
    /// Fails with `Conflict` when the group already has a round with no
    /// `closed_at`, and with `NotFound` when the group is gone
    async fn insert_round(&self, round: Round) -> StoreResult<()>;
    async fn get_round(&self, id: &str) -> StoreResult<Option<Round>>;
    async fn open_round_for_group(&self, group_id: &str) -> StoreResult<Option<Round>>;
    /// The most recently closed round of a group
    async fn last_closed_round(&self, group_id: &str) -> StoreResult<Option<Round>>;
    /// Newest first
    async fn list_rounds(&self, group_id: &str) -> StoreResult<Vec<Round>>;
    async fn list_open_rounds(&self) -> StoreResult<Vec<Round>>;

    // Results
    /// Atomically stamps the round's `closed_at` and records a result built
    /// from the votes present at that moment, with `winner_of` picking the
    /// winner. Fails with `Conflict` when the round is already closed.
    async fn close_round(
        &self,
        round_id: &str,
        closed_at: DateTime<Utc>,
        winner_of: &(dyn for<'v> Fn(&'v [Vote]) -> Option<UserId> + Send + Sync),
    ) -> StoreResult<RoundResult>;
    async fn get_result(&self, round_id: &str) -> StoreResult<Option<RoundResult>>;

    // Votes
    /// Keyed by (round, voter); a resubmission replaces the previous vote.
    /// Fails with `Conflict` once the round is closed.
    async fn upsert_vote(&self, vote: Vote) -> StoreResult<()>;
    async fn get_vote(&self, round_id: &str, voter_id: &str) -> StoreResult<Option<Vote>>;
    async fn list_votes(&self, round_id: &str) -> StoreResult<Vec<Vote>>;

    // Used statements
    /// Idempotent
    async fn mark_statement_used(&self, used: UsedStatement) -> StoreResult<()>;
    async fn used_statement_ids(&self, group_id: &str) -> StoreResult<HashSet<StatementId>>;
    async fn clear_used_statements(&self, group_id: &str) -> StoreResult<()>;

    // Points
    /// Upsert-increment; returns the new total
    async fn add_points(&self, group_id: &str, user_id: &str, delta: u32) -> StoreResult<u32>;
    async fn list_points(&self, group_id: &str) -> StoreResult<Vec<Points>>;

    // Comments
    async fn insert_comment(&self, comment: Comment) -> StoreResult<()>;
    /// Oldest first
    async fn list_comments(&self, round_id: &str) -> StoreResult<Vec<Comment>>;
}
