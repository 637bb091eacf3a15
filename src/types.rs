use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Opaque ID types for type safety
pub type UserId = String;
pub type EditionId = String;
pub type StatementId = String;
pub type GroupId = String;
pub type RoundId = String;
pub type CommentId = String;

/// Generate a fresh sortable identifier
pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

/// A named pool of statements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edition {
    pub id: EditionId,
    pub name: String,
    pub slug: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    pub id: StatementId,
    pub text: String,
    pub edition_id: EditionId,
    /// Soft-deleted statements stay resolvable for old rounds but are never issued again
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub owner_id: UserId,
    /// Fixed at creation; every round draws from this edition
    pub edition_id: EditionId,
    pub members: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.contains(user_id)
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }
}

/// Lifecycle of a group's voting cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    None,
    Open,
    Closed,
}

/// One voting instance (a.k.a. group statement)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub group_id: GroupId,
    pub statement_id: StatementId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Round {
    pub fn phase(&self) -> RoundPhase {
        if self.closed_at.is_some() {
            RoundPhase::Closed
        } else {
            RoundPhase::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub round_id: RoundId,
    pub voter_id: UserId,
    /// None means the voter abstained
    pub target_id: Option<UserId>,
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn is_abstention(&self) -> bool {
        self.target_id.is_none()
    }
}

/// Closure record; its existence is the authoritative "round is closed" signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundResult {
    pub round_id: RoundId,
    pub winner_id: Option<UserId>,
    pub votes_count: u32,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsedStatement {
    pub group_id: GroupId,
    pub statement_id: StatementId,
    pub used_at: DateTime<Utc>,
}

/// Running leaderboard total for one member of one group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Points {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub round_id: RoundId,
    pub author_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
