//! SQLite-backed store.
//!
//! The race-safety guarantees live in the schema: the partial unique index on
//! open rounds, the primary key on results and the composite keys on votes,
//! points and used statements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use super::{Store, StoreError, StoreResult};
use crate::types::*;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS editions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        slug TEXT NOT NULL UNIQUE,
        active INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS statements (
        id TEXT PRIMARY KEY,
        text TEXT NOT NULL,
        edition_id TEXT NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS statements_edition_idx ON statements (edition_id)",
    "CREATE TABLE IF NOT EXISTS voting_groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        edition_id TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS group_members (
        group_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        PRIMARY KEY (group_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS rounds (
        id TEXT PRIMARY KEY,
        group_id TEXT NOT NULL,
        statement_id TEXT NOT NULL,
        issued_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        closed_at TEXT
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS rounds_one_open_per_group
        ON rounds (group_id) WHERE closed_at IS NULL",
    "CREATE TABLE IF NOT EXISTS round_results (
        round_id TEXT PRIMARY KEY,
        winner_id TEXT,
        votes_count INTEGER NOT NULL,
        closed_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS votes (
        round_id TEXT NOT NULL,
        voter_id TEXT NOT NULL,
        target_id TEXT,
        cast_at TEXT NOT NULL,
        PRIMARY KEY (round_id, voter_id)
    )",
    "CREATE TABLE IF NOT EXISTS used_statements (
        group_id TEXT NOT NULL,
        statement_id TEXT NOT NULL,
        used_at TEXT NOT NULL,
        PRIMARY KEY (group_id, statement_id)
    )",
    "CREATE TABLE IF NOT EXISTS points (
        group_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        points INTEGER NOT NULL,
        PRIMARY KEY (group_id, user_id)
    )",
    "CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        round_id TEXT NOT NULL,
        author_id TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS comments_round_idx ON comments (round_id)",
];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` gets its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!(tables = SCHEMA.len(), "SQLite schema applied");
        Ok(())
    }

    async fn group_exists(&self, group_id: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 FROM voting_groups WHERE id = ?")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn members_of(&self, group_id: &str) -> StoreResult<BTreeSet<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM group_members WHERE group_id = ?")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("user_id").map_err(Into::into))
            .collect()
    }
}

fn edition_from_row(row: &SqliteRow) -> Result<Edition, sqlx::Error> {
    Ok(Edition {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        active: row.try_get("active")?,
    })
}

fn statement_from_row(row: &SqliteRow) -> Result<Statement, sqlx::Error> {
    Ok(Statement {
        id: row.try_get("id")?,
        text: row.try_get("text")?,
        edition_id: row.try_get("edition_id")?,
        deleted: row.try_get("deleted")?,
    })
}

fn group_from_row(row: &SqliteRow, members: BTreeSet<UserId>) -> Result<Group, sqlx::Error> {
    Ok(Group {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        owner_id: row.try_get("owner_id")?,
        edition_id: row.try_get("edition_id")?,
        members,
        created_at: row.try_get("created_at")?,
    })
}

fn round_from_row(row: &SqliteRow) -> Result<Round, sqlx::Error> {
    Ok(Round {
        id: row.try_get("id")?,
        group_id: row.try_get("group_id")?,
        statement_id: row.try_get("statement_id")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

fn result_from_row(row: &SqliteRow) -> Result<RoundResult, sqlx::Error> {
    let votes_count: i64 = row.try_get("votes_count")?;
    Ok(RoundResult {
        round_id: row.try_get("round_id")?,
        winner_id: row.try_get("winner_id")?,
        votes_count: u32::try_from(votes_count).unwrap_or(u32::MAX),
        closed_at: row.try_get("closed_at")?,
    })
}

fn vote_from_row(row: &SqliteRow) -> Result<Vote, sqlx::Error> {
    Ok(Vote {
        round_id: row.try_get("round_id")?,
        voter_id: row.try_get("voter_id")?,
        target_id: row.try_get("target_id")?,
        cast_at: row.try_get("cast_at")?,
    })
}

fn points_from_row(row: &SqliteRow) -> Result<Points, sqlx::Error> {
    let points: i64 = row.try_get("points")?;
    Ok(Points {
        group_id: row.try_get("group_id")?,
        user_id: row.try_get("user_id")?,
        points: u32::try_from(points).unwrap_or(u32::MAX),
    })
}

fn comment_from_row(row: &SqliteRow) -> Result<Comment, sqlx::Error> {
    Ok(Comment {
        id: row.try_get("id")?,
        round_id: row.try_get("round_id")?,
        author_id: row.try_get("author_id")?,
        text: row.try_get("text")?,
        created_at: row.try_get("created_at")?,
    })
}

fn collect_rows<T>(
    rows: &[SqliteRow],
    map: fn(&SqliteRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Vec<T>> {
    rows.iter().map(|row| map(row).map_err(Into::into)).collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_edition(&self, edition: Edition) -> StoreResult<()> {
        sqlx::query("INSERT INTO editions (id, name, slug, active) VALUES (?, ?, ?, ?)")
            .bind(&edition.id)
            .bind(&edition.name)
            .bind(&edition.slug)
            .bind(edition.active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_edition(&self, edition: Edition) -> StoreResult<()> {
        let result = sqlx::query("UPDATE editions SET name = ?, slug = ?, active = ? WHERE id = ?")
            .bind(&edition.name)
            .bind(&edition.slug)
            .bind(edition.active)
            .bind(&edition.id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("edition {}", edition.id)));
        }
        Ok(())
    }

    async fn delete_edition(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM editions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_edition(&self, id: &str) -> StoreResult<Option<Edition>> {
        let row = sqlx::query("SELECT id, name, slug, active FROM editions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(edition_from_row).transpose()?)
    }

    async fn list_editions(&self) -> StoreResult<Vec<Edition>> {
        let rows = sqlx::query("SELECT id, name, slug, active FROM editions ORDER BY slug")
            .fetch_all(&self.pool)
            .await?;
        collect_rows(&rows, edition_from_row)
    }

    async fn insert_statement(&self, statement: Statement) -> StoreResult<()> {
        sqlx::query("INSERT INTO statements (id, text, edition_id, deleted) VALUES (?, ?, ?, ?)")
            .bind(&statement.id)
            .bind(&statement.text)
            .bind(&statement.edition_id)
            .bind(statement.deleted)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_statement(&self, statement: Statement) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE statements SET text = ?, edition_id = ?, deleted = ? WHERE id = ?")
                .bind(&statement.text)
                .bind(&statement.edition_id)
                .bind(statement.deleted)
                .bind(&statement.id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("statement {}", statement.id)));
        }
        Ok(())
    }

    async fn get_statement(&self, id: &str) -> StoreResult<Option<Statement>> {
        let row = sqlx::query("SELECT id, text, edition_id, deleted FROM statements WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(statement_from_row).transpose()?)
    }

    async fn list_statements(&self, edition_id: &str) -> StoreResult<Vec<Statement>> {
        let rows = sqlx::query(
            "SELECT id, text, edition_id, deleted FROM statements WHERE edition_id = ? ORDER BY id",
        )
        .bind(edition_id)
        .fetch_all(&self.pool)
        .await?;
        collect_rows(&rows, statement_from_row)
    }

    async fn insert_group(&self, group: Group) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO voting_groups (id, name, owner_id, edition_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&group.id)
        .bind(&group.name)
        .bind(&group.owner_id)
        .bind(&group.edition_id)
        .bind(group.created_at)
        .execute(&mut *tx)
        .await?;
        for member in &group.members {
            sqlx::query("INSERT INTO group_members (group_id, user_id) VALUES (?, ?)")
                .bind(&group.id)
                .bind(member)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn rename_group(&self, id: &str, name: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE voting_groups SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("group {}", id)));
        }
        Ok(())
    }

    async fn add_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO group_members (group_id, user_id)
             SELECT ?, ? WHERE EXISTS (SELECT 1 FROM voting_groups WHERE id = ?)",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        if self.group_exists(group_id).await? {
            Ok(false)
        } else {
            Err(StoreError::NotFound(format!("group {}", group_id)))
        }
    }

    async fn remove_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_group(&self, id: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM voting_groups WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        for cascade in [
            "DELETE FROM votes WHERE round_id IN (SELECT id FROM rounds WHERE group_id = ?)",
            "DELETE FROM round_results WHERE round_id IN (SELECT id FROM rounds WHERE group_id = ?)",
            "DELETE FROM comments WHERE round_id IN (SELECT id FROM rounds WHERE group_id = ?)",
            "DELETE FROM rounds WHERE group_id = ?",
            "DELETE FROM group_members WHERE group_id = ?",
            "DELETE FROM used_statements WHERE group_id = ?",
            "DELETE FROM points WHERE group_id = ?",
        ] {
            sqlx::query(cascade).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn get_group(&self, id: &str) -> StoreResult<Option<Group>> {
        let row = sqlx::query(
            "SELECT id, name, owner_id, edition_id, created_at FROM voting_groups WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let members = self.members_of(id).await?;
        Ok(Some(group_from_row(&row, members)?))
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let rows = sqlx::query(
            "SELECT id, name, owner_id, edition_id, created_at FROM voting_groups ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let member_rows = sqlx::query("SELECT group_id, user_id FROM group_members")
            .fetch_all(&self.pool)
            .await?;

        let mut members: HashMap<String, BTreeSet<UserId>> = HashMap::new();
        for row in &member_rows {
            let group_id: String = row.try_get("group_id")?;
            let user_id: String = row.try_get("user_id")?;
            members.entry(group_id).or_default().insert(user_id);
        }

        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let group_members = members.remove(&id).unwrap_or_default();
            groups.push(group_from_row(row, group_members)?);
        }
        Ok(groups)
    }

    async fn insert_round(&self, round: Round) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO rounds (id, group_id, statement_id, issued_at, expires_at, closed_at)
             SELECT ?, ?, ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM voting_groups WHERE id = ?)",
        )
        .bind(&round.id)
        .bind(&round.group_id)
        .bind(&round.statement_id)
        .bind(round.issued_at)
        .bind(round.expires_at)
        .bind(round.closed_at)
        .bind(&round.group_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("group {}", round.group_id)));
        }
        Ok(())
    }

    async fn get_round(&self, id: &str) -> StoreResult<Option<Round>> {
        let row = sqlx::query("SELECT * FROM rounds WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(round_from_row).transpose()?)
    }

    async fn open_round_for_group(&self, group_id: &str) -> StoreResult<Option<Round>> {
        let row = sqlx::query("SELECT * FROM rounds WHERE group_id = ? AND closed_at IS NULL")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(round_from_row).transpose()?)
    }

    async fn last_closed_round(&self, group_id: &str) -> StoreResult<Option<Round>> {
        let rows = sqlx::query("SELECT * FROM rounds WHERE group_id = ? AND closed_at IS NOT NULL")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        // Timestamps are compared as values, not as their stored text
        Ok(collect_rows(&rows, round_from_row)?
            .into_iter()
            .max_by(|a, b| a.closed_at.cmp(&b.closed_at)))
    }

    async fn list_rounds(&self, group_id: &str) -> StoreResult<Vec<Round>> {
        let rows = sqlx::query("SELECT * FROM rounds WHERE group_id = ?")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        let mut rounds = collect_rows(&rows, round_from_row)?;
        rounds.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then_with(|| b.id.cmp(&a.id)));
        Ok(rounds)
    }

    async fn list_open_rounds(&self) -> StoreResult<Vec<Round>> {
        let rows = sqlx::query("SELECT * FROM rounds WHERE closed_at IS NULL")
            .fetch_all(&self.pool)
            .await?;
        let mut rounds = collect_rows(&rows, round_from_row)?;
        rounds.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(rounds)
    }

    async fn close_round(
        &self,
        round_id: &str,
        closed_at: DateTime<Utc>,
        winner_of: &(dyn for<'v> Fn(&'v [Vote]) -> Option<UserId> + Send + Sync),
    ) -> StoreResult<RoundResult> {
        // Stamping first takes the write lock, so no vote can land between
        // reading the votes and storing the result
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE rounds SET closed_at = ? WHERE id = ? AND closed_at IS NULL")
            .bind(closed_at)
            .bind(round_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM rounds WHERE id = ?")
                .bind(round_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            return Err(if exists {
                StoreError::Conflict(format!("round {} is closed", round_id))
            } else {
                StoreError::NotFound(format!("round {}", round_id))
            });
        }

        let rows = sqlx::query("SELECT * FROM votes WHERE round_id = ? ORDER BY voter_id")
            .bind(round_id)
            .fetch_all(&mut *tx)
            .await?;
        let votes = collect_rows(&rows, vote_from_row)?;
        let result = RoundResult {
            round_id: round_id.to_string(),
            winner_id: winner_of(&votes),
            votes_count: u32::try_from(votes.len()).unwrap_or(u32::MAX),
            closed_at,
        };

        sqlx::query(
            "INSERT INTO round_results (round_id, winner_id, votes_count, closed_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&result.round_id)
        .bind(&result.winner_id)
        .bind(i64::from(result.votes_count))
        .bind(result.closed_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn get_result(&self, round_id: &str) -> StoreResult<Option<RoundResult>> {
        let row = sqlx::query("SELECT * FROM round_results WHERE round_id = ?")
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(result_from_row).transpose()?)
    }

    async fn upsert_vote(&self, vote: Vote) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO votes (round_id, voter_id, target_id, cast_at)
             SELECT ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM rounds WHERE id = ? AND closed_at IS NULL)
             ON CONFLICT (round_id, voter_id)
             DO UPDATE SET target_id = excluded.target_id, cast_at = excluded.cast_at",
        )
        .bind(&vote.round_id)
        .bind(&vote.voter_id)
        .bind(&vote.target_id)
        .bind(vote.cast_at)
        .bind(&vote.round_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.get_round(&vote.round_id).await? {
            Some(_) => Err(StoreError::Conflict(format!("round {} is closed", vote.round_id))),
            None => Err(StoreError::NotFound(format!("round {}", vote.round_id))),
        }
    }

    async fn get_vote(&self, round_id: &str, voter_id: &str) -> StoreResult<Option<Vote>> {
        let row = sqlx::query("SELECT * FROM votes WHERE round_id = ? AND voter_id = ?")
            .bind(round_id)
            .bind(voter_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(vote_from_row).transpose()?)
    }

    async fn list_votes(&self, round_id: &str) -> StoreResult<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE round_id = ? ORDER BY voter_id")
            .bind(round_id)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(&rows, vote_from_row)
    }

    async fn mark_statement_used(&self, used: UsedStatement) -> StoreResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO used_statements (group_id, statement_id, used_at) VALUES (?, ?, ?)",
        )
        .bind(&used.group_id)
        .bind(&used.statement_id)
        .bind(used.used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn used_statement_ids(&self, group_id: &str) -> StoreResult<HashSet<StatementId>> {
        let rows = sqlx::query("SELECT statement_id FROM used_statements WHERE group_id = ?")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("statement_id").map_err(Into::into))
            .collect()
    }

    async fn clear_used_statements(&self, group_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM used_statements WHERE group_id = ?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_points(&self, group_id: &str, user_id: &str, delta: u32) -> StoreResult<u32> {
        let row = sqlx::query(
            "INSERT INTO points (group_id, user_id, points) VALUES (?, ?, ?)
             ON CONFLICT (group_id, user_id) DO UPDATE SET points = points + excluded.points
             RETURNING points",
        )
        .bind(group_id)
        .bind(user_id)
        .bind(i64::from(delta))
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = row.try_get("points")?;
        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }

    async fn list_points(&self, group_id: &str) -> StoreResult<Vec<Points>> {
        let rows = sqlx::query("SELECT group_id, user_id, points FROM points WHERE group_id = ?")
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        collect_rows(&rows, points_from_row)
    }

    async fn insert_comment(&self, comment: Comment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, round_id, author_id, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.round_id)
        .bind(&comment.author_id)
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_comments(&self, round_id: &str) -> StoreResult<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE round_id = ?")
            .bind(round_id)
            .fetch_all(&self.pool)
            .await?;
        let mut comments = collect_rows(&rows, comment_from_row)?;
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }
}
