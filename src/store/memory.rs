//! In-process store with JSON snapshot export/import.
//!
//! All tables live behind one lock so that every multi-table primitive
//! (`close_round`, `delete_group`) is applied atomically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult};
use crate::types::*;

/// Snapshots with a newer version are refused on import
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default)]
struct Tables {
    editions: HashMap<EditionId, Edition>,
    statements: HashMap<StatementId, Statement>,
    groups: HashMap<GroupId, Group>,
    rounds: HashMap<RoundId, Round>,
    results: HashMap<RoundId, RoundResult>,
    votes: HashMap<(RoundId, UserId), Vote>,
    used: HashMap<(GroupId, StatementId), UsedStatement>,
    points: HashMap<(GroupId, UserId), u32>,
    comments: Vec<Comment>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a consistent copy of every table
    pub async fn export_snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read().await;
        StoreSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            exported_at: Utc::now(),
            editions: tables.editions.values().cloned().collect(),
            statements: tables.statements.values().cloned().collect(),
            groups: tables.groups.values().cloned().collect(),
            rounds: tables.rounds.values().cloned().collect(),
            results: tables.results.values().cloned().collect(),
            votes: tables.votes.values().cloned().collect(),
            used_statements: tables.used.values().cloned().collect(),
            points: tables
                .points
                .iter()
                .map(|((group_id, user_id), points)| Points {
                    group_id: group_id.clone(),
                    user_id: user_id.clone(),
                    points: *points,
                })
                .collect(),
            comments: tables.comments.clone(),
        }
    }

    /// Replace all state with the snapshot contents
    pub async fn import_snapshot(&self, snapshot: StoreSnapshot) -> Result<(), String> {
        snapshot.validate()?;

        let mut tables = Tables::default();
        for edition in snapshot.editions {
            tables.editions.insert(edition.id.clone(), edition);
        }
        for statement in snapshot.statements {
            tables.statements.insert(statement.id.clone(), statement);
        }
        for group in snapshot.groups {
            tables.groups.insert(group.id.clone(), group);
        }
        for round in snapshot.rounds {
            tables.rounds.insert(round.id.clone(), round);
        }
        for result in snapshot.results {
            tables.results.insert(result.round_id.clone(), result);
        }
        for vote in snapshot.votes {
            tables
                .votes
                .insert((vote.round_id.clone(), vote.voter_id.clone()), vote);
        }
        for used in snapshot.used_statements {
            tables
                .used
                .insert((used.group_id.clone(), used.statement_id.clone()), used);
        }
        for row in snapshot.points {
            tables.points.insert((row.group_id, row.user_id), row.points);
        }
        tables.comments = snapshot.comments;
        tables.comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        *self.tables.write().await = tables;
        Ok(())
    }

    /// Load a snapshot file if it exists
    pub async fn load_from_file(&self, path: &Path) -> Result<bool, String> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(format!("Failed to read {}: {}", path.display(), e)),
        };
        let snapshot: StoreSnapshot = serde_json::from_str(&raw)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        self.import_snapshot(snapshot).await?;
        Ok(true)
    }

    /// Write the current state to a snapshot file
    pub async fn save_to_file(&self, path: &Path) -> Result<(), String> {
        let snapshot = self.export_snapshot().await;
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| format!("Failed to serialize snapshot: {}", e))?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }
}

/// A serializable copy of the full store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub editions: Vec<Edition>,
    pub statements: Vec<Statement>,
    pub groups: Vec<Group>,
    pub rounds: Vec<Round>,
    pub results: Vec<RoundResult>,
    pub votes: Vec<Vote>,
    pub used_statements: Vec<UsedStatement>,
    pub points: Vec<Points>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl StoreSnapshot {
    /// Validate the snapshot before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > SNAPSHOT_SCHEMA_VERSION {
            return Err(format!(
                "Snapshot schema version {} is newer than supported version {}",
                self.schema_version, SNAPSHOT_SCHEMA_VERSION
            ));
        }

        let group_ids: HashSet<&str> = self.groups.iter().map(|g| g.id.as_str()).collect();
        let mut open_groups = HashSet::new();
        for round in &self.rounds {
            if !group_ids.contains(round.group_id.as_str()) {
                return Err(format!(
                    "Round '{}' references unknown group '{}'",
                    round.id, round.group_id
                ));
            }
            if round.is_open() && !open_groups.insert(round.group_id.as_str()) {
                return Err(format!(
                    "Group '{}' has more than one open round",
                    round.group_id
                ));
            }
        }

        let mut closed = HashSet::new();
        for result in &self.results {
            if !closed.insert(result.round_id.as_str()) {
                return Err(format!(
                    "Round '{}' has more than one result",
                    result.round_id
                ));
            }
        }

        Ok(())
    }
}

fn newest_first(rounds: &mut [Round]) {
    rounds.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then_with(|| b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_edition(&self, edition: Edition) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.editions.values().any(|e| e.slug == edition.slug) {
            return Err(StoreError::Conflict(format!(
                "edition slug '{}' already exists",
                edition.slug
            )));
        }
        tables.editions.insert(edition.id.clone(), edition);
        Ok(())
    }

    async fn update_edition(&self, edition: Edition) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .editions
            .values()
            .any(|e| e.slug == edition.slug && e.id != edition.id)
        {
            return Err(StoreError::Conflict(format!(
                "edition slug '{}' already exists",
                edition.slug
            )));
        }
        match tables.editions.get_mut(&edition.id) {
            Some(existing) => {
                *existing = edition;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("edition {}", edition.id))),
        }
    }

    async fn delete_edition(&self, id: &str) -> StoreResult<bool> {
        Ok(self.tables.write().await.editions.remove(id).is_some())
    }

    async fn get_edition(&self, id: &str) -> StoreResult<Option<Edition>> {
        Ok(self.tables.read().await.editions.get(id).cloned())
    }

    async fn list_editions(&self) -> StoreResult<Vec<Edition>> {
        let mut editions: Vec<Edition> =
            self.tables.read().await.editions.values().cloned().collect();
        editions.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(editions)
    }

    async fn insert_statement(&self, statement: Statement) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.statements.contains_key(&statement.id) {
            return Err(StoreError::Conflict(format!(
                "statement {} already exists",
                statement.id
            )));
        }
        tables.statements.insert(statement.id.clone(), statement);
        Ok(())
    }

    async fn update_statement(&self, statement: Statement) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.statements.get_mut(&statement.id) {
            Some(existing) => {
                *existing = statement;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("statement {}", statement.id))),
        }
    }

    async fn get_statement(&self, id: &str) -> StoreResult<Option<Statement>> {
        Ok(self.tables.read().await.statements.get(id).cloned())
    }

    async fn list_statements(&self, edition_id: &str) -> StoreResult<Vec<Statement>> {
        let mut statements: Vec<Statement> = self
            .tables
            .read()
            .await
            .statements
            .values()
            .filter(|s| s.edition_id == edition_id)
            .cloned()
            .collect();
        statements.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(statements)
    }

    async fn insert_group(&self, group: Group) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.groups.contains_key(&group.id) {
            return Err(StoreError::Conflict(format!(
                "group {} already exists",
                group.id
            )));
        }
        tables.groups.insert(group.id.clone(), group);
        Ok(())
    }

    async fn rename_group(&self, id: &str, name: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", id)))?;
        group.name = name.to_string();
        Ok(())
    }

    async fn add_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(group_id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", group_id)))?;
        Ok(group.members.insert(user_id.to_string()))
    }

    async fn remove_member(&self, group_id: &str, user_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(group_id)
            .ok_or_else(|| StoreError::NotFound(format!("group {}", group_id)))?;
        Ok(group.members.remove(user_id))
    }

    async fn delete_group(&self, id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.groups.remove(id).is_none() {
            return Ok(false);
        }

        let round_ids: HashSet<RoundId> = tables
            .rounds
            .values()
            .filter(|r| r.group_id == id)
            .map(|r| r.id.clone())
            .collect();
        tables.rounds.retain(|_, r| r.group_id != id);
        tables.results.retain(|round_id, _| !round_ids.contains(round_id));
        tables
            .votes
            .retain(|(round_id, _), _| !round_ids.contains(round_id));
        tables.comments.retain(|c| !round_ids.contains(&c.round_id));
        tables.used.retain(|(group_id, _), _| group_id != id);
        tables.points.retain(|(group_id, _), _| group_id != id);
        Ok(true)
    }

    async fn get_group(&self, id: &str) -> StoreResult<Option<Group>> {
        Ok(self.tables.read().await.groups.get(id).cloned())
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let mut groups: Vec<Group> = self.tables.read().await.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(groups)
    }

    async fn insert_round(&self, round: Round) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.groups.contains_key(&round.group_id) {
            return Err(StoreError::NotFound(format!("group {}", round.group_id)));
        }
        if tables
            .rounds
            .values()
            .any(|r| r.group_id == round.group_id && r.is_open())
        {
            return Err(StoreError::Conflict(format!(
                "group {} already has an open round",
                round.group_id
            )));
        }
        if tables.rounds.contains_key(&round.id) {
            return Err(StoreError::Conflict(format!(
                "round {} already exists",
                round.id
            )));
        }
        tables.rounds.insert(round.id.clone(), round);
        Ok(())
    }

    async fn get_round(&self, id: &str) -> StoreResult<Option<Round>> {
        Ok(self.tables.read().await.rounds.get(id).cloned())
    }

    async fn open_round_for_group(&self, group_id: &str) -> StoreResult<Option<Round>> {
        Ok(self
            .tables
            .read()
            .await
            .rounds
            .values()
            .find(|r| r.group_id == group_id && r.is_open())
            .cloned())
    }

    async fn last_closed_round(&self, group_id: &str) -> StoreResult<Option<Round>> {
        Ok(self
            .tables
            .read()
            .await
            .rounds
            .values()
            .filter(|r| r.group_id == group_id && r.closed_at.is_some())
            .max_by(|a, b| a.closed_at.cmp(&b.closed_at))
            .cloned())
    }

    async fn list_rounds(&self, group_id: &str) -> StoreResult<Vec<Round>> {
        let mut rounds: Vec<Round> = self
            .tables
            .read()
            .await
            .rounds
            .values()
            .filter(|r| r.group_id == group_id)
            .cloned()
            .collect();
        newest_first(&mut rounds);
        Ok(rounds)
    }

    async fn list_open_rounds(&self) -> StoreResult<Vec<Round>> {
        let mut rounds: Vec<Round> = self
            .tables
            .read()
            .await
            .rounds
            .values()
            .filter(|r| r.is_open())
            .cloned()
            .collect();
        rounds.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(rounds)
    }

    async fn close_round(
        &self,
        round_id: &str,
        closed_at: DateTime<Utc>,
        winner_of: &(dyn for<'v> Fn(&'v [Vote]) -> Option<UserId> + Send + Sync),
    ) -> StoreResult<RoundResult> {
        let mut tables = self.tables.write().await;
        if tables.results.contains_key(round_id) {
            return Err(StoreError::Conflict(format!(
                "round {} already has a result",
                round_id
            )));
        }
        let votes: Vec<Vote> = tables
            .votes
            .values()
            .filter(|v| v.round_id == round_id)
            .cloned()
            .collect();
        let round = tables
            .rounds
            .get_mut(round_id)
            .ok_or_else(|| StoreError::NotFound(format!("round {}", round_id)))?;
        if round.closed_at.is_some() {
            return Err(StoreError::Conflict(format!("round {} is closed", round_id)));
        }
        round.closed_at = Some(closed_at);

        let result = RoundResult {
            round_id: round_id.to_string(),
            winner_id: winner_of(&votes),
            votes_count: u32::try_from(votes.len()).unwrap_or(u32::MAX),
            closed_at,
        };
        tables.results.insert(round_id.to_string(), result.clone());
        Ok(result)
    }

    async fn get_result(&self, round_id: &str) -> StoreResult<Option<RoundResult>> {
        Ok(self.tables.read().await.results.get(round_id).cloned())
    }

    async fn upsert_vote(&self, vote: Vote) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        match tables.rounds.get(&vote.round_id) {
            None => return Err(StoreError::NotFound(format!("round {}", vote.round_id))),
            Some(round) if !round.is_open() => {
                return Err(StoreError::Conflict(format!(
                    "round {} is closed",
                    vote.round_id
                )))
            }
            Some(_) => {}
        }
        tables
            .votes
            .insert((vote.round_id.clone(), vote.voter_id.clone()), vote);
        Ok(())
    }

    async fn get_vote(&self, round_id: &str, voter_id: &str) -> StoreResult<Option<Vote>> {
        Ok(self
            .tables
            .read()
            .await
            .votes
            .get(&(round_id.to_string(), voter_id.to_string()))
            .cloned())
    }

    async fn list_votes(&self, round_id: &str) -> StoreResult<Vec<Vote>> {
        let mut votes: Vec<Vote> = self
            .tables
            .read()
            .await
            .votes
            .values()
            .filter(|v| v.round_id == round_id)
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.voter_id.cmp(&b.voter_id));
        Ok(votes)
    }

    async fn mark_statement_used(&self, used: UsedStatement) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .used
            .entry((used.group_id.clone(), used.statement_id.clone()))
            .or_insert(used);
        Ok(())
    }

    async fn used_statement_ids(&self, group_id: &str) -> StoreResult<HashSet<StatementId>> {
        Ok(self
            .tables
            .read()
            .await
            .used
            .keys()
            .filter(|(g, _)| g == group_id)
            .map(|(_, statement_id)| statement_id.clone())
            .collect())
    }

    async fn clear_used_statements(&self, group_id: &str) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .used
            .retain(|(g, _), _| g != group_id);
        Ok(())
    }

    async fn add_points(&self, group_id: &str, user_id: &str, delta: u32) -> StoreResult<u32> {
        let mut tables = self.tables.write().await;
        let total = tables
            .points
            .entry((group_id.to_string(), user_id.to_string()))
            .or_insert(0);
        *total = total.saturating_add(delta);
        Ok(*total)
    }

    async fn list_points(&self, group_id: &str) -> StoreResult<Vec<Points>> {
        Ok(self
            .tables
            .read()
            .await
            .points
            .iter()
            .filter(|((g, _), _)| g == group_id)
            .map(|((g, user_id), points)| Points {
                group_id: g.clone(),
                user_id: user_id.clone(),
                points: *points,
            })
            .collect())
    }

    async fn insert_comment(&self, comment: Comment) -> StoreResult<()> {
        self.tables.write().await.comments.push(comment);
        Ok(())
    }

    async fn list_comments(&self, round_id: &str) -> StoreResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .tables
            .read()
            .await
            .comments
            .iter()
            .filter(|c| c.round_id == round_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }
}
