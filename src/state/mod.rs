mod comment;
mod content;
mod group;
mod round;
mod score;
mod selector;
mod tally;
mod vote;

pub use content::{validate_slug, EditionPatch};
pub use group::MAX_GROUP_NAME_CHARS;
pub use round::{
    all_members_voted, next_round_due, should_close, should_open, CurrentRound, RoundSummary,
    VoteProgress,
};
pub use score::{rank, LeaderboardEntry};
pub use selector::eligible_pool;
pub use tally::{tally, Tally};
pub use vote::VoteReceipt;

use crate::config::GameConfig;
use crate::error::{GameError, GameResult};
use crate::notify::Dispatcher;
use crate::store::Store;
use crate::types::*;
use std::sync::Arc;

/// Shared service running the round lifecycle on top of a [`Store`]
#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn Store>,
    dispatcher: Dispatcher,
    config: GameConfig,
}

impl GameService {
    pub fn new(store: Arc<dyn Store>, dispatcher: Dispatcher, config: GameConfig) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub(crate) async fn load_group(&self, group_id: &str) -> GameResult<Group> {
        self.store
            .get_group(group_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("group {}", group_id)))
    }

    pub(crate) async fn load_round(&self, round_id: &str) -> GameResult<Round> {
        self.store
            .get_round(round_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("round {}", round_id)))
    }

    /// Load a group the caller belongs to
    pub(crate) async fn member_group(&self, group_id: &str, user_id: &str) -> GameResult<Group> {
        let group = self.load_group(group_id).await?;
        if !group.is_member(user_id) {
            return Err(GameError::Forbidden(format!(
                "{} is not a member of group {}",
                user_id, group_id
            )));
        }
        Ok(group)
    }

    /// Load a group only its owner may manage
    pub(crate) async fn owned_group(&self, group_id: &str, user_id: &str) -> GameResult<Group> {
        let group = self.load_group(group_id).await?;
        if !group.is_owner(user_id) {
            return Err(GameError::Forbidden(format!(
                "only the owner may manage group {}",
                group_id
            )));
        }
        Ok(group)
    }

    /// Load a round whose group the caller belongs to
    pub(crate) async fn member_round(
        &self,
        round_id: &str,
        user_id: &str,
    ) -> GameResult<(Round, Group)> {
        let round = self.load_round(round_id).await?;
        let group = self.member_group(&round.group_id, user_id).await?;
        Ok((round, group))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    pub fn service() -> GameService {
        GameService::new(
            Arc::new(MemoryStore::new()),
            Dispatcher::default(),
            GameConfig::default(),
        )
    }

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    /// Active edition with `count` statements
    pub async fn seed_edition(service: &GameService, slug: &str, count: usize) -> Edition {
        let edition = service
            .create_edition(slug.to_string(), slug.to_string(), true)
            .await
            .unwrap();
        for i in 0..count {
            service
                .create_statement(&edition.id, format!("Most likely to do thing #{}", i))
                .await
                .unwrap();
        }
        edition
    }

    /// Group owned by the first member
    pub async fn seed_group(service: &GameService, edition_id: &str, members: &[&str]) -> Group {
        let owner = members[0];
        let mut group = service
            .create_group(owner, "Test group".to_string(), edition_id, t0())
            .await
            .unwrap();
        for member in &members[1..] {
            group = service.add_member(&group.id, owner, member).await.unwrap();
        }
        group
    }
}
