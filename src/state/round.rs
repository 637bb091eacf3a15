use super::tally::tally;
use super::GameService;
use crate::error::{GameError, GameResult};
use crate::notify::RoundEvent;
use crate::store::StoreError;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Every current member has cast a vote; abstentions count as voted
pub fn all_members_voted(votes: &[Vote], members: &BTreeSet<UserId>) -> bool {
    !members.is_empty() && VoteProgress::of(votes, members).voters >= members.len()
}

/// An open round closes once it expires or once every member has voted
pub fn should_close(
    round: &Round,
    votes: &[Vote],
    members: &BTreeSet<UserId>,
    now: DateTime<Utc>,
) -> bool {
    round.is_open() && (round.is_expired(now) || all_members_voted(votes, members))
}

/// Earliest time the next round may open after `last_closed`
pub fn next_round_due(last_closed: Option<&Round>, cooldown: Duration) -> Option<DateTime<Utc>> {
    last_closed
        .and_then(|round| round.closed_at)
        .map(|closed_at| closed_at + cooldown)
}

pub fn should_open(
    has_open_round: bool,
    last_closed: Option<&Round>,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> bool {
    if has_open_round {
        return false;
    }
    match next_round_due(last_closed, cooldown) {
        Some(due) => now >= due,
        None => true,
    }
}

/// Who-voted counts without revealing any choice
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoteProgress {
    pub voters: usize,
    pub members: usize,
}

impl VoteProgress {
    /// Distinct voters that are still members
    pub fn of(votes: &[Vote], members: &BTreeSet<UserId>) -> Self {
        let voters: HashSet<&str> = votes
            .iter()
            .map(|v| v.voter_id.as_str())
            .filter(|voter| members.contains(*voter))
            .collect();
        Self {
            voters: voters.len(),
            members: members.len(),
        }
    }
}

/// A group's round status as shown to one member
#[derive(Debug, Clone, Serialize)]
pub struct CurrentRound {
    pub phase: RoundPhase,
    /// The open round, or the last closed one
    pub round: Option<Round>,
    pub statement: Option<String>,
    pub progress: Option<VoteProgress>,
    pub has_voted: bool,
    pub result: Option<RoundResult>,
    pub next_round_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    #[serde(flatten)]
    pub round: Round,
    pub statement: Option<String>,
    pub result: Option<RoundResult>,
}

/// Result of a close attempt
#[derive(Debug, Clone)]
pub(crate) struct Closing {
    pub result: RoundResult,
    /// False when another caller had already closed the round
    pub newly_closed: bool,
    pub notified: usize,
}

impl GameService {
    /// Open a round for a group that has none.
    ///
    /// Fails with `Conflict` when a round is already open (including when a
    /// concurrent opener wins the insert) and with `NoContent` when the
    /// group's edition has no statements.
    pub async fn open_round(&self, group_id: &str, now: DateTime<Utc>) -> GameResult<Round> {
        let (round, _) = self.open_round_notified(group_id, now).await?;
        Ok(round)
    }

    /// Owner-initiated open; skips the cooldown but not the one-open-round rule
    pub async fn start_round(
        &self,
        group_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> GameResult<Round> {
        self.owned_group(group_id, user_id).await?;
        self.open_round(group_id, now).await
    }

    pub(crate) async fn open_round_notified(
        &self,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> GameResult<(Round, usize)> {
        let group = self.load_group(group_id).await?;
        if let Some(open) = self.store.open_round_for_group(group_id).await? {
            return Err(GameError::Conflict(format!(
                "group {} already has open round {}",
                group_id, open.id
            )));
        }

        let statement = self.pick_for_group(&group).await?.ok_or_else(|| {
            GameError::NoContent(format!("edition {} has no statements", group.edition_id))
        })?;

        // Marked before the insert so a concurrent opener sees it as used
        self.store
            .mark_statement_used(UsedStatement {
                group_id: group.id.clone(),
                statement_id: statement.id.clone(),
                used_at: now,
            })
            .await?;

        let round = Round {
            id: new_id(),
            group_id: group.id.clone(),
            statement_id: statement.id,
            issued_at: now,
            expires_at: now + self.config.voting_window,
            closed_at: None,
        };
        self.store.insert_round(round.clone()).await?;

        tracing::info!(
            group_id,
            round_id = %round.id,
            statement_id = %round.statement_id,
            expires_at = %round.expires_at,
            "Opened round"
        );
        let notified = self.dispatcher.dispatch(RoundEvent::opened(&round));
        Ok((round, notified))
    }

    /// Open a round if the group has none and its cooldown has elapsed
    pub(crate) async fn open_round_if_due(
        &self,
        group_id: &str,
        now: DateTime<Utc>,
    ) -> GameResult<Option<(Round, usize)>> {
        if self.store.open_round_for_group(group_id).await?.is_some() {
            return Ok(None);
        }
        let last_closed = self.store.last_closed_round(group_id).await?;
        if !should_open(false, last_closed.as_ref(), self.config.cooldown, now) {
            return Ok(None);
        }
        self.open_round_notified(group_id, now).await.map(Some)
    }

    /// Close a round, tallying whatever votes exist now.
    ///
    /// Idempotent: closing an already closed round returns the stored result
    /// and awards nothing.
    pub async fn close_round(&self, round_id: &str, now: DateTime<Utc>) -> GameResult<RoundResult> {
        let closing = self.close_round_notified(round_id, now).await?;
        Ok(closing.result)
    }

    pub(crate) async fn close_round_notified(
        &self,
        round_id: &str,
        now: DateTime<Utc>,
    ) -> GameResult<Closing> {
        if let Some(existing) = self.store.get_result(round_id).await? {
            return Ok(Closing {
                result: existing,
                newly_closed: false,
                notified: 0,
            });
        }

        let round = self.load_round(round_id).await?;
        let winner_of = |votes: &[Vote]| tally(votes).winner;
        let result = match self.store.close_round(round_id, now, &winner_of).await {
            Ok(result) => result,
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(round_id, "Round was closed concurrently");
                let existing = self.store.get_result(round_id).await?.ok_or_else(|| {
                    GameError::NotFound(format!("result for round {}", round_id))
                })?;
                return Ok(Closing {
                    result: existing,
                    newly_closed: false,
                    notified: 0,
                });
            }
            Err(e) => return Err(e.into()),
        };

        // Only the caller that stored the result gets here, so the point is
        // awarded at most once
        if let Some(winner) = &result.winner_id {
            if let Err(e) = self.award(&round.group_id, winner, 1).await {
                tracing::error!(
                    round_id,
                    group_id = %round.group_id,
                    winner_id = %winner,
                    "Failed to award point: {}",
                    e
                );
            }
        }

        tracing::info!(
            round_id,
            group_id = %round.group_id,
            votes = result.votes_count,
            winner_id = result.winner_id.as_deref().unwrap_or("-"),
            "Closed round"
        );
        let notified = self
            .dispatcher
            .dispatch(RoundEvent::closed(&round, result.winner_id.clone()));

        Ok(Closing {
            result,
            newly_closed: true,
            notified,
        })
    }

    /// Close `round` if it has expired or is fully voted
    pub(crate) async fn close_if_due(
        &self,
        round: &Round,
        now: DateTime<Utc>,
    ) -> GameResult<Option<Closing>> {
        let group = self.load_group(&round.group_id).await?;
        let votes = self.store.list_votes(&round.id).await?;
        if !should_close(round, &votes, &group.members, now) {
            return Ok(None);
        }
        self.close_round_notified(&round.id, now).await.map(Some)
    }

    pub async fn current_round(&self, group_id: &str, user_id: &str) -> GameResult<CurrentRound> {
        let group = self.member_group(group_id, user_id).await?;

        if let Some(round) = self.store.open_round_for_group(group_id).await? {
            let votes = self.store.list_votes(&round.id).await?;
            let statement = self.statement_text(&round.statement_id).await?;
            return Ok(CurrentRound {
                phase: RoundPhase::Open,
                progress: Some(VoteProgress::of(&votes, &group.members)),
                has_voted: votes.iter().any(|v| v.voter_id == user_id),
                round: Some(round),
                statement,
                result: None,
                next_round_at: None,
            });
        }

        let Some(last) = self.store.last_closed_round(group_id).await? else {
            return Ok(CurrentRound {
                phase: RoundPhase::None,
                round: None,
                statement: None,
                progress: None,
                has_voted: false,
                result: None,
                next_round_at: None,
            });
        };

        let votes = self.store.list_votes(&last.id).await?;
        Ok(CurrentRound {
            phase: RoundPhase::Closed,
            statement: self.statement_text(&last.statement_id).await?,
            result: self.store.get_result(&last.id).await?,
            has_voted: votes.iter().any(|v| v.voter_id == user_id),
            progress: None,
            next_round_at: next_round_due(Some(&last), self.config.cooldown),
            round: Some(last),
        })
    }

    /// Newest first
    pub async fn round_history(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> GameResult<Vec<RoundSummary>> {
        self.member_group(group_id, user_id).await?;
        let rounds = self.store.list_rounds(group_id).await?;

        let mut history = Vec::with_capacity(rounds.len());
        for round in rounds {
            history.push(RoundSummary {
                statement: self.statement_text(&round.statement_id).await?,
                result: self.store.get_result(&round.id).await?,
                round,
            });
        }
        Ok(history)
    }

    pub async fn round_result(&self, round_id: &str, user_id: &str) -> GameResult<RoundResult> {
        self.member_round(round_id, user_id).await?;
        self.store
            .get_result(round_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("round {} is still open", round_id)))
    }

    async fn statement_text(&self, statement_id: &str) -> GameResult<Option<String>> {
        Ok(self
            .store
            .get_statement(statement_id)
            .await?
            .map(|statement| statement.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[tokio::test]
    async fn test_open_round_sets_deadline() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;

        let round = service.open_round(&group.id, t0()).await.unwrap();

        assert_eq!(round.issued_at, t0());
        assert_eq!(round.expires_at, t0() + Duration::hours(24));
        assert!(round.is_open());
        let used = service.store().used_statement_ids(&group.id).await.unwrap();
        assert!(used.contains(&round.statement_id));
    }

    #[tokio::test]
    async fn test_second_open_conflicts() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice"]).await;

        service.open_round(&group.id, t0()).await.unwrap();
        let err = service.open_round(&group.id, t0()).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_open_without_content() {
        let service = service();
        let edition = seed_edition(&service, "empty", 0).await;
        let group = seed_group(&service, &edition.id, &["alice"]).await;

        let err = service.open_round(&group.id, t0()).await.unwrap_err();
        assert!(matches!(err, GameError::NoContent(_)));
    }

    #[tokio::test]
    async fn test_only_owner_starts_rounds() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;

        let err = service.start_round(&group.id, "bob", t0()).await.unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));
        assert!(service.start_round(&group.id, "alice", t0()).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob", "carol"]).await;
        let round = service.open_round(&group.id, t0()).await.unwrap();
        service
            .submit_vote(&round.id, "alice", Some("bob".to_string()), t0())
            .await
            .unwrap();

        let later = t0() + Duration::hours(25);
        let first = service.close_round(&round.id, later).await.unwrap();
        let second = service
            .close_round(&round.id, later + Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.winner_id.as_deref(), Some("bob"));
        let board = service.leaderboard(&group.id).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].points, 1);
    }

    #[tokio::test]
    async fn test_close_unknown_round() {
        let service = service();
        let err = service.close_round("missing", t0()).await.unwrap_err();
        assert!(matches!(err, GameError::NotFound(_)));
    }

    #[test]
    fn test_should_open_respects_cooldown() {
        let cooldown = Duration::hours(48);
        let closed = Round {
            id: "r1".to_string(),
            group_id: "g1".to_string(),
            statement_id: "s1".to_string(),
            issued_at: t0(),
            expires_at: t0() + Duration::hours(24),
            closed_at: Some(t0() + Duration::hours(2)),
        };

        assert!(should_open(false, None, cooldown, t0()));
        assert!(!should_open(true, None, cooldown, t0()));
        assert!(!should_open(
            false,
            Some(&closed),
            cooldown,
            t0() + Duration::hours(49)
        ));
        assert!(should_open(
            false,
            Some(&closed),
            cooldown,
            t0() + Duration::hours(50)
        ));
    }

    #[test]
    fn test_completeness_ignores_former_members() {
        let members: BTreeSet<UserId> = ["alice", "bob"].iter().map(|s| s.to_string()).collect();
        let vote = |voter: &str| Vote {
            round_id: "r1".to_string(),
            voter_id: voter.to_string(),
            target_id: None,
            cast_at: t0(),
        };

        assert!(!all_members_voted(&[vote("alice"), vote("mallory")], &members));
        assert!(all_members_voted(&[vote("alice"), vote("bob")], &members));
        assert!(!all_members_voted(&[], &BTreeSet::new()));
    }

    #[tokio::test]
    async fn test_current_round_phases() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;

        let view = service.current_round(&group.id, "alice").await.unwrap();
        assert_eq!(view.phase, RoundPhase::None);

        let round = service.open_round(&group.id, t0()).await.unwrap();
        service
            .submit_vote(&round.id, "alice", Some("bob".to_string()), t0())
            .await
            .unwrap();
        let view = service.current_round(&group.id, "alice").await.unwrap();
        assert_eq!(view.phase, RoundPhase::Open);
        assert!(view.has_voted);
        assert_eq!(
            view.progress,
            Some(VoteProgress {
                voters: 1,
                members: 2
            })
        );
        assert!(view.statement.is_some());

        service
            .close_round(&round.id, t0() + Duration::hours(1))
            .await
            .unwrap();
        let view = service.current_round(&group.id, "bob").await.unwrap();
        assert_eq!(view.phase, RoundPhase::Closed);
        assert_eq!(
            view.next_round_at,
            Some(t0() + Duration::hours(1) + Duration::hours(48))
        );
    }

    #[tokio::test]
    async fn test_outsider_cannot_see_round() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice"]).await;

        let err = service.current_round(&group.id, "mallory").await.unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice"]).await;

        let first = service.open_round(&group.id, t0()).await.unwrap();
        service.close_round(&first.id, t0()).await.unwrap();
        let second = service
            .open_round(&group.id, t0() + Duration::hours(1))
            .await
            .unwrap();

        let history = service.round_history(&group.id, "alice").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].round.id, second.id);
        assert!(history[0].result.is_none());
        assert!(history[1].result.is_some());
    }
}
