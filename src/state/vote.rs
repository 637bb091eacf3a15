use super::round::VoteProgress;
use super::GameService;
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Acknowledgement of a stored vote
#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
    pub vote: Vote,
    /// The vote completed the member set and the round closed right away
    pub round_closed: bool,
}

impl GameService {
    /// Cast or replace the caller's vote; `target_id: None` abstains.
    ///
    /// Once every member has voted the round is closed immediately. A failure
    /// of that close is logged and left to the scheduler, the vote stands.
    pub async fn submit_vote(
        &self,
        round_id: &str,
        voter_id: &str,
        target_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> GameResult<VoteReceipt> {
        let (round, group) = self.member_round(round_id, voter_id).await?;

        if !round.is_open() || self.store.get_result(round_id).await?.is_some() {
            return Err(GameError::Conflict(format!("round {} is closed", round_id)));
        }
        if round.is_expired(now) {
            return Err(GameError::Conflict(format!(
                "voting for round {} ended at {}",
                round_id, round.expires_at
            )));
        }

        if let Some(target) = &target_id {
            if target == voter_id {
                return Err(GameError::Validation(
                    "you cannot vote for yourself".to_string(),
                ));
            }
            if !group.is_member(target) {
                return Err(GameError::Validation(format!(
                    "{} is not a member of this group",
                    target
                )));
            }
        }

        let vote = Vote {
            round_id: round.id.clone(),
            voter_id: voter_id.to_string(),
            target_id,
            cast_at: now,
        };
        // Refused with Conflict by the store if a close got in first
        self.store.upsert_vote(vote.clone()).await?;
        tracing::debug!(round_id, voter_id, abstained = vote.is_abstention(), "Vote stored");

        let round_closed = match self.close_if_due(&round, now).await {
            Ok(closing) => closing.is_some(),
            Err(e) => {
                tracing::warn!(round_id, "Closing fully voted round failed: {}", e);
                false
            }
        };

        Ok(VoteReceipt { vote, round_closed })
    }

    /// The caller's own vote, if any
    pub async fn my_vote(&self, round_id: &str, user_id: &str) -> GameResult<Option<Vote>> {
        self.member_round(round_id, user_id).await?;
        Ok(self.store.get_vote(round_id, user_id).await?)
    }

    pub async fn vote_progress(&self, round_id: &str) -> GameResult<VoteProgress> {
        let round = self.load_round(round_id).await?;
        let group = self.load_group(&round.group_id).await?;
        let votes = self.store.list_votes(round_id).await?;
        Ok(VoteProgress::of(&votes, &group.members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use chrono::Duration;

    async fn open_game(members: &[&str]) -> (GameService, Group, Round) {
        let service = service();
        let edition = seed_edition(&service, "classic", 5).await;
        let group = seed_group(&service, &edition.id, members).await;
        let round = service.open_round(&group.id, t0()).await.unwrap();
        (service, group, round)
    }

    #[tokio::test]
    async fn test_resubmission_overwrites() {
        let (service, _group, round) = open_game(&["alice", "bob", "carol"]).await;

        service
            .submit_vote(&round.id, "alice", Some("bob".to_string()), t0())
            .await
            .unwrap();
        service
            .submit_vote(&round.id, "alice", Some("carol".to_string()), t0())
            .await
            .unwrap();

        let votes = service.store().list_votes(&round.id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].target_id.as_deref(), Some("carol"));
        let mine = service.my_vote(&round.id, "alice").await.unwrap().unwrap();
        assert_eq!(mine.target_id.as_deref(), Some("carol"));
    }

    #[tokio::test]
    async fn test_self_vote_rejected() {
        let (service, _group, round) = open_game(&["alice", "bob"]).await;

        let err = service
            .submit_vote(&round.id, "alice", Some("alice".to_string()), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_target_must_be_member() {
        let (service, _group, round) = open_game(&["alice", "bob"]).await;

        let err = service
            .submit_vote(&round.id, "alice", Some("mallory".to_string()), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[tokio::test]
    async fn test_outsider_cannot_vote() {
        let (service, _group, round) = open_game(&["alice", "bob"]).await;

        let err = service
            .submit_vote(&round.id, "mallory", None, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_expired_round_rejects_votes() {
        let (service, _group, round) = open_game(&["alice", "bob"]).await;

        let err = service
            .submit_vote(&round.id, "alice", None, t0() + Duration::hours(24))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_last_vote_closes_round() {
        let (service, group, round) = open_game(&["alice", "bob"]).await;

        let first = service
            .submit_vote(&round.id, "alice", Some("bob".to_string()), t0())
            .await
            .unwrap();
        assert!(!first.round_closed);

        let second = service
            .submit_vote(&round.id, "bob", None, t0())
            .await
            .unwrap();
        assert!(second.round_closed);

        let result = service.round_result(&round.id, "alice").await.unwrap();
        assert_eq!(result.winner_id.as_deref(), Some("bob"));
        assert_eq!(result.votes_count, 2);
        assert!(service
            .store()
            .open_round_for_group(&group.id)
            .await
            .unwrap()
            .is_none());

        let err = service
            .submit_vote(&round.id, "alice", None, t0())
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_progress_hides_choices() {
        let (service, _group, round) = open_game(&["alice", "bob", "carol"]).await;
        service
            .submit_vote(&round.id, "alice", None, t0())
            .await
            .unwrap();

        let progress = service.vote_progress(&round.id).await.unwrap();
        assert_eq!(progress.voters, 1);
        assert_eq!(progress.members, 3);
    }
}
