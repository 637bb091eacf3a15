use super::GameService;
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::{DateTime, Utc};

impl GameService {
    /// Append a comment to a round's discussion; open and closed rounds both accept comments
    pub async fn add_comment(
        &self,
        round_id: &str,
        author_id: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> GameResult<Comment> {
        self.member_round(round_id, author_id).await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::Validation("comment must not be empty".to_string()));
        }
        let max = self.config.max_comment_chars;
        if text.chars().count() > max {
            return Err(GameError::Validation(format!(
                "comment must be at most {} characters",
                max
            )));
        }

        let comment = Comment {
            id: new_id(),
            round_id: round_id.to_string(),
            author_id: author_id.to_string(),
            text: text.to_string(),
            created_at: now,
        };
        self.store.insert_comment(comment.clone()).await?;
        Ok(comment)
    }

    /// Oldest first
    pub async fn list_comments(&self, round_id: &str, user_id: &str) -> GameResult<Vec<Comment>> {
        self.member_round(round_id, user_id).await?;
        Ok(self.store.list_comments(round_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_comments_in_order() {
        let service = service();
        let edition = seed_edition(&service, "classic", 2).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;
        let round = service.open_round(&group.id, t0()).await.unwrap();

        service
            .add_comment(&round.id, "bob", "called it", t0() + Duration::minutes(5))
            .await
            .unwrap();
        service
            .add_comment(&round.id, "alice", " no way ", t0() + Duration::minutes(1))
            .await
            .unwrap();

        let comments = service.list_comments(&round.id, "bob").await.unwrap();
        let texts: Vec<_> = comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["no way", "called it"]);
    }

    #[tokio::test]
    async fn test_comment_validation() {
        let service = service();
        let edition = seed_edition(&service, "classic", 2).await;
        let group = seed_group(&service, &edition.id, &["alice"]).await;
        let round = service.open_round(&group.id, t0()).await.unwrap();

        let err = service
            .add_comment(&round.id, "alice", "   ", t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));

        let long = "x".repeat(1001);
        let err = service
            .add_comment(&round.id, "alice", &long, t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));

        let err = service
            .add_comment(&round.id, "mallory", "hi", t0())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::Forbidden(_)));
    }
}
