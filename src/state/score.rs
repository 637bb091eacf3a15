use super::GameService;
use crate::error::GameResult;
use crate::types::*;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub points: u32,
}

/// Order by points descending, ties by user id ascending
pub fn rank(mut rows: Vec<Points>) -> Vec<LeaderboardEntry> {
    rows.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.user_id.cmp(&b.user_id)));
    rows.into_iter()
        .map(|row| LeaderboardEntry {
            user_id: row.user_id,
            points: row.points,
        })
        .collect()
}

impl GameService {
    /// Add `delta` points to a member's running total; points are never revoked
    pub async fn award(&self, group_id: &str, user_id: &str, delta: u32) -> GameResult<u32> {
        let total = self.store.add_points(group_id, user_id, delta).await?;
        tracing::debug!(group_id, user_id, total, "Awarded {} point(s)", delta);
        Ok(total)
    }

    pub async fn leaderboard(&self, group_id: &str) -> GameResult<Vec<LeaderboardEntry>> {
        self.load_group(group_id).await?;
        let rows = self.store.list_points(group_id).await?;
        Ok(rank(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[tokio::test]
    async fn test_award_accumulates() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;

        assert_eq!(service.award(&group.id, "bob", 1).await.unwrap(), 1);
        assert_eq!(service.award(&group.id, "bob", 1).await.unwrap(), 2);

        let board = service.leaderboard(&group.id).await.unwrap();
        assert_eq!(
            board,
            vec![LeaderboardEntry {
                user_id: "bob".to_string(),
                points: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_leaderboard_of_unknown_group() {
        let service = service();
        assert!(service.leaderboard("nope").await.is_err());
    }

    #[test]
    fn test_rank_breaks_ties_by_user_id() {
        let row = |user: &str, points| Points {
            group_id: "g1".to_string(),
            user_id: user.to_string(),
            points,
        };
        let board = rank(vec![row("carol", 1), row("alice", 3), row("bob", 1)]);

        let order: Vec<_> = board.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob", "carol"]);
    }
}
