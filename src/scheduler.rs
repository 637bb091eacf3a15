//! Periodic batch job closing due rounds and opening new ones.
//!
//! A tick keeps no state of its own; overlapping ticks are safe because every
//! transition is guarded by the store's constraints.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::GameError;
use crate::state::GameService;

/// Counts of what one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub rounds_closed: usize,
    pub rounds_created: usize,
    pub notifications_sent: usize,
    pub failures: usize,
}

impl GameService {
    /// Run one scheduler pass. Never fails: every per-round and per-group
    /// error is logged and counted, then the pass moves on.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        match self.store().list_open_rounds().await {
            Ok(rounds) => {
                for round in rounds {
                    match self.close_if_due(&round, now).await {
                        Ok(Some(closing)) if closing.newly_closed => {
                            report.rounds_closed += 1;
                            report.notifications_sent += closing.notified;
                        }
                        Ok(Some(_)) => {
                            tracing::debug!(round_id = %round.id, "Round already closed elsewhere");
                        }
                        Ok(None) => {}
                        Err(e) => {
                            report.failures += 1;
                            tracing::warn!(
                                round_id = %round.id,
                                group_id = %round.group_id,
                                "Failed to close round: {}",
                                e
                            );
                        }
                    }
                }
            }
            Err(e) => {
                report.failures += 1;
                tracing::error!("Failed to load open rounds: {}", e);
            }
        }

        match self.store().list_groups().await {
            Ok(groups) => {
                for group in groups {
                    match self.open_round_if_due(&group.id, now).await {
                        Ok(Some((_, notified))) => {
                            report.rounds_created += 1;
                            report.notifications_sent += notified;
                        }
                        Ok(None) => {}
                        Err(GameError::Conflict(msg)) => {
                            tracing::debug!(group_id = %group.id, "Round opened concurrently: {}", msg);
                        }
                        Err(e) => {
                            report.failures += 1;
                            tracing::warn!(group_id = %group.id, "Failed to open round: {}", e);
                        }
                    }
                }
            }
            Err(e) => {
                report.failures += 1;
                tracing::error!("Failed to load groups: {}", e);
            }
        }

        tracing::info!(
            closed = report.rounds_closed,
            created = report.rounds_created,
            notifications = report.notifications_sent,
            failures = report.failures,
            "Scheduler tick finished"
        );
        report
    }
}

/// Spawn a background task running [`GameService::run_tick`] every `interval`
pub fn spawn_scheduler(service: GameService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            service.run_tick(Utc::now()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_tick_opens_rounds_for_new_groups() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        seed_group(&service, &edition.id, &["alice", "bob"]).await;
        seed_group(&service, &edition.id, &["carol"]).await;

        let report = service.run_tick(t0()).await;
        assert_eq!(report.rounds_created, 2);
        assert_eq!(report.rounds_closed, 0);
        assert_eq!(report.failures, 0);

        let again = service.run_tick(t0()).await;
        assert_eq!(again, TickReport::default());
    }

    #[tokio::test]
    async fn test_tick_closes_expired_and_waits_for_cooldown() {
        let service = service();
        let edition = seed_edition(&service, "classic", 3).await;
        let group = seed_group(&service, &edition.id, &["alice", "bob"]).await;
        service.run_tick(t0()).await;

        let expired = t0() + ChronoDuration::hours(24);
        let report = service.run_tick(expired).await;
        assert_eq!(report.rounds_closed, 1);
        assert_eq!(report.rounds_created, 0);

        let report = service
            .run_tick(expired + ChronoDuration::hours(48))
            .await;
        assert_eq!(report.rounds_created, 1);
        assert_eq!(service.store().list_rounds(&group.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_group_without_content_counts_as_failure() {
        let service = service();
        let empty = seed_edition(&service, "empty", 0).await;
        let full = seed_edition(&service, "full", 2).await;
        seed_group(&service, &empty.id, &["alice"]).await;
        seed_group(&service, &full.id, &["bob"]).await;

        let report = service.run_tick(t0()).await;
        assert_eq!(report.failures, 1);
        assert_eq!(report.rounds_created, 1);
    }

    #[tokio::test]
    async fn test_spawned_scheduler_ticks() {
        let service = service();
        let edition = seed_edition(&service, "classic", 1).await;
        let group = seed_group(&service, &edition.id, &["alice"]).await;

        let handle = spawn_scheduler(service.clone(), Duration::from_millis(10));
        let mut opened = false;
        for _ in 0..100 {
            if service
                .store()
                .open_round_for_group(&group.id)
                .await
                .unwrap()
                .is_some()
            {
                opened = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(opened);
    }
}
