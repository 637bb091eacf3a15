mod broadcast;
mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::types::*;

pub use broadcast::BroadcastNotifier;
pub use webhook::WebhookNotifier;

/// Result type for notification delivery
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors that can occur while delivering a round event
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid notifier configuration: {0}")]
    Config(String),
}

/// Round transition handed to notifiers after it has been persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoundEvent {
    RoundOpened {
        round_id: RoundId,
        group_id: GroupId,
        statement_id: StatementId,
    },
    RoundClosed {
        round_id: RoundId,
        group_id: GroupId,
        statement_id: StatementId,
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_id: Option<UserId>,
    },
}

impl RoundEvent {
    pub fn opened(round: &Round) -> Self {
        RoundEvent::RoundOpened {
            round_id: round.id.clone(),
            group_id: round.group_id.clone(),
            statement_id: round.statement_id.clone(),
        }
    }

    pub fn closed(round: &Round, winner_id: Option<UserId>) -> Self {
        RoundEvent::RoundClosed {
            round_id: round.id.clone(),
            group_id: round.group_id.clone(),
            statement_id: round.statement_id.clone(),
            winner_id,
        }
    }

    /// Wire name, matching the `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            RoundEvent::RoundOpened { .. } => "round_opened",
            RoundEvent::RoundClosed { .. } => "round_closed",
        }
    }

    pub fn group_id(&self) -> &str {
        match self {
            RoundEvent::RoundOpened { group_id, .. } | RoundEvent::RoundClosed { group_id, .. } => {
                group_id
            }
        }
    }

    pub fn round_id(&self) -> &str {
        match self {
            RoundEvent::RoundOpened { round_id, .. } | RoundEvent::RoundClosed { round_id, .. } => {
                round_id
            }
        }
    }
}

/// Trait that all notification sinks must implement
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event; the dispatcher logs failures and never retries
    async fn notify(&self, event: &RoundEvent) -> NotifyResult<()>;

    /// Get the name of this notifier
    fn name(&self) -> &str;
}

/// Writes every event to the tracing log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &RoundEvent) -> NotifyResult<()> {
        match event {
            RoundEvent::RoundOpened {
                round_id,
                group_id,
                statement_id,
            } => tracing::info!(%round_id, %group_id, %statement_id, "Round opened"),
            RoundEvent::RoundClosed {
                round_id,
                group_id,
                winner_id,
                ..
            } => tracing::info!(
                %round_id,
                %group_id,
                winner_id = winner_id.as_deref().unwrap_or("-"),
                "Round closed"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Fans events out to every configured notifier
#[derive(Clone, Default)]
pub struct Dispatcher {
    notifiers: Arc<Vec<Arc<dyn Notifier>>>,
}

impl Dispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            notifiers: Arc::new(notifiers),
        }
    }

    /// Hand the event to each notifier on its own task.
    ///
    /// Returns immediately with the number of notifiers the event was handed
    /// to; delivery outcomes are only logged.
    pub fn dispatch(&self, event: RoundEvent) -> usize {
        for notifier in self.notifiers.iter() {
            let notifier = notifier.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&event).await {
                    tracing::error!(
                        notifier = notifier.name(),
                        round_id = event.round_id(),
                        "Notification {} failed: {}",
                        event.name(),
                        e
                    );
                }
            });
        }
        self.notifiers.len()
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _event: &RoundEvent) -> NotifyResult<()> {
            Err(NotifyError::Delivery("mailbox full".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct ChannelNotifier(mpsc::UnboundedSender<RoundEvent>);

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn notify(&self, event: &RoundEvent) -> NotifyResult<()> {
            let _ = self.0.send(event.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "channel"
        }
    }

    fn closed_event() -> RoundEvent {
        RoundEvent::RoundClosed {
            round_id: "r1".to_string(),
            group_id: "g1".to_string(),
            statement_id: "s1".to_string(),
            winner_id: Some("alice".to_string()),
        }
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(closed_event()).unwrap();
        assert_eq!(json["event"], "round_closed");
        assert_eq!(json["winner_id"], "alice");

        let opened = RoundEvent::RoundOpened {
            round_id: "r2".to_string(),
            group_id: "g1".to_string(),
            statement_id: "s2".to_string(),
        };
        let json = serde_json::to_value(&opened).unwrap();
        assert_eq!(json["event"], "round_opened");
        assert!(json.get("winner_id").is_none());
        assert_eq!(opened.name(), "round_opened");
    }

    #[test]
    fn test_closed_without_winner_omits_field() {
        let event = RoundEvent::RoundClosed {
            round_id: "r1".to_string(),
            group_id: "g1".to_string(),
            statement_id: "s1".to_string(),
            winner_id: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("winner_id"));
    }

    #[tokio::test]
    async fn test_dispatch_survives_failing_notifier() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(vec![
            Arc::new(FailingNotifier),
            Arc::new(LogNotifier),
            Arc::new(ChannelNotifier(tx)),
        ]);

        assert_eq!(dispatcher.dispatch(closed_event()), 3);
        assert_eq!(rx.recv().await, Some(closed_event()));
    }

    #[tokio::test]
    async fn test_empty_dispatcher() {
        let dispatcher = Dispatcher::default();
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.dispatch(closed_event()), 0);
    }
}
