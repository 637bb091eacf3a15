use super::*;
use tokio::sync::broadcast;

/// Publishes events on an in-process channel feeding the SSE endpoint
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<RoundEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, event: &RoundEvent) -> NotifyResult<()> {
        // No subscribers connected is fine
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}
