use super::*;

/// POSTs each event as JSON to an external dispatcher (mailer, chat bot, ...)
pub struct WebhookNotifier {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, timeout: Duration) -> NotifyResult<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config(format!(
                "webhook URL must be http(s), got {}",
                url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        Ok(Self {
            url,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &RoundEvent) -> NotifyResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout)
                } else {
                    NotifyError::Delivery(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "webhook returned status: {}",
                response.status()
            )));
        }

        tracing::debug!(
            round_id = event.round_id(),
            "Delivered {} to webhook",
            event.name()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use tokio::sync::mpsc;

    async fn receiver(
        State(tx): State<mpsc::UnboundedSender<serde_json::Value>>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        let _ = tx.send(body);
        StatusCode::NO_CONTENT
    }

    #[test]
    fn test_rejects_non_http_url() {
        let result = WebhookNotifier::new("ftp://example.com".to_string(), Duration::from_secs(1));
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }

    #[tokio::test]
    async fn test_posts_event_json() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = Router::new().route("/hook", post(receiver)).with_state(tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier =
            WebhookNotifier::new(format!("http://{}/hook", addr), Duration::from_secs(5)).unwrap();
        let event = RoundEvent::RoundClosed {
            round_id: "r1".to_string(),
            group_id: "g1".to_string(),
            statement_id: "s1".to_string(),
            winner_id: None,
        };
        notifier.notify(&event).await.unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(body["event"], "round_closed");
        assert_eq!(body["round_id"], "r1");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/hook",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier =
            WebhookNotifier::new(format!("http://{}/hook", addr), Duration::from_secs(5)).unwrap();
        let event = RoundEvent::RoundOpened {
            round_id: "r1".to_string(),
            group_id: "g1".to_string(),
            statement_id: "s1".to_string(),
        };
        assert!(matches!(
            notifier.notify(&event).await,
            Err(NotifyError::Delivery(_))
        ));
    }
}
