use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use super::{AlertChannel, AlertEvent};

pub struct SlackChannel {
    webhook_url: Option<String>,
    client: Client,
}

impl SlackChannel {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
        }
    }

    fn render_text(event: &AlertEvent) -> String {
        let mut lines = vec![format!("*{}* [{}]", event.title(), event.provider)];
        if let Some(url) = &event.url {
            lines.push(format!("URL: {}", url));
        }
        if let Some(error) = &event.error {
            lines.push(format!("Error: {}", error));
        }
        if let Some(details) = &event.details {
            lines.push(details.clone());
        }
        lines.join("\n")
    }
}

#[async_trait]
impl AlertChannel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn notify(&self, event: &AlertEvent) -> bool {
        let Some(webhook_url) = &self.webhook_url else {
            return false;
        };

        let payload = json!({ "text": Self::render_text(event) });
        match self.client.post(webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Slack webhook rejected alert");
                false
            }
            Err(e) => {
                warn!(error = %e, "Slack webhook delivery failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_notify_renders_fields_into_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Extraction failure"))
            .and(body_string_contains("selector timeout"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = SlackChannel::new(Some(server.uri()));
        let event = AlertEvent::extraction_failure("lambda", "https://x.test", "selector timeout");
        assert!(channel.notify(&event).await);
    }

    #[tokio::test]
    async fn test_notify_without_webhook_is_noop() {
        let channel = SlackChannel::new(None);
        let event = AlertEvent::fallback_route_missing("runpod", "remote down");
        assert!(!channel.notify(&event).await);
    }
}
