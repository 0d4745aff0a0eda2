use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use super::{AlertChannel, AlertEvent, AlertKind};

pub struct DiscordChannel {
    webhook_url: Option<String>,
    client: Client,
}

impl DiscordChannel {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
        }
    }

    fn embed_color(kind: &AlertKind) -> u32 {
        match kind {
            AlertKind::ExtractionFailure => 0xff0000,  // Red
            AlertKind::FallbackRouteMissing => 0xff9900, // Orange
            AlertKind::RunSummary => 0x0099ff,         // Blue
        }
    }

    fn create_embed(event: &AlertEvent) -> serde_json::Value {
        let mut fields = vec![json!({
            "name": "Provider",
            "value": event.provider,
            "inline": true
        })];
        if let Some(url) = &event.url {
            fields.push(json!({"name": "URL", "value": url, "inline": true}));
        }
        if let Some(error) = &event.error {
            fields.push(json!({"name": "Error", "value": error, "inline": false}));
        }
        if let Some(details) = &event.details {
            fields.push(json!({"name": "Details", "value": details, "inline": false}));
        }

        json!({
            "title": event.title(),
            "color": Self::embed_color(&event.kind),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "fields": fields,
            "footer": { "text": "Gridwatch" }
        })
    }
}

#[async_trait]
impl AlertChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn notify(&self, event: &AlertEvent) -> bool {
        // No webhook configured: degrade to a no-op, no network call.
        let Some(webhook_url) = &self.webhook_url else {
            return false;
        };

        let payload = json!({ "embeds": [Self::create_embed(event)] });
        match self.client.post(webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Discord webhook rejected alert");
                false
            }
            Err(e) => {
                warn!(error = %e, "Discord webhook delivery failed");
                false
            }
        }
    }
}
