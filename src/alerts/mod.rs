//! Best-effort failure/summary alerting over webhook channels.
//!
//! Alerting never blocks or fails the ingestion job that triggered it:
//! a missing webhook degrades to a no-op returning `false`, and delivery
//! failures are logged and swallowed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::RunReport;

pub mod discord;
pub mod slack;

pub use discord::DiscordChannel;
pub use slack::SlackChannel;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ExtractionFailure,
    FallbackRouteMissing,
    RunSummary,
}

/// One alert event. All kinds carry the same underlying fields; each
/// channel renders them into its own message shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub provider: String,
    pub url: Option<String>,
    pub error: Option<String>,
    pub details: Option<String>,
}

impl AlertEvent {
    pub fn extraction_failure(
        provider: impl Into<String>,
        url: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            kind: AlertKind::ExtractionFailure,
            provider: provider.into(),
            url: Some(url.into()),
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn fallback_route_missing(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::FallbackRouteMissing,
            provider: provider.into(),
            url: None,
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn run_summary(report: &RunReport) -> Self {
        Self {
            kind: AlertKind::RunSummary,
            provider: report.provider_slug.clone(),
            url: None,
            error: None,
            details: Some(format!(
                "matched {}, unmatched {}, errors {}",
                report.matched_count(),
                report.unmatched_count(),
                report.errors.len()
            )),
        }
    }

    pub fn title(&self) -> &'static str {
        match self.kind {
            AlertKind::ExtractionFailure => "Extraction failure",
            AlertKind::FallbackRouteMissing => "Fallback route missing",
            AlertKind::RunSummary => "Ingestion run summary",
        }
    }
}

/// A single webhook channel. `notify` reports whether a delivery was
/// made; it never errors.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn notify(&self, event: &AlertEvent) -> bool;
}

/// Fan-out over all configured channels.
pub struct AlertFanout {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl AlertFanout {
    pub fn new(channels: Vec<Box<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    pub fn from_config(config: &crate::config::AlertingConfig) -> Self {
        Self::new(vec![
            Box::new(DiscordChannel::new(config.discord_webhook_url.clone())),
            Box::new(SlackChannel::new(config.slack_webhook_url.clone())),
        ])
    }

    /// Deliver to every channel; returns one flag per channel.
    pub async fn notify_all(&self, event: &AlertEvent) -> Vec<bool> {
        let mut delivered = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let sent = channel.notify(event).await;
            debug!(channel = channel.name(), sent, "alert dispatch");
            delivered.push(sent);
        }
        delivered
    }
}
