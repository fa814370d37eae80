//! Outbound alerting for the five events the worker reports on, grounded on
//! the severity/alert-type split used by this codebase's notification layer,
//! re-scoped to a single HTTP webhook sink instead of an in-memory feed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BotEvent {
    BotStarted,
    BotStopped,
    BotError {
        message: String,
    },
    PositionOpened {
        symbol: String,
        side: String,
        quantity: String,
        entry_price: String,
    },
    PositionClosed {
        symbol: String,
        pnl: String,
        pnl_pct: String,
        reason: String,
    },
}

impl BotEvent {
    pub fn severity(&self) -> Severity {
        match self {
            Self::BotError { .. } => Severity::Critical,
            Self::PositionClosed { .. } => Severity::Info,
            _ => Severity::Info,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::BotStarted => "BOT_STARTED",
            Self::BotStopped => "BOT_STOPPED",
            Self::BotError { .. } => "BOT_ERROR",
            Self::PositionOpened { .. } => "POSITION_OPENED",
            Self::PositionClosed { .. } => "POSITION_CLOSED",
        }
    }
}

pub fn position_opened(symbol: &str, side: &str, quantity: Decimal, entry_price: Decimal) -> BotEvent {
    BotEvent::PositionOpened {
        symbol: symbol.to_string(),
        side: side.to_string(),
        quantity: quantity.to_string(),
        entry_price: entry_price.to_string(),
    }
}

pub fn position_closed(symbol: &str, pnl: Decimal, pnl_pct: Decimal, reason: &str) -> BotEvent {
    BotEvent::PositionClosed {
        symbol: symbol.to_string(),
        pnl: pnl.to_string(),
        pnl_pct: pnl_pct.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
struct NotificationPayload<'a> {
    bot_id: &'a str,
    event: &'a str,
    severity: Severity,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    body: &'a BotEvent,
}

/// Delivery is best-effort: a failed send is logged and swallowed, never
/// propagated, so a flaky alerting endpoint can't stall the control loop.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, bot_id: &str, event: BotEvent);
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self { client, webhook_url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, bot_id: &str, event: BotEvent) {
        let severity = event.severity();
        let title = event.title();

        match severity {
            Severity::Critical => error!(bot_id, title, "{:?}", event),
            Severity::Warning => warn!(bot_id, title, "{:?}", event),
            Severity::Info => info!(bot_id, title, "{:?}", event),
        }

        let payload = NotificationPayload {
            bot_id,
            event: title,
            severity,
            timestamp: Utc::now(),
            body: &event,
        };

        if let Err(e) = self.client.post(&self.webhook_url).json(&payload).send().await {
            warn!("notification delivery failed for {bot_id}/{title}: {e}");
        }
    }
}

/// Test double that records delivered events instead of sending HTTP requests.
#[cfg(test)]
pub struct RecordingNotifier {
    pub sent: tokio::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, bot_id: &str, event: BotEvent) {
        self.sent.lock().await.push((bot_id.to_string(), event.title().to_string()));
    }
}
