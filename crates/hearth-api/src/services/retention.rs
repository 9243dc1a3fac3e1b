//! Periodic purge of old notifications.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RETENTION_ENABLED`: Set to "true" to run the purge loop (default: false)
//! - `RETENTION_DAYS`: Age in days after which notifications are deleted (default: 90)
//! - `RETENTION_INTERVAL_SECS`: Seconds between purge runs (default: 3600)

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use hearth_core::defaults::{RETENTION_DAYS, RETENTION_INTERVAL_SECS};
use hearth_core::{Error, NotificationRepository, Result};

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub days: i64,
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            days: RETENTION_DAYS,
            interval: Duration::from_secs(RETENTION_INTERVAL_SECS),
        }
    }
}

impl RetentionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = std::env::var("RETENTION_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.enabled);
        let days = std::env::var("RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|d| *d > 0 && retention_threshold(*d).is_some())
            .unwrap_or(defaults.days);
        let interval = std::env::var("RETENTION_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.interval);
        Self {
            enabled,
            days,
            interval,
        }
    }
}

/// Cut-off instant `days` ago, or `None` when it is not representable.
fn retention_threshold(days: i64) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(chrono::Duration::try_days(days)?)
}

/// Delete notifications older than `days`. Returns the number removed.
pub async fn purge_once(notifications: &dyn NotificationRepository, days: i64) -> Result<u64> {
    let threshold = retention_threshold(days)
        .ok_or_else(|| Error::Config(format!("retention of {days} days is out of range")))?;
    let removed = notifications.purge_older_than(threshold).await?;
    info!(
        subsystem = "retention",
        op = "purge",
        days,
        removed,
        threshold = %threshold,
        "Old notifications purged"
    );
    Ok(removed)
}

/// Run [`purge_once`] every `config.interval`. Returns `None` when disabled.
pub fn spawn_retention(
    notifications: Arc<dyn NotificationRepository>,
    config: RetentionConfig,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!("Notification retention disabled");
        return None;
    }
    info!(
        days = config.days,
        interval_secs = config.interval.as_secs(),
        "Notification retention enabled"
    );
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        loop {
            ticker.tick().await;
            if let Err(e) = purge_once(notifications.as_ref(), config.days).await {
                error!(subsystem = "retention", op = "purge", error = %e, "Retention purge failed");
            }
        }
    }))
}
