use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

/// A message shown on every dashboard until it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Broadcast {
    pub message: String,
    /// `None` when the TTL is too large to represent.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Broadcast {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Holds the current broadcast message. Expiry is checked on read; nothing
/// else touches it.
#[derive(Debug, Default)]
pub struct AdminMessages {
    current: RwLock<Option<Broadcast>>,
}

impl AdminMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, message: impl Into<String>, ttl: Duration) {
        self.set_at(message, ttl, Utc::now()).await
    }

    pub async fn get(&self) -> Option<Broadcast> {
        self.get_at(Utc::now()).await
    }

    pub async fn clear(&self) {
        *self.current.write().await = None;
        info!("Broadcast message cleared");
    }

    /// A blank message or a zero TTL clears the broadcast.
    pub async fn set_at(&self, message: impl Into<String>, ttl: Duration, now: DateTime<Utc>) {
        let message = message.into();
        if message.trim().is_empty() || ttl.is_zero() {
            self.clear().await;
            return;
        }

        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta));
        info!(ttl_secs = ttl.as_secs(), "Broadcast message set");
        *self.current.write().await = Some(Broadcast { message, expires_at });
    }

    pub async fn get_at(&self, now: DateTime<Utc>) -> Option<Broadcast> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|broadcast| broadcast.is_live(now))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn message_is_visible_until_it_expires() {
        let messages = AdminMessages::new();
        messages.set_at("Maintenance at 18:00", Duration::from_secs(600), noon()).await;

        let live = messages.get_at(noon() + TimeDelta::seconds(599)).await.unwrap();
        assert_eq!(live.message, "Maintenance at 18:00");
        assert_eq!(live.expires_at, Some(noon() + TimeDelta::seconds(600)));

        assert!(messages.get_at(noon() + TimeDelta::seconds(600)).await.is_none());
        assert!(messages.get_at(noon() + TimeDelta::hours(2)).await.is_none());
    }

    #[tokio::test]
    async fn newer_message_replaces_older_one() {
        let messages = AdminMessages::new();
        messages.set_at("first", Duration::from_secs(60), noon()).await;
        messages.set_at("second", Duration::from_secs(60), noon()).await;

        assert_eq!(messages.get_at(noon()).await.unwrap().message, "second");
    }

    #[tokio::test]
    async fn zero_ttl_or_blank_message_clears() {
        let messages = AdminMessages::new();
        messages.set_at("hello", Duration::from_secs(60), noon()).await;
        messages.set_at("ignored", Duration::ZERO, noon()).await;
        assert!(messages.get_at(noon()).await.is_none());

        messages.set_at("hello", Duration::from_secs(60), noon()).await;
        messages.set_at("   ", Duration::from_secs(60), noon()).await;
        assert!(messages.get_at(noon()).await.is_none());
    }

    #[tokio::test]
    async fn clear_removes_message() {
        let messages = AdminMessages::new();
        messages.set("hello", Duration::from_secs(60)).await;
        assert!(messages.get().await.is_some());

        messages.clear().await;
        assert!(messages.get().await.is_none());
    }

    #[tokio::test]
    async fn huge_ttl_never_expires() {
        let messages = AdminMessages::new();
        messages.set_at("forever", Duration::MAX, noon()).await;

        let broadcast = messages.get_at(noon() + TimeDelta::days(36500)).await.unwrap();
        assert_eq!(broadcast.expires_at, None);
    }
}
