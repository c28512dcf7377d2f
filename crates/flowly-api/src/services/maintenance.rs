// Background maintenance: event retention and onboarding session expiry
// Decision: A single periodic task; a failed sweep is logged and retried next tick

use chrono::Utc;
use flowly_core::{EventStore, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::onboarding::OnboardingService;

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub events_purged: u64,
    pub sessions_expired: u64,
}

pub struct MaintenanceService {
    events: Arc<dyn EventStore>,
    onboarding: Arc<OnboardingService>,
    event_retention: chrono::Duration,
}

impl MaintenanceService {
    pub fn new(
        events: Arc<dyn EventStore>,
        onboarding: Arc<OnboardingService>,
        event_retention: chrono::Duration,
    ) -> Self {
        Self {
            events,
            onboarding,
            event_retention,
        }
    }

    /// Purge events past retention and expire stale onboarding sessions
    pub async fn sweep(&self) -> Result<SweepReport> {
        let older_than = Utc::now() - self.event_retention;
        let events_purged = self.events.purge_expired_events(older_than).await?;
        let sessions_expired = self.onboarding.expire_sessions().await?;

        if events_purged > 0 || sessions_expired > 0 {
            tracing::info!(events_purged, sessions_expired, "Maintenance sweep");
        }

        Ok(SweepReport {
            events_purged,
            sessions_expired,
        })
    }

    /// Run `sweep` every `interval` until the task is aborted
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    tracing::error!("Failed to run maintenance sweep: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::EventBus;
    use flowly_core::Event;
    use flowly_storage::StorageBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_sweep_purges_and_records_watermark() {
        let store = Arc::new(StorageBackend::in_memory());
        let bus = Arc::new(EventBus::new(store.clone()));
        let onboarding = Arc::new(OnboardingService::new(
            store.clone(),
            bus.clone(),
            chrono::Duration::days(7),
        ));

        for _ in 0..3 {
            bus.publish(Event::raw("chat", "chat.note", json!({})))
                .await
                .unwrap();
        }

        // Zero retention: everything stored so far is past the horizon
        let maintenance =
            MaintenanceService::new(store.clone(), onboarding, chrono::Duration::seconds(-1));
        let report = maintenance.sweep().await.unwrap();

        assert_eq!(report.events_purged, 3);
        assert!(bus.events_since(0).await.unwrap().is_empty());
        assert_eq!(bus.purged_through_seq().await.unwrap(), 3);
        assert_eq!(bus.current_seq().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_sweep_keeps_recent_events() {
        let store = Arc::new(StorageBackend::in_memory());
        let bus = Arc::new(EventBus::new(store.clone()));
        let onboarding = Arc::new(OnboardingService::new(
            store.clone(),
            bus.clone(),
            chrono::Duration::days(7),
        ));
        onboarding.start("u1").await.unwrap();

        let maintenance = MaintenanceService::new(store, onboarding, chrono::Duration::hours(24));
        assert_eq!(maintenance.sweep().await.unwrap(), SweepReport::default());
        assert_eq!(bus.events_since(0).await.unwrap().len(), 1);
    }
}
