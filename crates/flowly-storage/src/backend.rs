// Storage backend abstraction
// Decision: Use enum dispatch for simplicity over trait objects
//
// StorageBackend wraps either PostgreSQL (production) or in-memory (dev mode)
// storage and implements the core store traits on top of both. Row types stop
// here; callers only see domain types and FlowlyError.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowly_core::{
    Budget, BudgetStore, Event, EventStore, FlowlyError, OnboardingSession, OnboardingStore,
    PayCycle, Result, UpdateOnboardingSession,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::memory::InMemoryDatabase;
use crate::models::*;
use crate::repositories::Database;

/// Storage backend that can be either PostgreSQL or in-memory
#[derive(Clone)]
pub enum StorageBackend {
    /// PostgreSQL database (production)
    Postgres(Database),
    /// In-memory database (dev mode)
    InMemory(Arc<InMemoryDatabase>),
}

impl StorageBackend {
    /// Create a PostgreSQL storage backend from a database URL
    pub async fn postgres(database_url: &str) -> anyhow::Result<Self> {
        let db = Database::from_url(database_url).await?;
        Ok(Self::Postgres(db))
    }

    /// Create an in-memory storage backend
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryDatabase::new()))
    }

    /// Check if this is dev mode (in-memory)
    pub fn is_dev_mode(&self) -> bool {
        matches!(self, Self::InMemory(_))
    }
}

/// Recover a typed error raised by a repository, else wrap as a storage error
fn into_flowly_error(err: anyhow::Error) -> FlowlyError {
    match err.downcast::<FlowlyError>() {
        Ok(typed) => typed,
        Err(err) => FlowlyError::Storage(err),
    }
}

// ============================================
// Events
// ============================================

#[async_trait]
impl EventStore for StorageBackend {
    async fn next_seq(&self) -> Result<i64> {
        let result = match self {
            Self::Postgres(db) => db.next_seq().await,
            Self::InMemory(db) => db.next_seq().await,
        };
        result.map_err(into_flowly_error)
    }

    async fn current_seq(&self) -> Result<i64> {
        let result = match self {
            Self::Postgres(db) => db.current_seq().await,
            Self::InMemory(db) => db.current_seq().await,
        };
        result.map_err(into_flowly_error)
    }

    async fn insert_event(&self, seq: i64, event: &Event) -> Result<()> {
        let row = EventRow::new(seq, event, Utc::now());
        let result = match self {
            Self::Postgres(db) => db.insert_event(row).await,
            Self::InMemory(db) => db.insert_event(row).await,
        };
        result.map_err(into_flowly_error)
    }

    async fn events_since(&self, last_seq: i64) -> Result<Vec<Event>> {
        let rows = match self {
            Self::Postgres(db) => db.events_since(last_seq).await,
            Self::InMemory(db) => db.events_since(last_seq).await,
        }
        .map_err(into_flowly_error)?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn purge_expired_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let result = match self {
            Self::Postgres(db) => db.purge_expired_events(older_than).await,
            Self::InMemory(db) => db.purge_expired_events(older_than).await,
        };
        result.map_err(into_flowly_error)
    }

    async fn purged_through_seq(&self) -> Result<i64> {
        let result = match self {
            Self::Postgres(db) => db.purged_through_seq().await,
            Self::InMemory(db) => db.purged_through_seq().await,
        };
        result.map_err(into_flowly_error)
    }
}

// ============================================
// Onboarding sessions
// ============================================

fn session_from_row(row: Option<OnboardingSessionRow>) -> Result<Option<OnboardingSession>> {
    row.map(OnboardingSession::try_from)
        .transpose()
        .map_err(into_flowly_error)
}

#[async_trait]
impl OnboardingStore for StorageBackend {
    async fn find_active_session_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<OnboardingSession>> {
        let row = match self {
            Self::Postgres(db) => db.find_active_session_by_user_id(user_id).await,
            Self::InMemory(db) => db.find_active_session_by_user_id(user_id).await,
        }
        .map_err(into_flowly_error)?;

        session_from_row(row)
    }

    async fn find_session_by_id(&self, id: Uuid) -> Result<Option<OnboardingSession>> {
        let row = match self {
            Self::Postgres(db) => db.find_session_by_id(id).await,
            Self::InMemory(db) => db.find_session_by_id(id).await,
        }
        .map_err(into_flowly_error)?;

        session_from_row(row)
    }

    async fn insert_session(&self, session: &OnboardingSession) -> Result<()> {
        let row = OnboardingSessionRow::from_session(session).map_err(into_flowly_error)?;
        let result = match self {
            Self::Postgres(db) => db.insert_session(row).await,
            Self::InMemory(db) => db.insert_session(row).await,
        };
        result.map_err(into_flowly_error)
    }

    async fn update_session(
        &self,
        id: Uuid,
        user_id: &str,
        update: UpdateOnboardingSession,
    ) -> Result<Option<OnboardingSession>> {
        let now = Utc::now();
        let row = match self {
            Self::Postgres(db) => db.update_session(id, user_id, &update, now).await,
            Self::InMemory(db) => db.update_session(id, user_id, &update, now).await,
        }
        .map_err(into_flowly_error)?;

        session_from_row(row)
    }

    async fn complete_session(
        &self,
        id: Uuid,
        user_id: &str,
        budget: &Budget,
        pay_cycle: &PayCycle,
        update: UpdateOnboardingSession,
    ) -> Result<Option<OnboardingSession>> {
        let now = Utc::now();
        let budget = BudgetRow::from(budget);
        let pay_cycle = PayCycleRow::from(pay_cycle);
        let row = match self {
            Self::Postgres(db) => {
                db.complete_session(id, user_id, budget, pay_cycle, &update, now)
                    .await
            }
            Self::InMemory(db) => {
                db.complete_session(id, user_id, budget, pay_cycle, &update, now)
                    .await
            }
        }
        .map_err(into_flowly_error)?;

        session_from_row(row)
    }

    async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = match self {
            Self::Postgres(db) => db.expire_sessions(now).await,
            Self::InMemory(db) => db.expire_sessions(now).await,
        };
        result.map_err(into_flowly_error)
    }
}

// ============================================
// Budgets
// ============================================

#[async_trait]
impl BudgetStore for StorageBackend {
    async fn find_budget_by_id(&self, id: Uuid) -> Result<Option<Budget>> {
        let row = match self {
            Self::Postgres(db) => db.find_budget_by_id(id).await,
            Self::InMemory(db) => db.find_budget_by_id(id).await,
        }
        .map_err(into_flowly_error)?;

        Ok(row.map(Budget::from))
    }

    async fn list_budgets_by_user_id(&self, user_id: &str) -> Result<Vec<Budget>> {
        let rows = match self {
            Self::Postgres(db) => db.list_budgets_by_user_id(user_id).await,
            Self::InMemory(db) => db.list_budgets_by_user_id(user_id).await,
        }
        .map_err(into_flowly_error)?;

        Ok(rows.into_iter().map(Budget::from).collect())
    }

    async fn find_pay_cycle_by_budget_id(&self, budget_id: Uuid) -> Result<Option<PayCycle>> {
        let row = match self {
            Self::Postgres(db) => db.find_pay_cycle_by_budget_id(budget_id).await,
            Self::InMemory(db) => db.find_pay_cycle_by_budget_id(budget_id).await,
        }
        .map_err(into_flowly_error)?;

        row.map(PayCycle::try_from)
            .transpose()
            .map_err(into_flowly_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flowly_core::{OnboardingDraft, OnboardingStatus, OnboardingStep, PayCycleCadence};
    use serde_json::json;

    fn budget_pair(user_id: &str) -> (Budget, PayCycle) {
        let now = Utc::now();
        let budget = Budget {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            name: "Groceries".to_string(),
            created_at: now,
        };
        let pay_cycle = PayCycle {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            budget_id: budget.id,
            cadence: PayCycleCadence::Monthly,
            day: 15,
            timezone: "UTC".to_string(),
            created_at: now,
        };
        (budget, pay_cycle)
    }

    fn completing_update() -> UpdateOnboardingSession {
        UpdateOnboardingSession {
            status: Some(OnboardingStatus::Completed),
            current_step: Some(OnboardingStep::Pools),
            draft: Some(OnboardingDraft::filled(
                "Groceries",
                PayCycleCadence::Monthly,
                15,
                "UTC",
            )),
            expected_status: Some(OnboardingStatus::Active),
        }
    }

    #[tokio::test]
    async fn test_duplicate_event_surfaces_typed_error() {
        let store = StorageBackend::in_memory();
        let event = Event::raw("chat", "chat.note", json!({}));

        let seq = store.next_seq().await.unwrap();
        store.insert_event(seq, &event).await.unwrap();

        let seq = store.next_seq().await.unwrap();
        let err = store.insert_event(seq, &event).await.unwrap_err();
        assert!(matches!(err, FlowlyError::DuplicateEvent(_)));
    }

    #[tokio::test]
    async fn test_replayed_events_carry_seq() {
        let store = StorageBackend::in_memory();
        for _ in 0..3 {
            let seq = store.next_seq().await.unwrap();
            store
                .insert_event(seq, &Event::raw("chat", "chat.note", json!({})))
                .await
                .unwrap();
        }

        let seqs: Vec<Option<i64>> = store
            .events_since(0)
            .await
            .unwrap()
            .iter()
            .map(|event| event.seq)
            .collect();
        assert_eq!(seqs, vec![Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_complete_session_writes_budget_pair() {
        let store = StorageBackend::in_memory();
        let session = OnboardingSession::start("u1", Utc::now(), Duration::days(7));
        store.insert_session(&session).await.unwrap();

        let (budget, pay_cycle) = budget_pair("u1");
        let completed = store
            .complete_session(session.id, "u1", &budget, &pay_cycle, completing_update())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(completed.status, OnboardingStatus::Completed);
        assert_eq!(completed.current_step, OnboardingStep::Pools);
        assert_eq!(store.list_budgets_by_user_id("u1").await.unwrap(), vec![budget.clone()]);
        assert_eq!(
            store.find_pay_cycle_by_budget_id(budget.id).await.unwrap(),
            Some(pay_cycle)
        );
    }

    #[tokio::test]
    async fn test_complete_session_no_match_writes_nothing() {
        let store = StorageBackend::in_memory();
        let session = OnboardingSession::start("u1", Utc::now(), Duration::days(7));
        store.insert_session(&session).await.unwrap();

        let (budget, pay_cycle) = budget_pair("u2");
        let result = store
            .complete_session(session.id, "u2", &budget, &pay_cycle, completing_update())
            .await
            .unwrap();

        assert!(result.is_none());
        assert!(store.find_budget_by_id(budget.id).await.unwrap().is_none());
        assert!(store
            .find_active_session_by_user_id("u1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_insert_conflict_is_typed() {
        let store = StorageBackend::in_memory();
        let first = OnboardingSession::start("u1", Utc::now(), Duration::days(7));
        let second = OnboardingSession::start("u1", Utc::now(), Duration::days(7));

        store.insert_session(&first).await.unwrap();
        let err = store.insert_session(&second).await.unwrap_err();
        assert!(matches!(err, FlowlyError::Conflict(_)));
    }
}
