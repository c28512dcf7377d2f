// In-memory storage implementation for dev mode and tests
// Decision: Use parking_lot for thread-safe access
// Decision: Each operation takes its lock once, so the counter increment and the
// one-active-session check are atomic the same way the SQL statements are
//
// Mirrors the PostgreSQL repository API so the backend enum can dispatch to
// either without the callers noticing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use flowly_core::{FlowlyError, OnboardingSession, UpdateOnboardingSession};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use crate::models::*;

#[derive(Default)]
struct EventLog {
    by_seq: BTreeMap<i64, EventRow>,
    ids: HashSet<String>,
}

/// In-memory database for dev mode
/// All data is stored in memory and lost on restart
#[derive(Default)]
pub struct InMemoryDatabase {
    counters: Mutex<HashMap<String, i64>>,
    events: RwLock<EventLog>,
    onboarding_sessions: RwLock<HashMap<Uuid, OnboardingSessionRow>>,
    budgets: RwLock<HashMap<Uuid, BudgetRow>>,
    pay_cycles: RwLock<HashMap<Uuid, PayCycleRow>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    // ============================================
    // Sequence counters
    // ============================================

    pub async fn next_seq(&self) -> Result<i64> {
        let mut counters = self.counters.lock();
        let seq = counters.entry(EVENTS_COUNTER.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    pub async fn current_seq(&self) -> Result<i64> {
        Ok(self.counter_value(EVENTS_COUNTER))
    }

    pub async fn purged_through_seq(&self) -> Result<i64> {
        Ok(self.counter_value(EVENTS_PURGED_COUNTER))
    }

    fn counter_value(&self, name: &str) -> i64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    // ============================================
    // Events
    // ============================================

    pub async fn insert_event(&self, row: EventRow) -> Result<()> {
        let mut events = self.events.write();
        if events.ids.contains(&row.id) {
            return Err(FlowlyError::duplicate_event(&row.id).into());
        }
        if events.by_seq.contains_key(&row.seq) {
            return Err(FlowlyError::conflict(format!("event seq {} already stored", row.seq)).into());
        }
        events.ids.insert(row.id.clone());
        events.by_seq.insert(row.seq, row);
        Ok(())
    }

    pub async fn events_since(&self, last_seq: i64) -> Result<Vec<EventRow>> {
        let events = self.events.read();
        Ok(events
            .by_seq
            .range(last_seq.saturating_add(1)..)
            .map(|(_, row)| row.clone())
            .collect())
    }

    pub async fn purge_expired_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.write();
        let expired: Vec<(i64, String)> = events
            .by_seq
            .values()
            .filter(|row| row.stored_at < older_than)
            .map(|row| (row.seq, row.id.clone()))
            .collect();

        for (seq, id) in &expired {
            events.by_seq.remove(seq);
            events.ids.remove(id);
        }

        if let Some(max_seq) = expired.iter().map(|(seq, _)| *seq).max() {
            let mut counters = self.counters.lock();
            let watermark = counters.entry(EVENTS_PURGED_COUNTER.to_string()).or_insert(0);
            *watermark = (*watermark).max(max_seq);
        }

        Ok(expired.len() as u64)
    }

    // ============================================
    // Onboarding sessions
    // ============================================

    pub async fn find_active_session_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<OnboardingSessionRow>> {
        Ok(self
            .onboarding_sessions
            .read()
            .values()
            .find(|row| row.user_id == user_id && row.is_active())
            .cloned())
    }

    pub async fn find_session_by_id(&self, id: Uuid) -> Result<Option<OnboardingSessionRow>> {
        Ok(self.onboarding_sessions.read().get(&id).cloned())
    }

    pub async fn insert_session(&self, row: OnboardingSessionRow) -> Result<()> {
        let mut sessions = self.onboarding_sessions.write();
        if row.is_active()
            && sessions
                .values()
                .any(|existing| existing.user_id == row.user_id && existing.is_active())
        {
            return Err(FlowlyError::conflict(format!(
                "user {} already has an active onboarding session",
                row.user_id
            ))
            .into());
        }
        sessions.insert(row.id, row);
        Ok(())
    }

    pub async fn update_session(
        &self,
        id: Uuid,
        user_id: &str,
        update: &UpdateOnboardingSession,
        now: DateTime<Utc>,
    ) -> Result<Option<OnboardingSessionRow>> {
        let mut sessions = self.onboarding_sessions.write();
        Self::apply_update(&mut sessions, id, user_id, update, now)
    }

    pub async fn complete_session(
        &self,
        id: Uuid,
        user_id: &str,
        budget: BudgetRow,
        pay_cycle: PayCycleRow,
        update: &UpdateOnboardingSession,
        now: DateTime<Utc>,
    ) -> Result<Option<OnboardingSessionRow>> {
        // Lock order: sessions, budgets, pay cycles
        let mut sessions = self.onboarding_sessions.write();
        let mut budgets = self.budgets.write();
        let mut pay_cycles = self.pay_cycles.write();

        if budgets.contains_key(&budget.id) || pay_cycles.contains_key(&pay_cycle.id) {
            return Err(FlowlyError::conflict("budget id already exists").into());
        }

        let Some(session) = Self::apply_update(&mut sessions, id, user_id, update, now)? else {
            return Ok(None);
        };

        budgets.insert(budget.id, budget);
        pay_cycles.insert(pay_cycle.id, pay_cycle);
        Ok(Some(session))
    }

    fn apply_update(
        sessions: &mut HashMap<Uuid, OnboardingSessionRow>,
        id: Uuid,
        user_id: &str,
        update: &UpdateOnboardingSession,
        now: DateTime<Utc>,
    ) -> Result<Option<OnboardingSessionRow>> {
        let Some(row) = sessions.get(&id) else {
            return Ok(None);
        };

        let mut session = OnboardingSession::try_from(row.clone())?;
        if !update.matches(&session, id, user_id) {
            return Ok(None);
        }
        update.apply(&mut session, now);

        if session.is_active()
            && sessions
                .values()
                .any(|other| other.id != id && other.user_id == user_id && other.is_active())
        {
            return Err(FlowlyError::update_conflict(format!(
                "user {user_id} already has an active onboarding session"
            ))
            .into());
        }

        let updated = OnboardingSessionRow::from_session(&session)?;
        sessions.insert(id, updated.clone());
        Ok(Some(updated))
    }

    pub async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.onboarding_sessions.write();
        let mut expired = 0;
        for row in sessions.values_mut() {
            if row.is_active() && row.expires_at <= now {
                row.status = "expired".to_string();
                row.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }

    // ============================================
    // Budgets
    // ============================================

    pub async fn find_budget_by_id(&self, id: Uuid) -> Result<Option<BudgetRow>> {
        Ok(self.budgets.read().get(&id).cloned())
    }

    pub async fn list_budgets_by_user_id(&self, user_id: &str) -> Result<Vec<BudgetRow>> {
        let mut rows: Vec<BudgetRow> = self
            .budgets
            .read()
            .values()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    pub async fn find_pay_cycle_by_budget_id(&self, budget_id: Uuid) -> Result<Option<PayCycleRow>> {
        Ok(self
            .pay_cycles
            .read()
            .values()
            .find(|row| row.budget_id == budget_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use flowly_core::{Event, OnboardingStatus};
    use serde_json::json;

    fn session_row(user_id: &str) -> OnboardingSessionRow {
        let session = OnboardingSession::start(user_id, Utc::now(), Duration::days(7));
        OnboardingSessionRow::from_session(&session).unwrap()
    }

    fn event_row(seq: i64, stored_at: DateTime<Utc>) -> EventRow {
        let event = Event::raw("chat", "chat.note", json!({ "n": seq }));
        EventRow::new(seq, &event, stored_at)
    }

    #[tokio::test]
    async fn test_next_seq_is_monotonic() {
        let db = InMemoryDatabase::new();
        assert_eq!(db.current_seq().await.unwrap(), 0);
        assert_eq!(db.next_seq().await.unwrap(), 1);
        assert_eq!(db.next_seq().await.unwrap(), 2);
        assert_eq!(db.current_seq().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_event_id_rejected() {
        let db = InMemoryDatabase::new();
        let row = event_row(1, Utc::now());
        db.insert_event(row.clone()).await.unwrap();

        let mut again = row;
        again.seq = 2;
        let err = db.insert_event(again).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowlyError>(),
            Some(FlowlyError::DuplicateEvent(_))
        ));
    }

    #[tokio::test]
    async fn test_events_since_is_exclusive_and_ordered() {
        let db = InMemoryDatabase::new();
        for seq in [3, 1, 2] {
            db.insert_event(event_row(seq, Utc::now())).await.unwrap();
        }

        let seqs: Vec<i64> = db
            .events_since(1)
            .await
            .unwrap()
            .iter()
            .map(|row| row.seq)
            .collect();
        assert_eq!(seqs, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_purge_advances_watermark() {
        let db = InMemoryDatabase::new();
        let old = Utc::now() - Duration::hours(25);
        db.insert_event(event_row(1, old)).await.unwrap();
        db.insert_event(event_row(2, old)).await.unwrap();
        db.insert_event(event_row(3, Utc::now())).await.unwrap();

        let purged = db
            .purge_expired_events(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(purged, 2);
        assert_eq!(db.purged_through_seq().await.unwrap(), 2);
        assert_eq!(db.events_since(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_active_session_conflicts() {
        let db = InMemoryDatabase::new();
        db.insert_session(session_row("u1")).await.unwrap();

        let err = db.insert_session(session_row("u1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FlowlyError>(),
            Some(FlowlyError::Conflict(_))
        ));

        db.insert_session(session_row("u2")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_is_scoped_to_owner_and_status() {
        let db = InMemoryDatabase::new();
        let row = session_row("u1");
        let id = row.id;
        db.insert_session(row).await.unwrap();

        let cancel = UpdateOnboardingSession {
            status: Some(OnboardingStatus::Cancelled),
            expected_status: Some(OnboardingStatus::Active),
            ..Default::default()
        };

        assert!(db
            .update_session(id, "u2", &cancel, Utc::now())
            .await
            .unwrap()
            .is_none());

        let updated = db
            .update_session(id, "u1", &cancel, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, "cancelled");

        // Expected status no longer holds
        assert!(db
            .update_session(id, "u1", &cancel, Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(db.find_active_session_by_user_id("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expire_sessions_only_touches_stale_active() {
        let db = InMemoryDatabase::new();
        let mut stale = session_row("u1");
        stale.expires_at = Utc::now() - Duration::minutes(1);
        let stale_id = stale.id;
        db.insert_session(stale).await.unwrap();
        db.insert_session(session_row("u2")).await.unwrap();

        assert_eq!(db.expire_sessions(Utc::now()).await.unwrap(), 1);
        let row = db.find_session_by_id(stale_id).await.unwrap().unwrap();
        assert_eq!(row.status, "expired");
        assert!(db.find_active_session_by_user_id("u2").await.unwrap().is_some());
    }
}
