// Database models (internal, may differ from domain types)
//
// Rows hold enums as TEXT and drafts/payloads as JSONB. Conversions to and from
// the domain types live here so both backends share them.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use flowly_core::{
    Budget, Event, OnboardingDraft, OnboardingSession, OnboardingStatus, OnboardingStep, PayCycle,
    PayCycleCadence,
};
use sqlx::FromRow;
use uuid::Uuid;

/// Counter allocating event sequence numbers
pub const EVENTS_COUNTER: &str = "events";

/// Counter holding the highest purged event seq
pub const EVENTS_PURGED_COUNTER: &str = "events_purged";

// ============================================
// Events
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub seq: i64,
    pub channel: String,
    pub event_type: String,
    pub payload: sqlx::types::JsonValue,
    pub sent_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
}

impl EventRow {
    pub fn new(seq: i64, event: &Event, stored_at: DateTime<Utc>) -> Self {
        Self {
            id: event.id.clone(),
            seq,
            channel: event.channel.clone(),
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            sent_at: event.sent_at,
            stored_at,
        }
    }
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            channel: row.channel,
            event_type: row.event_type,
            payload: row.payload,
            sent_at: row.sent_at,
            seq: Some(row.seq),
        }
    }
}

// ============================================
// Onboarding sessions
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct OnboardingSessionRow {
    pub id: Uuid,
    pub user_id: String,
    pub status: String,
    pub current_step: String,
    pub draft: sqlx::types::JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OnboardingSessionRow {
    pub fn from_session(session: &OnboardingSession) -> Result<Self> {
        Ok(Self {
            id: session.id,
            user_id: session.user_id.clone(),
            status: session.status.as_str().to_string(),
            current_step: session.current_step.as_str().to_string(),
            draft: serde_json::to_value(&session.draft).context("serialize onboarding draft")?,
            created_at: session.created_at,
            updated_at: session.updated_at,
            expires_at: session.expires_at,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == OnboardingStatus::Active.as_str()
    }
}

impl TryFrom<OnboardingSessionRow> for OnboardingSession {
    type Error = anyhow::Error;

    fn try_from(row: OnboardingSessionRow) -> Result<Self> {
        let status: OnboardingStatus = row.status.parse()?;
        let current_step: OnboardingStep = row.current_step.parse()?;
        let draft: OnboardingDraft = serde_json::from_value(row.draft)
            .with_context(|| format!("malformed draft on onboarding session {}", row.id))?;

        Ok(OnboardingSession {
            id: row.id,
            user_id: row.user_id,
            status,
            current_step,
            draft,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

// ============================================
// Budgets and pay cycles
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct BudgetRow {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Budget> for BudgetRow {
    fn from(budget: &Budget) -> Self {
        Self {
            id: budget.id,
            user_id: budget.user_id.clone(),
            name: budget.name.clone(),
            created_at: budget.created_at,
        }
    }
}

impl From<BudgetRow> for Budget {
    fn from(row: BudgetRow) -> Self {
        Budget {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PayCycleRow {
    pub id: Uuid,
    pub user_id: String,
    pub budget_id: Uuid,
    pub cadence: String,
    pub day: i32,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PayCycle> for PayCycleRow {
    fn from(pay_cycle: &PayCycle) -> Self {
        Self {
            id: pay_cycle.id,
            user_id: pay_cycle.user_id.clone(),
            budget_id: pay_cycle.budget_id,
            cadence: pay_cycle.cadence.as_str().to_string(),
            day: pay_cycle.day,
            timezone: pay_cycle.timezone.clone(),
            created_at: pay_cycle.created_at,
        }
    }
}

impl TryFrom<PayCycleRow> for PayCycle {
    type Error = anyhow::Error;

    fn try_from(row: PayCycleRow) -> Result<Self> {
        let cadence: PayCycleCadence = row
            .cadence
            .parse()
            .map_err(|_| anyhow!("unknown pay cycle cadence: {}", row.cadence))?;

        Ok(PayCycle {
            id: row.id,
            user_id: row.user_id,
            budget_id: row.budget_id,
            cadence,
            day: row.day,
            timezone: row.timezone,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_row_round_trip() {
        let mut session = OnboardingSession::start("u1", Utc::now(), Duration::days(7));
        session.draft = OnboardingDraft::filled("Rent", PayCycleCadence::Weekly, 5, "UTC");

        let row = OnboardingSessionRow::from_session(&session).unwrap();
        assert_eq!(row.status, "active");
        assert_eq!(row.current_step, "budgetBasics");
        assert_eq!(row.draft["cadence"], "weekly");

        let back = OnboardingSession::try_from(row).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_session_row_accepts_legacy_step() {
        let session = OnboardingSession::start("u1", Utc::now(), Duration::days(7));
        let mut row = OnboardingSessionRow::from_session(&session).unwrap();
        row.current_step = "budget".to_string();

        let back = OnboardingSession::try_from(row).unwrap();
        assert_eq!(back.current_step, OnboardingStep::BudgetBasics);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let session = OnboardingSession::start("u1", Utc::now(), Duration::days(7));
        let mut row = OnboardingSessionRow::from_session(&session).unwrap();
        row.status = "paused".to_string();
        assert!(OnboardingSession::try_from(row).is_err());
    }
}
