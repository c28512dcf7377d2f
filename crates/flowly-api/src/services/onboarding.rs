// Onboarding service (budget onboarding state machine)
//
// active -> completed (submit), active -> cancelled (cancel), active -> expired
// (maintenance sweep). Terminal states have no outgoing transitions.
//
// Every write is conditioned on (id, user_id, expected status) after a fresh read;
// a write that matches nothing is an UpdateConflict, never a silent success.

use chrono::Utc;
use flowly_core::events::{
    BudgetCreatedData, OnboardingCancelledData, OnboardingCompletedData, OnboardingStartedData,
    OnboardingState, PayCycleSummary,
};
use flowly_core::validation::{
    validate_budget_name, validate_pay_cycle_day, validate_timezone, validate_user_id,
};
use flowly_core::{
    build_budget_onboarding_form_spec, Budget, Event, FlowlyError, OnboardingDraft,
    OnboardingSession, OnboardingStatus, OnboardingStep, OnboardingStore, PayCycle,
    PayCycleCadence, Result, UpdateOnboardingSession,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::event_bus::EventBus;

const SESSION_NOT_FOUND: &str = "Onboarding session not found.";
const SESSION_NOT_ACTIVE: &str = "Onboarding session is not active.";

/// Budget basics as submitted by the client (unvalidated)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BudgetBasicsInput {
    #[schema(example = "Household")]
    pub name: String,
    /// One of weekly, fortnightly, monthly
    #[schema(example = "monthly")]
    pub cadence: String,
    /// ISO weekday (1-7) for weekly/fortnightly, day of month (1-28) for monthly
    #[schema(example = 15)]
    pub day: i32,
    #[schema(example = "Europe/London")]
    pub timezone: String,
}

impl BudgetBasicsInput {
    /// Draft holding the submitted values as-is, for re-rendering a rejected form
    pub fn as_draft(&self) -> OnboardingDraft {
        OnboardingDraft {
            name: Some(self.name.clone()),
            cadence: self.cadence.trim().parse().ok(),
            day: Some(self.day),
            timezone: Some(self.timezone.clone()),
        }
    }

    fn validate(&self) -> Result<BudgetBasics> {
        let name = self.name.trim();
        validate_budget_name(name)?;
        let timezone = self.timezone.trim();
        validate_timezone(timezone)?;
        let cadence: PayCycleCadence = self.cadence.trim().parse()?;
        validate_pay_cycle_day(cadence, self.day)?;

        Ok(BudgetBasics {
            name: name.to_string(),
            cadence,
            day: self.day,
            timezone: timezone.to_string(),
        })
    }
}

/// Validated, trimmed budget basics
struct BudgetBasics {
    name: String,
    cadence: PayCycleCadence,
    day: i32,
    timezone: String,
}

/// Result of a successful submit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub session_id: Uuid,
    pub budget_id: Uuid,
    pub pay_cycle_id: Uuid,
    pub status: OnboardingStatus,
}

/// Result of a successful cancel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub session_id: Uuid,
    pub status: OnboardingStatus,
}

pub struct OnboardingService {
    store: Arc<dyn OnboardingStore>,
    bus: Arc<EventBus>,
    session_ttl: chrono::Duration,
}

impl OnboardingService {
    pub fn new(
        store: Arc<dyn OnboardingStore>,
        bus: Arc<EventBus>,
        session_ttl: chrono::Duration,
    ) -> Self {
        Self {
            store,
            bus,
            session_ttl,
        }
    }

    /// Start onboarding, or return the user's existing active session unchanged
    pub async fn start(&self, user_id: &str) -> Result<OnboardingSession> {
        validate_user_id(user_id)?;

        if let Some(existing) = self.store.find_active_session_by_user_id(user_id).await? {
            tracing::debug!(session_id = %existing.id, user_id, "Resuming onboarding session");
            return Ok(existing);
        }

        let session = OnboardingSession::start(user_id, Utc::now(), self.session_ttl);
        match self.store.insert_session(&session).await {
            Ok(()) => {}
            Err(FlowlyError::Conflict(_)) => {
                // Lost the race to a concurrent start; the winner's session is the answer
                tracing::debug!(user_id, "Concurrent onboarding start, re-reading");
                return self
                    .store
                    .find_active_session_by_user_id(user_id)
                    .await?
                    .ok_or_else(|| {
                        FlowlyError::update_conflict("Active onboarding session vanished.")
                    });
            }
            Err(e) => return Err(e),
        }

        let state = OnboardingState::from_session(&session).with_ui_spec(
            build_budget_onboarding_form_spec(session.id, &session.draft),
        );
        self.bus.publish(Event::new(OnboardingStartedData(state))).await?;

        tracing::info!(session_id = %session.id, user_id, "Onboarding session started");
        Ok(session)
    }

    /// Submit budget basics, creating the budget and pay cycle and completing the session
    pub async fn submit(
        &self,
        user_id: &str,
        session_id: Uuid,
        input: &BudgetBasicsInput,
    ) -> Result<SubmitOutcome> {
        validate_user_id(user_id)?;
        let basics = input.validate()?;
        let session = self.load_active(user_id, session_id).await?;

        let now = Utc::now();
        let budget = Budget {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            name: basics.name.clone(),
            created_at: now,
        };
        let pay_cycle = PayCycle {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            budget_id: budget.id,
            cadence: basics.cadence,
            day: basics.day,
            timezone: basics.timezone.clone(),
            created_at: now,
        };
        let update = UpdateOnboardingSession {
            status: Some(OnboardingStatus::Completed),
            current_step: Some(OnboardingStep::Pools),
            draft: Some(OnboardingDraft::filled(
                &basics.name,
                basics.cadence,
                basics.day,
                &basics.timezone,
            )),
            expected_status: Some(OnboardingStatus::Active),
        };

        let completed = self
            .store
            .complete_session(session.id, user_id, &budget, &pay_cycle, update)
            .await?
            .ok_or_else(|| FlowlyError::update_conflict("Failed to update onboarding session."))?;

        self.bus
            .publish(Event::new(BudgetCreatedData {
                budget_id: budget.id,
                user_id: user_id.to_string(),
                name: budget.name.clone(),
                pay_cycle: PayCycleSummary {
                    pay_cycle_id: pay_cycle.id,
                    cadence: pay_cycle.cadence,
                    day: pay_cycle.day,
                    timezone: pay_cycle.timezone.clone(),
                },
            }))
            .await?;
        self.bus
            .publish(Event::new(OnboardingCompletedData::from_session(&completed)))
            .await?;

        tracing::info!(
            session_id = %completed.id,
            budget_id = %budget.id,
            user_id,
            "Onboarding session completed"
        );

        Ok(SubmitOutcome {
            session_id: completed.id,
            budget_id: budget.id,
            pay_cycle_id: pay_cycle.id,
            status: completed.status,
        })
    }

    /// Cancel an active session
    pub async fn cancel(&self, user_id: &str, session_id: Uuid) -> Result<CancelOutcome> {
        validate_user_id(user_id)?;
        let session = self.load_active(user_id, session_id).await?;

        let update = UpdateOnboardingSession {
            status: Some(OnboardingStatus::Cancelled),
            expected_status: Some(OnboardingStatus::Active),
            ..Default::default()
        };
        let cancelled = self
            .store
            .update_session(session.id, user_id, update)
            .await?
            .ok_or_else(|| FlowlyError::update_conflict("Failed to cancel onboarding session."))?;

        self.bus
            .publish(Event::new(OnboardingCancelledData {
                session_id: cancelled.id,
                user_id: cancelled.user_id.clone(),
                status: cancelled.status,
            }))
            .await?;

        tracing::info!(session_id = %cancelled.id, user_id, "Onboarding session cancelled");

        Ok(CancelOutcome {
            session_id: cancelled.id,
            status: cancelled.status,
        })
    }

    /// The user's active session, if any
    pub async fn active_session(&self, user_id: &str) -> Result<Option<OnboardingSession>> {
        validate_user_id(user_id)?;
        self.store.find_active_session_by_user_id(user_id).await
    }

    /// Mark sessions past their expiry as expired
    pub async fn expire_sessions(&self) -> Result<u64> {
        self.store.expire_sessions(Utc::now()).await
    }

    /// Load a session owned by the user and require it to be active.
    ///
    /// A session owned by someone else is reported as not found.
    async fn load_active(&self, user_id: &str, session_id: Uuid) -> Result<OnboardingSession> {
        let session = self
            .store
            .find_session_by_id(session_id)
            .await?
            .filter(|session| session.is_owned_by(user_id))
            .ok_or_else(|| FlowlyError::not_found(SESSION_NOT_FOUND))?;

        if !session.is_active() {
            return Err(FlowlyError::invalid_state(SESSION_NOT_ACTIVE));
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowly_core::events::{BUDGETS_CREATED, ONBOARDING_COMPLETED, ONBOARDING_STARTED};
    use flowly_core::BudgetStore;
    use flowly_storage::StorageBackend;

    struct Fixture {
        store: Arc<StorageBackend>,
        bus: Arc<EventBus>,
        service: Arc<OnboardingService>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(StorageBackend::in_memory());
        let bus = Arc::new(EventBus::new(store.clone()));
        let service = Arc::new(OnboardingService::new(
            store.clone(),
            bus.clone(),
            chrono::Duration::days(7),
        ));
        Fixture {
            store,
            bus,
            service,
        }
    }

    fn basics(day: i32) -> BudgetBasicsInput {
        BudgetBasicsInput {
            name: "Groceries".to_string(),
            cadence: "monthly".to_string(),
            day,
            timezone: "UTC".to_string(),
        }
    }

    async fn event_types(bus: &EventBus, since: i64) -> Vec<String> {
        bus.events_since(since)
            .await
            .unwrap()
            .into_iter()
            .map(|event| event.event_type)
            .collect()
    }

    #[tokio::test]
    async fn test_start_creates_session_and_publishes() {
        let f = fixture();
        let session = f.service.start("u1").await.unwrap();

        assert_eq!(session.status, OnboardingStatus::Active);
        assert_eq!(session.current_step, OnboardingStep::BudgetBasics);
        assert_eq!(session.draft, OnboardingDraft::default());

        let events = f.bus.events_since(0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ONBOARDING_STARTED);
        assert_eq!(events[0].user_id(), Some("u1"));
        assert_eq!(
            events[0].payload["uiSpec"]["root"],
            "budget-onboarding-form"
        );
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let f = fixture();
        let first = f.service.start("u1").await.unwrap();
        let second = f.service.start("u1").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(event_types(&f.bus, 0).await, vec![ONBOARDING_STARTED]);
    }

    #[tokio::test]
    async fn test_concurrent_starts_share_one_session() {
        let f = fixture();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = f.service.clone();
                tokio::spawn(async move { service.start("u1").await.unwrap().id })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(event_types(&f.bus, 0).await, vec![ONBOARDING_STARTED]);
    }

    #[tokio::test]
    async fn test_start_rejects_blank_user() {
        let f = fixture();
        let err = f.service.start("  ").await.unwrap_err();
        assert!(matches!(err, FlowlyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_invalid_day_then_valid_submit() {
        let f = fixture();
        let session = f.service.start("u1").await.unwrap();
        let after_start = f.bus.current_seq().await.unwrap();

        let err = f
            .service
            .submit("u1", session.id, &basics(31))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlyError::Validation(_)));
        assert!(err.to_string().contains("day must be between 1 and 28"));
        assert!(f.store.list_budgets_by_user_id("u1").await.unwrap().is_empty());

        let outcome = f
            .service
            .submit("u1", session.id, &basics(15))
            .await
            .unwrap();
        assert_eq!(outcome.session_id, session.id);
        assert_eq!(outcome.status, OnboardingStatus::Completed);

        assert_eq!(
            event_types(&f.bus, after_start).await,
            vec![BUDGETS_CREATED, ONBOARDING_COMPLETED]
        );

        let budget = f
            .store
            .find_budget_by_id(outcome.budget_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(budget.name, "Groceries");
        let pay_cycle = f
            .store
            .find_pay_cycle_by_budget_id(outcome.budget_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pay_cycle.id, outcome.pay_cycle_id);
        assert_eq!(pay_cycle.day, 15);
    }

    #[tokio::test]
    async fn test_submit_trims_and_advances_step() {
        let f = fixture();
        let session = f.service.start("u1").await.unwrap();
        let input = BudgetBasicsInput {
            name: "  Rent  ".to_string(),
            cadence: "weekly".to_string(),
            day: 5,
            timezone: " Europe/London ".to_string(),
        };

        f.service.submit("u1", session.id, &input).await.unwrap();

        let stored = f.store.find_session_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OnboardingStatus::Completed);
        assert_eq!(stored.current_step, OnboardingStep::Pools);
        assert_eq!(stored.draft.name.as_deref(), Some("Rent"));
        assert_eq!(stored.draft.timezone.as_deref(), Some("Europe/London"));
    }

    #[tokio::test]
    async fn test_submit_unknown_cadence() {
        let f = fixture();
        let session = f.service.start("u1").await.unwrap();
        let input = BudgetBasicsInput {
            cadence: "yearly".to_string(),
            ..basics(1)
        };

        let err = f.service.submit("u1", session.id, &input).await.unwrap_err();
        assert!(matches!(err, FlowlyError::Validation(_)));
        assert!(input.as_draft().cadence.is_none());
    }

    #[tokio::test]
    async fn test_foreign_session_is_not_found() {
        let f = fixture();
        let session = f.service.start("u1").await.unwrap();

        let err = f
            .service
            .submit("u2", session.id, &basics(15))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), SESSION_NOT_FOUND);

        let err = f.service.cancel("u2", session.id).await.unwrap_err();
        assert!(matches!(err, FlowlyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_terminal_session_rejects_transitions() {
        let f = fixture();
        let session = f.service.start("u1").await.unwrap();
        f.service
            .submit("u1", session.id, &basics(15))
            .await
            .unwrap();

        let err = f
            .service
            .submit("u1", session.id, &basics(15))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), SESSION_NOT_ACTIVE);

        let err = f.service.cancel("u1", session.id).await.unwrap_err();
        assert!(matches!(err, FlowlyError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_cancel_then_start_opens_new_session() {
        let f = fixture();
        let first = f.service.start("u1").await.unwrap();

        let outcome = f.service.cancel("u1", first.id).await.unwrap();
        assert_eq!(outcome.status, OnboardingStatus::Cancelled);
        assert!(f.service.active_session("u1").await.unwrap().is_none());

        let second = f.service.start("u1").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_cancel_event_payload() {
        let f = fixture();
        let session = f.service.start("u1").await.unwrap();
        f.service.cancel("u1", session.id).await.unwrap();

        let events = f.bus.events_since(1).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["status"], "cancelled");
        assert_eq!(events[0].payload["sessionId"], session.id.to_string());
    }

    #[tokio::test]
    async fn test_expire_sessions_sweeps_stale() {
        let store = Arc::new(StorageBackend::in_memory());
        let bus = Arc::new(EventBus::new(store.clone()));
        let service = OnboardingService::new(store.clone(), bus, chrono::Duration::seconds(-1));

        service.start("u1").await.unwrap();
        assert_eq!(service.expire_sessions().await.unwrap(), 1);
        assert!(service.active_session("u1").await.unwrap().is_none());
    }
}
