// Core traits for pluggable backends
//
// These traits let the onboarding service and the event bus run against:
// - PostgreSQL in production
// - In-memory maps for local development and tests
//
// Cross-request exclusion (the sequence counter and the one-active-session rule)
// is the store's job, not the caller's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::budget::{Budget, PayCycle};
use crate::error::Result;
use crate::events::Event;
use crate::onboarding::{OnboardingSession, UpdateOnboardingSession};

// ============================================================================
// EventStore - Sequencer and append-only event log
// ============================================================================

/// Trait for the sequence counter and the event log
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically increment the `events` counter and return the new value.
    ///
    /// Creates the counter on first use. Never returns a value less than or
    /// equal to one it returned before, across concurrent callers and restarts.
    async fn next_seq(&self) -> Result<i64>;

    /// Last allocated sequence number, 0 when nothing was allocated yet
    async fn current_seq(&self) -> Result<i64>;

    /// Persist an event under `seq`.
    ///
    /// Fails with `DuplicateEvent` when the event id is already stored.
    async fn insert_event(&self, seq: i64, event: &Event) -> Result<()>;

    /// All stored events with `seq > last_seq`, ascending by seq
    async fn events_since(&self, last_seq: i64) -> Result<Vec<Event>>;

    /// Delete events stored before `older_than`; returns how many were removed
    async fn purge_expired_events(&self, older_than: DateTime<Utc>) -> Result<u64>;

    /// Highest seq ever removed by a purge, 0 when nothing was purged
    async fn purged_through_seq(&self) -> Result<i64>;
}

// ============================================================================
// OnboardingStore - Onboarding session records
// ============================================================================

/// Trait for onboarding session persistence
#[async_trait]
pub trait OnboardingStore: Send + Sync {
    async fn find_active_session_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<OnboardingSession>>;

    async fn find_session_by_id(&self, id: Uuid) -> Result<Option<OnboardingSession>>;

    /// Insert a new session.
    ///
    /// Fails with `Conflict` when the user already has an active session.
    async fn insert_session(&self, session: &OnboardingSession) -> Result<()>;

    /// Conditional update scoped to `(id, user_id)` and the update's expected
    /// status. Returns `None` when nothing matched.
    async fn update_session(
        &self,
        id: Uuid,
        user_id: &str,
        update: UpdateOnboardingSession,
    ) -> Result<Option<OnboardingSession>>;

    /// Insert the budget and pay cycle and apply the session update atomically.
    ///
    /// Returns `None`, with nothing written, when the session update matched
    /// nothing.
    async fn complete_session(
        &self,
        id: Uuid,
        user_id: &str,
        budget: &Budget,
        pay_cycle: &PayCycle,
        update: UpdateOnboardingSession,
    ) -> Result<Option<OnboardingSession>>;

    /// Mark active sessions whose `expires_at` is at or before `now` as expired
    async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<u64>;
}

// ============================================================================
// BudgetStore - Read access to budgets created by onboarding
// ============================================================================

/// Trait for budget and pay cycle lookups
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn find_budget_by_id(&self, id: Uuid) -> Result<Option<Budget>>;

    /// Budgets owned by the user, newest first
    async fn list_budgets_by_user_id(&self, user_id: &str) -> Result<Vec<Budget>>;

    async fn find_pay_cycle_by_budget_id(&self, budget_id: Uuid) -> Result<Option<PayCycle>>;
}
