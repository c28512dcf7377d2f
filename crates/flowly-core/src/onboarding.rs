// Onboarding session domain types
//
// These types represent the budget onboarding session and its lifecycle.
// Used by both storage and API crates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::budget::PayCycleCadence;
use crate::error::FlowlyError;

/// Default lifetime of an onboarding session before the sweep expires it
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Onboarding session status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum OnboardingStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl OnboardingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStatus::Active => "active",
            OnboardingStatus::Completed => "completed",
            OnboardingStatus::Cancelled => "cancelled",
            OnboardingStatus::Expired => "expired",
        }
    }

    /// Terminal statuses have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OnboardingStatus::Active)
    }
}

impl std::fmt::Display for OnboardingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingStatus {
    type Err = FlowlyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(OnboardingStatus::Active),
            "completed" => Ok(OnboardingStatus::Completed),
            "cancelled" => Ok(OnboardingStatus::Cancelled),
            "expired" => Ok(OnboardingStatus::Expired),
            other => Err(FlowlyError::storage(format!(
                "unknown onboarding status: {other}"
            ))),
        }
    }
}

/// Step of the onboarding flow the user is on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub enum OnboardingStep {
    #[serde(alias = "budget")]
    BudgetBasics,
    Pools,
    Categories,
    Done,
}

impl OnboardingStep {
    /// First step of a freshly started session
    pub const FIRST: OnboardingStep = OnboardingStep::BudgetBasics;

    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStep::BudgetBasics => "budgetBasics",
            OnboardingStep::Pools => "pools",
            OnboardingStep::Categories => "categories",
            OnboardingStep::Done => "done",
        }
    }

    /// The step that follows this one; `Done` is a fixed point
    pub fn next(&self) -> OnboardingStep {
        match self {
            OnboardingStep::BudgetBasics => OnboardingStep::Pools,
            OnboardingStep::Pools => OnboardingStep::Categories,
            OnboardingStep::Categories | OnboardingStep::Done => OnboardingStep::Done,
        }
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnboardingStep {
    type Err = FlowlyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "budgetBasics" | "budget" => Ok(OnboardingStep::BudgetBasics),
            "pools" => Ok(OnboardingStep::Pools),
            "categories" => Ok(OnboardingStep::Categories),
            "done" => Ok(OnboardingStep::Done),
            other => Err(FlowlyError::storage(format!(
                "unknown onboarding step: {other}"
            ))),
        }
    }
}

/// Partially filled budget basics collected during onboarding
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct OnboardingDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence: Option<PayCycleCadence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl OnboardingDraft {
    /// Draft holding every field of a submission
    pub fn filled(name: &str, cadence: PayCycleCadence, day: i32, timezone: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            cadence: Some(cadence),
            day: Some(day),
            timezone: Some(timezone.to_string()),
        }
    }
}

/// Onboarding session - one guided budget setup for one user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSession {
    pub id: Uuid,
    pub user_id: String,
    pub status: OnboardingStatus,
    pub current_step: OnboardingStep,
    pub draft: OnboardingDraft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl OnboardingSession {
    /// Build a fresh active session at the first step with an empty draft
    pub fn start(user_id: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            status: OnboardingStatus::Active,
            current_step: OnboardingStep::FIRST,
            draft: OnboardingDraft::default(),
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == OnboardingStatus::Active
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Partial update applied by the conditional session update.
///
/// `expected_status`, when set, is part of the match condition: the update only
/// applies if the stored status still equals it.
#[derive(Debug, Clone, Default)]
pub struct UpdateOnboardingSession {
    pub status: Option<OnboardingStatus>,
    pub current_step: Option<OnboardingStep>,
    pub draft: Option<OnboardingDraft>,
    pub expected_status: Option<OnboardingStatus>,
}

impl UpdateOnboardingSession {
    /// Whether a stored session satisfies the match condition
    pub fn matches(&self, session: &OnboardingSession, id: Uuid, user_id: &str) -> bool {
        session.id == id
            && session.user_id == user_id
            && self
                .expected_status
                .map_or(true, |expected| session.status == expected)
    }

    /// Apply the set fields to a session, bumping `updated_at`
    pub fn apply(&self, session: &mut OnboardingSession, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(step) = self.current_step {
            session.current_step = step;
        }
        if let Some(draft) = &self.draft {
            session.draft = draft.clone();
        }
        session.updated_at = now;
    }
}
