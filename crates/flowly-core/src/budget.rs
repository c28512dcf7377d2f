// Budget and pay cycle domain types
//
// A budget and its pay cycle are created together when onboarding completes.
// Neither has an update path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::error::FlowlyError;

/// How often the user gets paid
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PayCycleCadence {
    Weekly,
    Fortnightly,
    Monthly,
}

impl PayCycleCadence {
    pub const ALL: [PayCycleCadence; 3] = [
        PayCycleCadence::Weekly,
        PayCycleCadence::Fortnightly,
        PayCycleCadence::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayCycleCadence::Weekly => "weekly",
            PayCycleCadence::Fortnightly => "fortnightly",
            PayCycleCadence::Monthly => "monthly",
        }
    }

    /// Human label used by the onboarding form
    pub fn label(&self) -> &'static str {
        match self {
            PayCycleCadence::Weekly => "Weekly",
            PayCycleCadence::Fortnightly => "Fortnightly",
            PayCycleCadence::Monthly => "Monthly",
        }
    }

    /// Inclusive range of valid pay days.
    ///
    /// Weekly and fortnightly days are ISO weekdays. Monthly days stop at 28 so
    /// every month has the day.
    pub fn day_range(&self) -> std::ops::RangeInclusive<i32> {
        match self {
            PayCycleCadence::Weekly | PayCycleCadence::Fortnightly => 1..=7,
            PayCycleCadence::Monthly => 1..=28,
        }
    }

    /// Day preselected in the form when the draft has none
    pub fn default_day(&self) -> i32 {
        match self {
            PayCycleCadence::Monthly => 15,
            PayCycleCadence::Weekly | PayCycleCadence::Fortnightly => 1,
        }
    }
}

impl std::fmt::Display for PayCycleCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayCycleCadence {
    type Err = FlowlyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(PayCycleCadence::Weekly),
            "fortnightly" => Ok(PayCycleCadence::Fortnightly),
            "monthly" => Ok(PayCycleCadence::Monthly),
            other => Err(FlowlyError::validation(format!(
                "Unsupported pay cycle cadence: {other}."
            ))),
        }
    }
}

/// Budget created by onboarding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Pay cycle attached to a budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PayCycle {
    pub id: Uuid,
    pub user_id: String,
    pub budget_id: Uuid,
    pub cadence: PayCycleCadence,
    pub day: i32,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

/// Budget together with its pay cycle, as listed to the owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BudgetWithPayCycle {
    #[serde(flatten)]
    pub budget: Budget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pay_cycle: Option<PayCycle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_ranges() {
        assert_eq!(PayCycleCadence::Weekly.day_range(), 1..=7);
        assert_eq!(PayCycleCadence::Fortnightly.day_range(), 1..=7);
        assert_eq!(PayCycleCadence::Monthly.day_range(), 1..=28);
    }

    #[test]
    fn test_cadence_parse() {
        assert_eq!(
            "fortnightly".parse::<PayCycleCadence>().unwrap(),
            PayCycleCadence::Fortnightly
        );
        let err = "yearly".parse::<PayCycleCadence>().unwrap_err();
        assert!(matches!(err, FlowlyError::Validation(_)));
    }
}
