// Input validation for budget onboarding submissions
//
// Every check runs before storage is touched. Messages are shown to the end user.

use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::budget::PayCycleCadence;
use crate::error::{FlowlyError, Result};

/// Value/label pair rendered as a select option
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DayOption {
    pub value: i32,
    pub label: String,
}

/// ISO weekday options (Monday = 1)
pub const ISO_WEEKDAYS: [(i32, &str); 7] = [
    (1, "Mon"),
    (2, "Tue"),
    (3, "Wed"),
    (4, "Thu"),
    (5, "Fri"),
    (6, "Sat"),
    (7, "Sun"),
];

pub fn iso_weekday_options() -> Vec<DayOption> {
    ISO_WEEKDAYS
        .iter()
        .map(|(value, label)| DayOption {
            value: *value,
            label: (*label).to_string(),
        })
        .collect()
}

pub fn monthly_day_options() -> Vec<DayOption> {
    PayCycleCadence::Monthly
        .day_range()
        .map(|value| DayOption {
            value,
            label: value.to_string(),
        })
        .collect()
}

pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(FlowlyError::validation("User id is required."));
    }
    Ok(())
}

pub fn validate_budget_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FlowlyError::validation("Budget name is required."));
    }
    Ok(())
}

pub fn validate_timezone(timezone: &str) -> Result<()> {
    if timezone.trim().is_empty() {
        return Err(FlowlyError::validation("Timezone is required."));
    }
    Ok(())
}

pub fn validate_pay_cycle_day(cadence: PayCycleCadence, day: i32) -> Result<()> {
    let range = cadence.day_range();
    if range.contains(&day) {
        return Ok(());
    }

    let message = match cadence {
        PayCycleCadence::Monthly => format!(
            "Monthly pay cycle day must be between {} and {}.",
            range.start(),
            range.end()
        ),
        other => format!(
            "{} pay cycle day must be between {} and {}.",
            other,
            range.start(),
            range.end()
        ),
    };
    Err(FlowlyError::Validation(message))
}
