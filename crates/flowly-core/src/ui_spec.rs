// Budget onboarding form spec
//
// The client renders forms from a flat element map rooted at `root`. The server
// only describes the form; rendering is the client's concern.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::budget::PayCycleCadence;
use crate::onboarding::OnboardingDraft;
use crate::validation::{iso_weekday_options, monthly_day_options, DayOption};

pub const FORM_ROOT: &str = "budget-onboarding-form";
pub const FORM_COMPONENT: &str = "BudgetOnboardingForm";
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CadenceOption {
    pub value: PayCycleCadence,
    pub label: String,
}

/// Props for the `BudgetOnboardingForm` component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BudgetOnboardingFormProps {
    pub session_id: Uuid,
    pub name: String,
    pub cadence: PayCycleCadence,
    pub day: i32,
    pub timezone: String,
    pub cadence_options: Vec<CadenceOption>,
    pub weekday_options: Vec<DayOption>,
    pub monthly_day_options: Vec<DayOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct FormElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub props: BudgetOnboardingFormProps,
    pub children: Vec<String>,
}

/// Renderable form spec: a root key plus the element map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BudgetOnboardingFormSpec {
    pub root: String,
    pub elements: BTreeMap<String, FormElement>,
}

impl BudgetOnboardingFormSpec {
    /// Props of the root form element
    pub fn props(&self) -> Option<&BudgetOnboardingFormProps> {
        self.elements.get(&self.root).map(|element| &element.props)
    }
}

/// Build the onboarding form, prefilled from the draft.
///
/// Missing draft fields fall back to monthly cadence, day 15 (or 1 for weekly
/// cadences), timezone UTC and an empty name.
pub fn build_budget_onboarding_form_spec(
    session_id: Uuid,
    draft: &OnboardingDraft,
) -> BudgetOnboardingFormSpec {
    let cadence = draft.cadence.unwrap_or(PayCycleCadence::Monthly);

    let props = BudgetOnboardingFormProps {
        session_id,
        name: draft.name.clone().unwrap_or_default(),
        cadence,
        day: draft.day.unwrap_or_else(|| cadence.default_day()),
        timezone: draft
            .timezone
            .clone()
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        cadence_options: PayCycleCadence::ALL
            .iter()
            .map(|cadence| CadenceOption {
                value: *cadence,
                label: cadence.label().to_string(),
            })
            .collect(),
        weekday_options: iso_weekday_options(),
        monthly_day_options: monthly_day_options(),
    };

    let mut elements = BTreeMap::new();
    elements.insert(
        FORM_ROOT.to_string(),
        FormElement {
            element_type: FORM_COMPONENT.to_string(),
            props,
            children: Vec::new(),
        },
    );

    BudgetOnboardingFormSpec {
        root: FORM_ROOT.to_string(),
        elements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_draft_defaults() {
        let session_id = Uuid::now_v7();
        let spec = build_budget_onboarding_form_spec(session_id, &OnboardingDraft::default());
        let props = spec.props().unwrap();

        assert_eq!(spec.root, FORM_ROOT);
        assert_eq!(props.session_id, session_id);
        assert_eq!(props.name, "");
        assert_eq!(props.cadence, PayCycleCadence::Monthly);
        assert_eq!(props.day, 15);
        assert_eq!(props.timezone, "UTC");
        assert_eq!(props.cadence_options.len(), 3);
    }

    #[test]
    fn test_weekly_draft_defaults_day_to_monday() {
        let draft = OnboardingDraft {
            cadence: Some(PayCycleCadence::Weekly),
            ..Default::default()
        };
        let spec = build_budget_onboarding_form_spec(Uuid::now_v7(), &draft);
        assert_eq!(spec.props().unwrap().day, 1);
    }

    #[test]
    fn test_wire_shape() {
        let draft = OnboardingDraft::filled("Groceries", PayCycleCadence::Monthly, 31, "UTC");
        let json = serde_json::to_value(build_budget_onboarding_form_spec(Uuid::nil(), &draft))
            .unwrap();

        let element = &json["elements"]["budget-onboarding-form"];
        assert_eq!(element["type"], "BudgetOnboardingForm");
        assert_eq!(element["props"]["name"], "Groceries");
        assert_eq!(element["props"]["day"], 31);
        assert_eq!(element["props"]["cadenceOptions"][1]["value"], "fortnightly");
        assert_eq!(element["props"]["weekdayOptions"][6]["label"], "Sun");
        assert!(element["children"].as_array().unwrap().is_empty());
    }
}
