// Flowly core
//
// Storage-agnostic domain types and traits shared by the storage and API crates.
//
// Key design decisions:
// - Events are untyped envelopes on the wire and in storage; typed payloads
//   classify them where a consumer needs to act on a kind
// - Onboarding and event persistence sit behind traits (EventStore,
//   OnboardingStore, BudgetStore) with Postgres and in-memory implementations
// - Errors distinguish user-correctable failures from storage failures

pub mod budget;
pub mod error;
pub mod events;
pub mod onboarding;
pub mod traits;
pub mod ui_spec;
pub mod validation;

// Re-exports for convenience
pub use budget::{Budget, BudgetWithPayCycle, PayCycle, PayCycleCadence};
pub use error::{FlowlyError, Result};
pub use events::{Event, EventData};
pub use onboarding::{
    OnboardingDraft, OnboardingSession, OnboardingStatus, OnboardingStep,
    UpdateOnboardingSession, DEFAULT_SESSION_TTL_DAYS,
};
pub use traits::{BudgetStore, EventStore, OnboardingStore};
pub use ui_spec::{build_budget_onboarding_form_spec, BudgetOnboardingFormSpec};
