// Storage layer for Flowly
// Decision: Support both PostgreSQL (production) and in-memory (dev mode)
//
// StorageBackend implements the flowly-core store traits:
// - EventStore: sequence counter and append-only event log
// - OnboardingStore: onboarding sessions, with budget creation on completion
// - BudgetStore: budget and pay cycle lookups

pub mod backend;
pub mod memory;
pub mod models;
pub mod repositories;

pub use backend::StorageBackend;
pub use memory::InMemoryDatabase;
pub use models::*;
pub use repositories::Database;
