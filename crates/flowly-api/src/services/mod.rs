// Services layer
// Services own business logic and validation and talk to storage through the
// flowly-core store traits. HTTP handlers stay thin.

pub mod budgets;
pub mod commands;
pub mod event_bus;
pub mod live_stream;
pub mod maintenance;
pub mod metrics;
pub mod onboarding;

pub use budgets::BudgetService;
pub use commands::CommandRouter;
pub use event_bus::{EventBus, Subscription};
pub use live_stream::{Frame, LiveStreamService};
pub use maintenance::{MaintenanceService, SweepReport};
pub use metrics::MetricsRegistry;
pub use onboarding::OnboardingService;

use flowly_storage::StorageBackend;
use std::sync::Arc;

use crate::config::ServerConfig;

/// Every service, wired to one storage backend and one bus
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<StorageBackend>,
    pub bus: Arc<EventBus>,
    pub onboarding: Arc<OnboardingService>,
    pub budgets: Arc<BudgetService>,
    pub commands: Arc<CommandRouter>,
    pub metrics: Arc<MetricsRegistry>,
    pub live_stream: LiveStreamService,
    pub maintenance: Arc<MaintenanceService>,
}

impl Services {
    pub fn new(storage: Arc<StorageBackend>, config: &ServerConfig) -> Self {
        let bus = Arc::new(EventBus::new(storage.clone()));
        let onboarding = Arc::new(OnboardingService::new(
            storage.clone(),
            bus.clone(),
            config.session_ttl,
        ));
        let budgets = Arc::new(BudgetService::new(storage.clone()));
        let commands = Arc::new(CommandRouter::new(onboarding.clone(), bus.clone()));
        let metrics = Arc::new(MetricsRegistry::with_defaults(bus.clone()));
        let live_stream = LiveStreamService::new(
            bus.clone(),
            onboarding.clone(),
            commands.clone(),
            metrics.clone(),
        );
        let maintenance = Arc::new(MaintenanceService::new(
            storage.clone(),
            onboarding.clone(),
            config.event_retention,
        ));

        Self {
            storage,
            bus,
            onboarding,
            budgets,
            commands,
            metrics,
            live_stream,
            maintenance,
        }
    }
}
