// Metric widget registry
// Decision: Process-local; specs are UI state, re-sent to each new stream as
//           snapshots and broadcast as metrics.upsert when they change

use flowly_core::events::MetricsUpsertData;
use flowly_core::{Event, FlowlyError, Result};
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::event_bus::EventBus;

pub const INCOME_VS_SAVINGS: &str = "income-vs-savings";

/// Spec for the income vs savings widget shown on first load
pub fn income_vs_savings_spec(income: i64, savings: i64) -> Value {
    json!({
        "root": INCOME_VS_SAVINGS,
        "elements": {
            INCOME_VS_SAVINGS: {
                "type": "IncomeVsSavingsMetric",
                "props": {
                    "title": "Income vs savings",
                    "income": income,
                    "savings": savings,
                },
                "children": [],
            }
        }
    })
}

/// Check a spec has the renderable shape `{root, elements: {<root>: ...}}`
fn validate_spec(metric_id: &str, spec: &Value) -> Result<()> {
    if metric_id.trim().is_empty() {
        return Err(FlowlyError::validation("Metric id is required."));
    }
    let root = spec
        .get("root")
        .and_then(Value::as_str)
        .ok_or_else(|| FlowlyError::validation("Metric spec must have a string root."))?;
    let elements = spec
        .get("elements")
        .and_then(Value::as_object)
        .ok_or_else(|| FlowlyError::validation("Metric spec must have an elements object."))?;
    if !elements.contains_key(root) {
        return Err(FlowlyError::validation(
            "Metric spec root must name one of its elements.",
        ));
    }
    Ok(())
}

pub struct MetricsRegistry {
    specs: RwLock<BTreeMap<String, Value>>,
    bus: Arc<EventBus>,
}

impl MetricsRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            specs: RwLock::new(BTreeMap::new()),
            bus,
        }
    }

    /// Registry seeded with the default dashboard widgets
    pub fn with_defaults(bus: Arc<EventBus>) -> Self {
        let registry = Self::new(bus);
        registry.specs.write().insert(
            INCOME_VS_SAVINGS.to_string(),
            income_vs_savings_spec(4800, 1200),
        );
        registry
    }

    pub fn list(&self) -> Vec<MetricsUpsertData> {
        self.specs
            .read()
            .iter()
            .map(|(metric_id, spec)| MetricsUpsertData {
                metric_id: metric_id.clone(),
                spec: spec.clone(),
            })
            .collect()
    }

    /// One unsequenced metrics.upsert event per registered metric
    pub fn snapshots(&self) -> Vec<Event> {
        self.list().into_iter().map(Event::new).collect()
    }

    /// Store a spec and broadcast it
    pub async fn upsert(&self, metric_id: &str, spec: Value) -> Result<Event> {
        validate_spec(metric_id, &spec)?;
        let metric_id = metric_id.trim().to_string();

        self.specs.write().insert(metric_id.clone(), spec.clone());
        tracing::debug!(metric_id = %metric_id, "Metric spec updated");

        self.bus
            .publish(Event::new(MetricsUpsertData { metric_id, spec }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowly_core::events::METRICS_UPSERT;
    use flowly_storage::StorageBackend;

    fn bus() -> Arc<EventBus> {
        Arc::new(EventBus::new(Arc::new(StorageBackend::in_memory())))
    }

    #[test]
    fn test_defaults_seed_income_vs_savings() {
        let registry = MetricsRegistry::with_defaults(bus());
        let snapshots = registry.snapshots();

        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].event_type, METRICS_UPSERT);
        assert!(snapshots[0].seq.is_none());
        assert_eq!(snapshots[0].payload["metricId"], INCOME_VS_SAVINGS);
        assert_eq!(
            snapshots[0].payload["spec"]["elements"][INCOME_VS_SAVINGS]["props"]["income"],
            4800
        );
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_publishes() {
        let bus = bus();
        let registry = MetricsRegistry::with_defaults(bus.clone());

        let event = registry
            .upsert(INCOME_VS_SAVINGS, income_vs_savings_spec(5000, 2000))
            .await
            .unwrap();
        assert_eq!(event.seq, Some(1));

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].spec["elements"][INCOME_VS_SAVINGS]["props"]["savings"],
            2000
        );
        assert_eq!(bus.events_since(0).await.unwrap(), vec![event]);
    }

    #[tokio::test]
    async fn test_malformed_spec_rejected() {
        let registry = MetricsRegistry::new(bus());

        let err = registry
            .upsert("m1", json!({ "elements": {} }))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlyError::Validation(_)));

        let err = registry
            .upsert("m1", json!({ "root": "a", "elements": { "b": {} } }))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlyError::Validation(_)));

        assert!(registry.upsert(" ", json!({})).await.is_err());
        assert!(registry.list().is_empty());
    }
}
