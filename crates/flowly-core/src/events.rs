// Event Protocol
//
// Every event is an envelope: id, channel, type, payload, sentAt, seq.
// The envelope is what gets stored and streamed; the payload stays untyped JSON
// so unknown event kinds survive a round trip through storage and replay.
// Typed payload structs exist for each known (channel, type) pair and are used
// by publishers to build events and by consumers that need to act on a kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

use crate::budget::PayCycleCadence;
use crate::onboarding::{OnboardingDraft, OnboardingSession, OnboardingStatus, OnboardingStep};
use crate::ui_spec::BudgetOnboardingFormSpec;

// ============================================================================
// Channel Constants
// ============================================================================

pub const CHANNEL_ONBOARDING: &str = "onboarding";
pub const CHANNEL_BUDGETS: &str = "budgets";
pub const CHANNEL_SESSION: &str = "session";
pub const CHANNEL_COMMANDS: &str = "commands";
pub const CHANNEL_METRICS: &str = "metrics";
pub const CHANNEL_EVENTS: &str = "events";

/// Channels whose events are only ever delivered to the owning user
pub const USER_SCOPED_CHANNELS: [&str; 2] = [CHANNEL_ONBOARDING, CHANNEL_BUDGETS];

// ============================================================================
// Event Type Constants
// ============================================================================

// Onboarding events
pub const ONBOARDING_STARTED: &str = "onboarding.started";
pub const ONBOARDING_SNAPSHOT: &str = "onboarding.snapshot";
pub const ONBOARDING_COMPLETED: &str = "onboarding.completed";
pub const ONBOARDING_CANCELLED: &str = "onboarding.cancelled";

// Budget events
pub const BUDGETS_CREATED: &str = "budgets.created";

// Session events
pub const SESSION_LOGOUT: &str = "session.logout";

// UI state snapshots
pub const COMMANDS_SNAPSHOT: &str = "commands.snapshot";
pub const METRICS_UPSERT: &str = "metrics.upsert";

// Stream control
pub const EVENTS_CURSOR: &str = "events.cursor";
pub const EVENTS_REPLAY_TRUNCATED: &str = "events.replay_truncated";

/// Type reported for payloads that match no known kind
pub const UNKNOWN: &str = "unknown";

// ============================================================================
// Event Envelope
// ============================================================================

/// Event envelope as stored in the log and sent over the wire.
///
/// `seq` is assigned by the sequencer at publish time and is absent before
/// that and on snapshot events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Caller-assigned identifier, unique across the log
    pub id: String,

    pub channel: String,

    /// Event type in dot notation
    #[serde(rename = "type")]
    pub event_type: String,

    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub payload: serde_json::Value,

    pub sent_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
}

impl Event {
    /// Create a new event from typed data.
    ///
    /// Channel and type are inferred from the data. The id is a fresh UUID v7.
    pub fn new(data: impl Into<EventData>) -> Self {
        let data = data.into();
        Self {
            id: Uuid::now_v7().to_string(),
            channel: data.channel().to_string(),
            event_type: data.event_type().to_string(),
            payload: data.to_payload(),
            sent_at: Utc::now(),
            seq: None,
        }
    }

    /// Create an event for an arbitrary channel/type pair
    pub fn raw(
        channel: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            channel: channel.into(),
            event_type: event_type.into(),
            payload,
            sent_at: Utc::now(),
            seq: None,
        }
    }

    /// Replace the id (idempotent publishers and tests)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the sequence number
    pub fn with_seq(mut self, seq: i64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// `payload.userId`, when the payload carries one
    pub fn user_id(&self) -> Option<&str> {
        self.payload.get("userId").and_then(|value| value.as_str())
    }

    /// Whether the event belongs to a single user
    pub fn is_user_scoped(&self) -> bool {
        USER_SCOPED_CHANNELS.contains(&self.channel.as_str()) || self.user_id().is_some()
    }

    /// Whether a connection with the given identity may see this event.
    ///
    /// Global events are visible to everyone. User-scoped events are visible
    /// only to the user named in the payload; a user-scoped event without a
    /// `userId` is visible to nobody.
    pub fn is_visible_to(&self, identity: Option<&str>) -> bool {
        if !self.is_user_scoped() {
            return true;
        }
        match (self.user_id(), identity) {
            (Some(owner), Some(identity)) => owner == identity,
            _ => false,
        }
    }

    /// Classify the payload into a typed kind
    pub fn data(&self) -> EventData {
        EventData::from_envelope(&self.event_type, &self.payload)
    }

    pub fn is_onboarding_event(&self) -> bool {
        self.event_type.starts_with("onboarding.")
    }
}

// ============================================================================
// Onboarding Event Data Types
// ============================================================================

/// Session state carried by `onboarding.started` and `onboarding.snapshot`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub session_id: Uuid,
    pub user_id: String,
    pub status: OnboardingStatus,
    pub current_step: OnboardingStep,
    pub draft: OnboardingDraft,

    /// Form to render for the current step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_spec: Option<BudgetOnboardingFormSpec>,
}

impl OnboardingState {
    pub fn from_session(session: &OnboardingSession) -> Self {
        Self {
            session_id: session.id,
            user_id: session.user_id.clone(),
            status: session.status,
            current_step: session.current_step,
            draft: session.draft.clone(),
            ui_spec: None,
        }
    }

    pub fn with_ui_spec(mut self, ui_spec: BudgetOnboardingFormSpec) -> Self {
        self.ui_spec = Some(ui_spec);
        self
    }
}

/// Data for onboarding.started event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(transparent)]
pub struct OnboardingStartedData(pub OnboardingState);

/// Data for onboarding.snapshot event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(transparent)]
pub struct OnboardingSnapshotData(pub OnboardingState);

/// Data for onboarding.completed event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct OnboardingCompletedData {
    pub session_id: Uuid,
    pub user_id: String,
    pub status: OnboardingStatus,
    pub current_step: OnboardingStep,
}

impl OnboardingCompletedData {
    pub fn from_session(session: &OnboardingSession) -> Self {
        Self {
            session_id: session.id,
            user_id: session.user_id.clone(),
            status: session.status,
            current_step: session.current_step,
        }
    }
}

/// Data for onboarding.cancelled event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct OnboardingCancelledData {
    pub session_id: Uuid,
    pub user_id: String,
    pub status: OnboardingStatus,
}

// ============================================================================
// Budget Event Data Types
// ============================================================================

/// Pay cycle fields embedded in `budgets.created`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct PayCycleSummary {
    pub pay_cycle_id: Uuid,
    pub cadence: PayCycleCadence,
    pub day: i32,
    pub timezone: String,
}

/// Data for budgets.created event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct BudgetCreatedData {
    pub budget_id: Uuid,
    pub user_id: String,
    pub name: String,
    pub pay_cycle: PayCycleSummary,
}

// ============================================================================
// Session, Command and Metric Event Data Types
// ============================================================================

/// Data for session.logout event (empty object on the wire)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(deny_unknown_fields)]
pub struct SessionLogoutData {}

/// Slash command as listed to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CommandInfo {
    pub name: String,
    pub description: String,
}

/// Data for commands.snapshot event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct CommandsSnapshotData {
    pub commands: Vec<CommandInfo>,
}

/// Data for metrics.upsert event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpsertData {
    pub metric_id: String,

    /// Renderable spec for the metric widget
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub spec: serde_json::Value,
}

// ============================================================================
// Stream Control Data Types
// ============================================================================

/// Data for events.cursor event: the latest allocated sequence number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(deny_unknown_fields)]
pub struct EventsCursorData {
    pub seq: i64,
}

/// Data for events.replay_truncated event.
///
/// Sent when the client's cursor is older than the retention horizon; events
/// up to `purged_through_seq` are gone and the client must resync from snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ReplayTruncatedData {
    pub last_seq: i64,
    pub purged_through_seq: i64,
}

// ============================================================================
// Event Data Enum
// ============================================================================

/// Typed event payload, one variant per known event type.
///
/// The mapping from type to data:
/// - `onboarding.started` → OnboardingStartedData
/// - `onboarding.snapshot` → OnboardingSnapshotData
/// - `onboarding.completed` → OnboardingCompletedData
/// - `onboarding.cancelled` → OnboardingCancelledData
/// - `budgets.created` → BudgetCreatedData
/// - `session.logout` → SessionLogoutData
/// - `commands.snapshot` → CommandsSnapshotData
/// - `metrics.upsert` → MetricsUpsertData
/// - `events.cursor` → EventsCursorData
/// - `events.replay_truncated` → ReplayTruncatedData
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum EventData {
    OnboardingStarted(OnboardingStartedData),
    OnboardingSnapshot(OnboardingSnapshotData),
    OnboardingCompleted(OnboardingCompletedData),
    OnboardingCancelled(OnboardingCancelledData),
    BudgetCreated(BudgetCreatedData),
    SessionLogout(SessionLogoutData),
    CommandsSnapshot(CommandsSnapshotData),
    MetricsUpsert(MetricsUpsertData),
    EventsCursor(EventsCursorData),
    ReplayTruncated(ReplayTruncatedData),

    /// Payload of an unknown kind, or one that failed to parse as its kind
    Raw(serde_json::Value),
}

impl EventData {
    /// Get the event type constant for this data
    pub fn event_type(&self) -> &'static str {
        match self {
            EventData::OnboardingStarted(_) => ONBOARDING_STARTED,
            EventData::OnboardingSnapshot(_) => ONBOARDING_SNAPSHOT,
            EventData::OnboardingCompleted(_) => ONBOARDING_COMPLETED,
            EventData::OnboardingCancelled(_) => ONBOARDING_CANCELLED,
            EventData::BudgetCreated(_) => BUDGETS_CREATED,
            EventData::SessionLogout(_) => SESSION_LOGOUT,
            EventData::CommandsSnapshot(_) => COMMANDS_SNAPSHOT,
            EventData::MetricsUpsert(_) => METRICS_UPSERT,
            EventData::EventsCursor(_) => EVENTS_CURSOR,
            EventData::ReplayTruncated(_) => EVENTS_REPLAY_TRUNCATED,
            EventData::Raw(_) => UNKNOWN,
        }
    }

    /// Get the channel for this data
    pub fn channel(&self) -> &'static str {
        match self {
            EventData::OnboardingStarted(_)
            | EventData::OnboardingSnapshot(_)
            | EventData::OnboardingCompleted(_)
            | EventData::OnboardingCancelled(_) => CHANNEL_ONBOARDING,
            EventData::BudgetCreated(_) => CHANNEL_BUDGETS,
            EventData::SessionLogout(_) => CHANNEL_SESSION,
            EventData::CommandsSnapshot(_) => CHANNEL_COMMANDS,
            EventData::MetricsUpsert(_) => CHANNEL_METRICS,
            EventData::EventsCursor(_) | EventData::ReplayTruncated(_) => CHANNEL_EVENTS,
            EventData::Raw(_) => UNKNOWN,
        }
    }

    /// Classify an envelope payload by its type string.
    ///
    /// Unknown types and payloads that do not fit their type's shape come back
    /// as `Raw` so consumers can still forward them.
    pub fn from_envelope(event_type: &str, payload: &serde_json::Value) -> Self {
        fn parse<T: serde::de::DeserializeOwned>(
            payload: &serde_json::Value,
            wrap: fn(T) -> EventData,
        ) -> EventData {
            serde_json::from_value(payload.clone())
                .map(wrap)
                .unwrap_or_else(|_| EventData::Raw(payload.clone()))
        }

        match event_type {
            ONBOARDING_STARTED => parse(payload, EventData::OnboardingStarted),
            ONBOARDING_SNAPSHOT => parse(payload, EventData::OnboardingSnapshot),
            ONBOARDING_COMPLETED => parse(payload, EventData::OnboardingCompleted),
            ONBOARDING_CANCELLED => parse(payload, EventData::OnboardingCancelled),
            BUDGETS_CREATED => parse(payload, EventData::BudgetCreated),
            SESSION_LOGOUT => parse(payload, EventData::SessionLogout),
            COMMANDS_SNAPSHOT => parse(payload, EventData::CommandsSnapshot),
            METRICS_UPSERT => parse(payload, EventData::MetricsUpsert),
            EVENTS_CURSOR => parse(payload, EventData::EventsCursor),
            EVENTS_REPLAY_TRUNCATED => parse(payload, EventData::ReplayTruncated),
            _ => EventData::Raw(payload.clone()),
        }
    }

    /// Serialize to the untyped envelope payload.
    ///
    /// The payload structs contain only string keys and plain values, so
    /// serialization cannot fail; a failure would yield `null`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl From<OnboardingStartedData> for EventData {
    fn from(data: OnboardingStartedData) -> Self {
        EventData::OnboardingStarted(data)
    }
}

impl From<OnboardingSnapshotData> for EventData {
    fn from(data: OnboardingSnapshotData) -> Self {
        EventData::OnboardingSnapshot(data)
    }
}

impl From<OnboardingCompletedData> for EventData {
    fn from(data: OnboardingCompletedData) -> Self {
        EventData::OnboardingCompleted(data)
    }
}

impl From<OnboardingCancelledData> for EventData {
    fn from(data: OnboardingCancelledData) -> Self {
        EventData::OnboardingCancelled(data)
    }
}

impl From<BudgetCreatedData> for EventData {
    fn from(data: BudgetCreatedData) -> Self {
        EventData::BudgetCreated(data)
    }
}

impl From<SessionLogoutData> for EventData {
    fn from(data: SessionLogoutData) -> Self {
        EventData::SessionLogout(data)
    }
}

impl From<CommandsSnapshotData> for EventData {
    fn from(data: CommandsSnapshotData) -> Self {
        EventData::CommandsSnapshot(data)
    }
}

impl From<MetricsUpsertData> for EventData {
    fn from(data: MetricsUpsertData) -> Self {
        EventData::MetricsUpsert(data)
    }
}

impl From<EventsCursorData> for EventData {
    fn from(data: EventsCursorData) -> Self {
        EventData::EventsCursor(data)
    }
}

impl From<ReplayTruncatedData> for EventData {
    fn from(data: ReplayTruncatedData) -> Self {
        EventData::ReplayTruncated(data)
    }
}

impl From<serde_json::Value> for EventData {
    fn from(data: serde_json::Value) -> Self {
        EventData::Raw(data)
    }
}
