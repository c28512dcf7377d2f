// Live event stream for one client connection
//
// Subscribe first, then emit snapshots, replay from the client's cursor, flush
// whatever arrived on the subscription meanwhile, and forward live events.
// Every sequenced event passes the same rule: skip anything at or below the
// highest seq already seen, and skip user-scoped events for other users. That
// keeps delivered seqs strictly increasing with no gap from the cursor onward.
//
// Decision: The subscription lives in the stream state, so dropping the stream
//           (client gone, startup failure, completion) always unsubscribes
// Decision: The cursor frame's SSE id is the resume point, not the head, so a
//           reconnect mid-replay resumes where delivery actually stopped

use flowly_core::events::{
    EventsCursorData, OnboardingSnapshotData, OnboardingState, ReplayTruncatedData,
};
use flowly_core::{build_budget_onboarding_form_spec, Event, Result};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;

use super::commands::CommandRouter;
use super::event_bus::{EventBus, Subscription};
use super::metrics::MetricsRegistry;
use super::onboarding::OnboardingService;

/// One frame of a live stream
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Event to deliver; `id` becomes the SSE id when set
    Event { event: Event, id: Option<i64> },
    /// Terminal failure; the stream ends after this frame
    Error { message: String },
}

impl Frame {
    fn snapshot(event: Event) -> Self {
        Frame::Event { event, id: None }
    }

    fn sequenced(event: Event) -> Self {
        let id = event.seq;
        Frame::Event { event, id }
    }

    /// The event carried by this frame, if any
    pub fn event(&self) -> Option<&Event> {
        match self {
            Frame::Event { event, .. } => Some(event),
            Frame::Error { .. } => None,
        }
    }
}

#[derive(Clone)]
pub struct LiveStreamService {
    bus: Arc<EventBus>,
    onboarding: Arc<OnboardingService>,
    commands: Arc<CommandRouter>,
    metrics: Arc<MetricsRegistry>,
}

impl LiveStreamService {
    pub fn new(
        bus: Arc<EventBus>,
        onboarding: Arc<OnboardingService>,
        commands: Arc<CommandRouter>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            bus,
            onboarding,
            commands,
            metrics,
        }
    }

    /// Open a stream for a connection.
    ///
    /// The bus subscription is taken before this returns, so nothing published
    /// from here on can fall between replay and live delivery.
    pub fn connect(
        &self,
        identity: Option<String>,
        cursor: Option<i64>,
    ) -> impl Stream<Item = Frame> + Send + 'static {
        let connection = Connection {
            subscription: self.bus.subscribe(),
            service: self.clone(),
            identity,
            cursor,
            high_water: 0,
            started: false,
        };

        tracing::debug!(
            subscriber_id = connection.subscription.id(),
            identity = ?connection.identity,
            cursor = ?connection.cursor,
            "Event stream connected"
        );

        stream::unfold(Some(connection), |connection| async move {
            let mut connection = connection?;

            if !connection.started {
                connection.started = true;
                return match connection.startup().await {
                    Ok(frames) => Some((frames, Some(connection))),
                    Err(e) => {
                        tracing::error!("Failed to start event stream: {}", e);
                        let message = if e.is_user_facing() {
                            e.to_string()
                        } else {
                            "Failed to start event stream".to_string()
                        };
                        Some((vec![Frame::Error { message }], None))
                    }
                };
            }

            loop {
                let event = connection.subscription.recv().await?;
                if let Some(frame) = connection.accept(event) {
                    return Some((vec![frame], Some(connection)));
                }
            }
        })
        .flat_map(stream::iter)
    }
}

struct Connection {
    service: LiveStreamService,
    subscription: Subscription,
    identity: Option<String>,
    cursor: Option<i64>,
    /// Highest seq already delivered or skipped
    high_water: i64,
    started: bool,
}

impl Connection {
    /// Snapshots, then replay from the cursor
    async fn startup(&mut self) -> Result<Vec<Frame>> {
        let bus = self.service.bus.clone();
        let head = bus.current_seq().await?;

        // Published after subscribe; may carry seqs at or below the head
        let pending: Vec<Event> = std::iter::from_fn(|| self.subscription.try_recv()).collect();
        let first_pending = pending.iter().filter_map(|event| event.seq).min();

        // A cursor past the head means the log was reset; resume from the head
        let resume = match self.cursor {
            Some(cursor) if cursor > head => {
                tracing::warn!(cursor, head, "Client cursor ahead of event log");
                head
            }
            Some(cursor) => cursor,
            None => first_pending.map_or(head, |seq| head.min(seq - 1)),
        };
        // Only replay raises the mark; a fresh client gets everything buffered
        self.high_water = if self.cursor.is_some() { resume } else { 0 };

        let mut frames = vec![Frame::Event {
            event: Event::new(EventsCursorData { seq: head }),
            id: Some(resume),
        }];

        if let Some(user_id) = self.identity.as_deref() {
            if let Some(session) = self.service.onboarding.active_session(user_id).await? {
                let state = OnboardingState::from_session(&session).with_ui_spec(
                    build_budget_onboarding_form_spec(session.id, &session.draft),
                );
                frames.push(Frame::snapshot(Event::new(OnboardingSnapshotData(state))));
            }
        }

        frames.push(Frame::snapshot(self.service.commands.snapshot()));
        frames.extend(self.service.metrics.snapshots().into_iter().map(Frame::snapshot));

        let Some(cursor) = self.cursor else {
            frames.extend(pending.into_iter().filter_map(|event| self.accept(event)));
            return Ok(frames);
        };

        let purged_through_seq = bus.purged_through_seq().await?;
        if cursor < purged_through_seq {
            frames.push(Frame::snapshot(Event::new(ReplayTruncatedData {
                last_seq: cursor,
                purged_through_seq,
            })));
        }

        let replay = bus.events_since(resume).await?;
        let replayed = replay.len();
        frames.extend(
            replay
                .into_iter()
                .chain(pending)
                .filter_map(|event| self.accept(event)),
        );

        tracing::debug!(
            cursor,
            replayed,
            high_water = self.high_water,
            "Event stream replay complete"
        );
        Ok(frames)
    }

    /// Dedup and filter one sequenced event
    fn accept(&mut self, event: Event) -> Option<Frame> {
        if let Some(seq) = event.seq {
            if seq <= self.high_water {
                return None;
            }
            self.high_water = seq;
        }

        if !event.is_visible_to(self.identity.as_deref()) {
            return None;
        }
        Some(Frame::sequenced(event))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        tracing::debug!(
            subscriber_id = self.subscription.id(),
            "Event stream disconnected"
        );
    }
}
