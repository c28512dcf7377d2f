// Chat command routing for budget onboarding
//
// Decides whether a chat message is ours to answer: a form submit, a slash
// command, a natural-language "start a budget" request, or plain text from a
// user mid-onboarding. Anything else is reported as unhandled so the caller can
// hand it to the general assistant.

use flowly_core::events::{CommandInfo, CommandsSnapshotData, SessionLogoutData};
use flowly_core::{build_budget_onboarding_form_spec, BudgetOnboardingFormSpec, Event, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use utoipa::ToSchema;
use uuid::Uuid;

use super::event_bus::EventBus;
use super::onboarding::{BudgetBasicsInput, OnboardingService};

pub const START_REPLY: &str = "Starting budget onboarding. Let's set up your budget.";
pub const SUBMITTED_REPLY: &str = "Budget created. Next we can set up pools and categories.";
pub const LOGOUT_REPLY: &str = "Signing out…";
pub const NEW_USAGE_REPLY: &str = "Usage: /new budget";
pub const MISSING_USER_START_REPLY: &str =
    "Unable to start budget onboarding: missing user context.";
pub const MISSING_USER_SUBMIT_REPLY: &str =
    "Unable to submit budget onboarding: missing user context.";

static BUDGET_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbudget\b").expect("valid budget regex"));
static START_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(new|create|start|setup|set up|make|begin)\b")
        .expect("valid start verb regex")
});

/// A parsed `/command args` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    pub command: String,
    pub args: String,
}

/// Split `/command rest of line` into its name and trimmed arguments
pub fn parse_slash_command(text: &str) -> Option<SlashCommand> {
    let rest = text.trim().strip_prefix('/')?;
    let (command, args) = match rest.split_once(' ') {
        Some((command, args)) => (command, args.trim()),
        None => (rest, ""),
    };

    Some(SlashCommand {
        command: command.to_string(),
        args: args.to_string(),
    })
}

/// Whether free text asks to start a budget ("let's create a new budget")
pub fn is_budget_start_intent(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && BUDGET_WORD.is_match(text) && START_VERB.is_match(text)
}

/// Chat message routed to the command layer
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Latest user message text
    #[serde(default)]
    pub text: Option<String>,
    /// Onboarding form submission
    #[serde(default)]
    pub submit: Option<FormSubmission>,
}

/// Budget onboarding form submission
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmission {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub basics: BudgetBasicsInput,
}

/// Onboarding form attached to a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormAttachment {
    pub session_id: Uuid,
    pub spec: BudgetOnboardingFormSpec,
}

/// Assistant reply produced by a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<FormAttachment>,
}

impl CommandReply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            form: None,
        }
    }

    fn with_form(text: impl Into<String>, session_id: Uuid, spec: BudgetOnboardingFormSpec) -> Self {
        Self {
            text: text.into(),
            form: Some(FormAttachment { session_id, spec }),
        }
    }
}

/// Outcome of routing one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    /// False when the message should go to the general assistant instead
    pub handled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<CommandReply>,
}

impl CommandOutcome {
    pub fn unhandled() -> Self {
        Self {
            handled: false,
            reply: None,
        }
    }

    fn reply(reply: CommandReply) -> Self {
        Self {
            handled: true,
            reply: Some(reply),
        }
    }
}

/// Registered slash commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    New,
    Logout,
}

struct RegisteredCommand {
    name: &'static str,
    description: &'static str,
    kind: CommandKind,
}

const COMMANDS: [RegisteredCommand; 2] = [
    RegisteredCommand {
        name: "new",
        description: "Create new resources (e.g. /new budget)",
        kind: CommandKind::New,
    },
    RegisteredCommand {
        name: "logout",
        description: "Sign out of Flowly",
        kind: CommandKind::Logout,
    },
];

pub struct CommandRouter {
    onboarding: Arc<OnboardingService>,
    bus: Arc<EventBus>,
}

impl CommandRouter {
    pub fn new(onboarding: Arc<OnboardingService>, bus: Arc<EventBus>) -> Self {
        Self { onboarding, bus }
    }

    /// Slash commands as listed to clients
    pub fn list(&self) -> Vec<CommandInfo> {
        COMMANDS
            .iter()
            .map(|command| CommandInfo {
                name: command.name.to_string(),
                description: command.description.to_string(),
            })
            .collect()
    }

    /// Snapshot event listing the slash commands
    pub fn snapshot(&self) -> Event {
        Event::new(CommandsSnapshotData {
            commands: self.list(),
        })
    }

    /// Route one chat message.
    ///
    /// Domain failures become reply text; storage failures come back as errors.
    pub async fn handle(
        &self,
        user_id: Option<&str>,
        request: &CommandRequest,
    ) -> Result<CommandOutcome> {
        let user_id = user_id.map(str::trim).filter(|id| !id.is_empty());

        if let Some(submission) = &request.submit {
            return Ok(CommandOutcome::reply(self.submit(user_id, submission).await?));
        }

        let text = request.text.as_deref().unwrap_or_default();

        if let Some(slash) = parse_slash_command(text) {
            let Some(command) = COMMANDS.iter().find(|c| c.name == slash.command) else {
                return Ok(CommandOutcome::unhandled());
            };
            let reply = match command.kind {
                CommandKind::New => self.new_command(user_id, &slash.args).await?,
                CommandKind::Logout => self.logout().await?,
            };
            return Ok(CommandOutcome::reply(reply));
        }

        if is_budget_start_intent(text) {
            return Ok(CommandOutcome::reply(self.start(user_id).await?));
        }

        // Plain text mid-onboarding resumes the form
        if let Some(user_id) = user_id {
            if self.onboarding.active_session(user_id).await?.is_some() {
                return Ok(CommandOutcome::reply(self.start(Some(user_id)).await?));
            }
        }

        Ok(CommandOutcome::unhandled())
    }

    async fn new_command(&self, user_id: Option<&str>, args: &str) -> Result<CommandReply> {
        if !args.trim().eq_ignore_ascii_case("budget") {
            return Ok(CommandReply::text(NEW_USAGE_REPLY));
        }
        self.start(user_id).await
    }

    async fn start(&self, user_id: Option<&str>) -> Result<CommandReply> {
        let Some(user_id) = user_id else {
            return Ok(CommandReply::text(MISSING_USER_START_REPLY));
        };

        match self.onboarding.start(user_id).await {
            Ok(session) => Ok(CommandReply::with_form(
                START_REPLY,
                session.id,
                build_budget_onboarding_form_spec(session.id, &session.draft),
            )),
            Err(e) if e.is_user_facing() => Ok(CommandReply::text(format!(
                "Couldn't start budget onboarding yet: {e}"
            ))),
            Err(e) => Err(e),
        }
    }

    async fn submit(
        &self,
        user_id: Option<&str>,
        submission: &FormSubmission,
    ) -> Result<CommandReply> {
        let Some(user_id) = user_id else {
            return Ok(CommandReply::text(MISSING_USER_SUBMIT_REPLY));
        };

        match self
            .onboarding
            .submit(user_id, submission.session_id, &submission.basics)
            .await
        {
            Ok(_) => Ok(CommandReply::text(SUBMITTED_REPLY)),
            Err(e) if e.is_user_facing() => {
                tracing::debug!(
                    session_id = %submission.session_id,
                    error = %e,
                    "Onboarding submit rejected"
                );
                Ok(CommandReply::with_form(
                    format!("Couldn't create the budget yet: {e}"),
                    submission.session_id,
                    build_budget_onboarding_form_spec(
                        submission.session_id,
                        &submission.basics.as_draft(),
                    ),
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn logout(&self) -> Result<CommandReply> {
        self.bus.publish(Event::new(SessionLogoutData::default())).await?;
        Ok(CommandReply::text(LOGOUT_REPLY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use flowly_core::events::SESSION_LOGOUT;
    use flowly_core::{
        Budget, FlowlyError, OnboardingSession, OnboardingStore, PayCycle,
        UpdateOnboardingSession,
    };
    use flowly_storage::StorageBackend;

    fn router_with(sessions: Arc<dyn OnboardingStore>) -> (CommandRouter, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(Arc::new(StorageBackend::in_memory())));
        let onboarding = Arc::new(OnboardingService::new(
            sessions,
            bus.clone(),
            chrono::Duration::days(7),
        ));
        (CommandRouter::new(onboarding, bus.clone()), bus)
    }

    fn router() -> (CommandRouter, Arc<EventBus>) {
        router_with(Arc::new(StorageBackend::in_memory()))
    }

    fn submission(session_id: Uuid, day: i32) -> CommandRequest {
        CommandRequest {
            text: None,
            submit: Some(FormSubmission {
                session_id,
                basics: BudgetBasicsInput {
                    name: "Groceries".to_string(),
                    cadence: "monthly".to_string(),
                    day,
                    timezone: "UTC".to_string(),
                },
            }),
        }
    }

    fn text(text: &str) -> CommandRequest {
        CommandRequest {
            text: Some(text.to_string()),
            submit: None,
        }
    }

    fn reply_text(outcome: &CommandOutcome) -> &str {
        &outcome.reply.as_ref().unwrap().text
    }

    #[test]
    fn test_parse_slash_command() {
        assert_eq!(
            parse_slash_command("  /new   budget "),
            Some(SlashCommand {
                command: "new".to_string(),
                args: "budget".to_string()
            })
        );
        assert_eq!(
            parse_slash_command("/logout"),
            Some(SlashCommand {
                command: "logout".to_string(),
                args: String::new()
            })
        );
        assert_eq!(parse_slash_command("new budget"), None);
    }

    #[test]
    fn test_start_intent() {
        assert!(is_budget_start_intent("Can you help me set up a budget?"));
        assert!(is_budget_start_intent("CREATE BUDGET"));
        assert!(is_budget_start_intent("let's begin my budget"));
        assert!(!is_budget_start_intent("what is a budget"));
        assert!(!is_budget_start_intent("start budgeting"));
        assert!(!is_budget_start_intent("   "));
    }

    #[test]
    fn test_registry_listing() {
        let (router, _) = router();
        let names: Vec<String> = router.list().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["new", "logout"]);
        assert_eq!(router.snapshot().payload["commands"][1]["description"], "Sign out of Flowly");
    }

    #[tokio::test]
    async fn test_new_budget_starts_onboarding() {
        let (router, bus) = router();
        let outcome = router.handle(Some("u1"), &text("/new budget")).await.unwrap();

        assert!(outcome.handled);
        assert_eq!(reply_text(&outcome), START_REPLY);
        let form = outcome.reply.unwrap().form.unwrap();
        assert_eq!(form.spec.props().unwrap().session_id, form.session_id);
        assert_eq!(bus.current_seq().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_new_with_other_target_shows_usage() {
        let (router, _) = router();
        let outcome = router.handle(Some("u1"), &text("/new pool")).await.unwrap();
        assert_eq!(reply_text(&outcome), NEW_USAGE_REPLY);
    }

    #[tokio::test]
    async fn test_unknown_slash_is_unhandled() {
        let (router, _) = router();
        let outcome = router.handle(Some("u1"), &text("/help")).await.unwrap();
        assert_eq!(outcome, CommandOutcome::unhandled());
    }

    #[tokio::test]
    async fn test_missing_user_context() {
        let (router, _) = router();
        let outcome = router.handle(None, &text("/new budget")).await.unwrap();
        assert_eq!(reply_text(&outcome), MISSING_USER_START_REPLY);

        let outcome = router.handle(Some("  "), &text("create a budget")).await.unwrap();
        assert_eq!(reply_text(&outcome), MISSING_USER_START_REPLY);
    }

    #[tokio::test]
    async fn test_logout_publishes_global_event() {
        let (router, bus) = router();
        let outcome = router.handle(None, &text("/logout")).await.unwrap();
        assert_eq!(reply_text(&outcome), LOGOUT_REPLY);

        let events = bus.events_since(0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, SESSION_LOGOUT);
        assert!(events[0].is_visible_to(None));
    }

    #[tokio::test]
    async fn test_plain_text_resumes_active_session() {
        let (router, _) = router();
        assert_eq!(
            router.handle(Some("u1"), &text("hello")).await.unwrap(),
            CommandOutcome::unhandled()
        );

        router.handle(Some("u1"), &text("/new budget")).await.unwrap();
        let outcome = router.handle(Some("u1"), &text("hello")).await.unwrap();
        assert_eq!(reply_text(&outcome), START_REPLY);
    }

    #[tokio::test]
    async fn test_submit_failure_rerenders_form() {
        let (router, _) = router();
        let started = router.handle(Some("u1"), &text("/new budget")).await.unwrap();
        let session_id = started.reply.unwrap().form.unwrap().session_id;

        let request = submission(session_id, 31);
        let outcome = router.handle(Some("u1"), &request).await.unwrap();
        let reply = outcome.reply.unwrap();

        assert_eq!(
            reply.text,
            "Couldn't create the budget yet: Monthly pay cycle day must be between 1 and 28."
        );
        let props = reply.form.unwrap().spec.props().unwrap().clone();
        assert_eq!(props.day, 31);
        assert_eq!(props.name, "Groceries");

        let outcome = router
            .handle(Some("u1"), &submission(session_id, 15))
            .await
            .unwrap();
        assert_eq!(reply_text(&outcome), SUBMITTED_REPLY);
    }

    #[tokio::test]
    async fn test_submit_without_user() {
        let (router, _) = router();
        let request = submission(Uuid::now_v7(), 15);
        let outcome = router.handle(None, &request).await.unwrap();
        assert_eq!(reply_text(&outcome), MISSING_USER_SUBMIT_REPLY);
    }

    /// Session store whose budget write always fails
    struct FailingCompletion(StorageBackend);

    #[async_trait]
    impl OnboardingStore for FailingCompletion {
        async fn find_active_session_by_user_id(
            &self,
            user_id: &str,
        ) -> flowly_core::Result<Option<OnboardingSession>> {
            self.0.find_active_session_by_user_id(user_id).await
        }
        async fn find_session_by_id(
            &self,
            id: Uuid,
        ) -> flowly_core::Result<Option<OnboardingSession>> {
            self.0.find_session_by_id(id).await
        }
        async fn insert_session(&self, session: &OnboardingSession) -> flowly_core::Result<()> {
            self.0.insert_session(session).await
        }
        async fn update_session(
            &self,
            id: Uuid,
            user_id: &str,
            update: UpdateOnboardingSession,
        ) -> flowly_core::Result<Option<OnboardingSession>> {
            self.0.update_session(id, user_id, update).await
        }
        async fn complete_session(
            &self,
            _id: Uuid,
            _user_id: &str,
            _budget: &Budget,
            _pay_cycle: &PayCycle,
            _update: UpdateOnboardingSession,
        ) -> flowly_core::Result<Option<OnboardingSession>> {
            Err(FlowlyError::storage("relation \"budgets\" does not exist"))
        }
        async fn expire_sessions(&self, now: DateTime<Utc>) -> flowly_core::Result<u64> {
            self.0.expire_sessions(now).await
        }
    }

    #[tokio::test]
    async fn test_submit_storage_failure_is_not_a_reply() {
        let (router, bus) = router_with(Arc::new(FailingCompletion(StorageBackend::in_memory())));
        let started = router.handle(Some("u1"), &text("/new budget")).await.unwrap();
        let session_id = started.reply.unwrap().form.unwrap().session_id;

        let err = router
            .handle(Some("u1"), &submission(session_id, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowlyError::Storage(_)));
        assert!(!err.is_user_facing());

        // Only onboarding.started was published
        assert_eq!(bus.current_seq().await.unwrap(), 1);
    }
}
