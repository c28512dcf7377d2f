// Repository layer for PostgreSQL
// Decision: Sequence allocation is a single upsert-increment statement, so
// concurrent publishers (in any number of processes) never see the same value
// Decision: Uniqueness violations are converted to typed FlowlyErrors here, where
// the constraint name is still known

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flowly_core::{FlowlyError, OnboardingStatus, UpdateOnboardingSession};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::*;

const ACTIVE_SESSION_CONSTRAINT: &str = "one_active_onboarding_session_per_user";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run database migrations")?;
        tracing::info!("Database migrations applied");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Sequence counters
    // ============================================

    pub async fn next_seq(&self) -> Result<i64> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (name, seq)
            VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET seq = counters.seq + 1
            RETURNING seq
            "#,
        )
        .bind(EVENTS_COUNTER)
        .fetch_one(&self.pool)
        .await?;

        Ok(seq)
    }

    pub async fn current_seq(&self) -> Result<i64> {
        self.counter_value(EVENTS_COUNTER).await
    }

    pub async fn purged_through_seq(&self) -> Result<i64> {
        self.counter_value(EVENTS_PURGED_COUNTER).await
    }

    async fn counter_value(&self, name: &str) -> Result<i64> {
        let seq: Option<i64> = sqlx::query_scalar("SELECT seq FROM counters WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(seq.unwrap_or(0))
    }

    // ============================================
    // Events
    // ============================================

    pub async fn insert_event(&self, row: EventRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, seq, channel, event_type, payload, sent_at, stored_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&row.id)
        .bind(row.seq)
        .bind(&row.channel)
        .bind(&row.event_type)
        .bind(&row.payload)
        .bind(row.sent_at)
        .bind(row.stored_at)
        .execute(&self.pool)
        .await
        .map_err(|err| -> anyhow::Error {
            match unique_violation(&err).as_deref() {
                Some("events_pkey") => FlowlyError::duplicate_event(&row.id).into(),
                Some(_) => {
                    FlowlyError::conflict(format!("event seq {} already stored", row.seq)).into()
                }
                None => err.into(),
            }
        })?;

        Ok(())
    }

    pub async fn events_since(&self, last_seq: i64) -> Result<Vec<EventRow>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, seq, channel, event_type, payload, sent_at, stored_at
            FROM events
            WHERE seq > $1
            ORDER BY seq ASC
            "#,
        )
        .bind(last_seq)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Delete events stored before `older_than` and advance the purge watermark
    pub async fn purge_expired_events(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let purged: Vec<i64> =
            sqlx::query_scalar("DELETE FROM events WHERE stored_at < $1 RETURNING seq")
                .bind(older_than)
                .fetch_all(&mut *tx)
                .await?;

        if let Some(max_seq) = purged.iter().copied().max() {
            sqlx::query(
                r#"
                INSERT INTO counters (name, seq)
                VALUES ($1, $2)
                ON CONFLICT (name) DO UPDATE SET seq = GREATEST(counters.seq, EXCLUDED.seq)
                "#,
            )
            .bind(EVENTS_PURGED_COUNTER)
            .bind(max_seq)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(purged = purged.len(), "Purged expired events");
        Ok(purged.len() as u64)
    }

    // ============================================
    // Onboarding sessions
    // ============================================

    pub async fn find_active_session_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<OnboardingSessionRow>> {
        let row = sqlx::query_as::<_, OnboardingSessionRow>(
            r#"
            SELECT id, user_id, status, current_step, draft, created_at, updated_at, expires_at
            FROM onboarding_sessions
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_session_by_id(&self, id: Uuid) -> Result<Option<OnboardingSessionRow>> {
        let row = sqlx::query_as::<_, OnboardingSessionRow>(
            r#"
            SELECT id, user_id, status, current_step, draft, created_at, updated_at, expires_at
            FROM onboarding_sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn insert_session(&self, row: OnboardingSessionRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO onboarding_sessions
                (id, user_id, status, current_step, draft, created_at, updated_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(row.id)
        .bind(&row.user_id)
        .bind(&row.status)
        .bind(&row.current_step)
        .bind(&row.draft)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|err| -> anyhow::Error {
            match unique_violation(&err).as_deref() {
                Some(ACTIVE_SESSION_CONSTRAINT) => FlowlyError::conflict(format!(
                    "user {} already has an active onboarding session",
                    row.user_id
                ))
                .into(),
                _ => err.into(),
            }
        })?;

        Ok(())
    }

    pub async fn update_session(
        &self,
        id: Uuid,
        user_id: &str,
        update: &UpdateOnboardingSession,
        now: DateTime<Utc>,
    ) -> Result<Option<OnboardingSessionRow>> {
        let mut conn = self.pool.acquire().await?;
        update_session_on(&mut conn, id, user_id, update, now).await
    }

    /// Apply the completing session update and insert the budget pair in one
    /// transaction. Rolls back and returns `None` if the update matches nothing.
    pub async fn complete_session(
        &self,
        id: Uuid,
        user_id: &str,
        budget: BudgetRow,
        pay_cycle: PayCycleRow,
        update: &UpdateOnboardingSession,
        now: DateTime<Utc>,
    ) -> Result<Option<OnboardingSessionRow>> {
        let mut tx = self.pool.begin().await?;

        let Some(session) = update_session_on(&mut tx, id, user_id, update, now).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("INSERT INTO budgets (id, user_id, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(budget.id)
            .bind(&budget.user_id)
            .bind(&budget.name)
            .bind(budget.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO pay_cycles (id, user_id, budget_id, cadence, day, timezone, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(pay_cycle.id)
        .bind(&pay_cycle.user_id)
        .bind(pay_cycle.budget_id)
        .bind(&pay_cycle.cadence)
        .bind(pay_cycle.day)
        .bind(&pay_cycle.timezone)
        .bind(pay_cycle.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(session))
    }

    pub async fn expire_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE onboarding_sessions
            SET status = 'expired', updated_at = $1
            WHERE status = 'active' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ============================================
    // Budgets
    // ============================================

    pub async fn find_budget_by_id(&self, id: Uuid) -> Result<Option<BudgetRow>> {
        let row = sqlx::query_as::<_, BudgetRow>(
            "SELECT id, user_id, name, created_at FROM budgets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_budgets_by_user_id(&self, user_id: &str) -> Result<Vec<BudgetRow>> {
        let rows = sqlx::query_as::<_, BudgetRow>(
            r#"
            SELECT id, user_id, name, created_at
            FROM budgets
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_pay_cycle_by_budget_id(&self, budget_id: Uuid) -> Result<Option<PayCycleRow>> {
        let row = sqlx::query_as::<_, PayCycleRow>(
            r#"
            SELECT id, user_id, budget_id, cadence, day, timezone, created_at
            FROM pay_cycles
            WHERE budget_id = $1
            "#,
        )
        .bind(budget_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

/// Conditional session update on any connection (pool or transaction).
///
/// Matches on `(id, user_id)` plus the expected status when one is given.
async fn update_session_on(
    conn: &mut sqlx::PgConnection,
    id: Uuid,
    user_id: &str,
    update: &UpdateOnboardingSession,
    now: DateTime<Utc>,
) -> Result<Option<OnboardingSessionRow>> {
    let draft = update
        .draft
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .context("serialize onboarding draft")?;

    let row = sqlx::query_as::<_, OnboardingSessionRow>(
        r#"
        UPDATE onboarding_sessions
        SET status = COALESCE($3, status),
            current_step = COALESCE($4, current_step),
            draft = COALESCE($5, draft),
            updated_at = $6
        WHERE id = $1
          AND user_id = $2
          AND ($7::TEXT IS NULL OR status = $7)
        RETURNING id, user_id, status, current_step, draft, created_at, updated_at, expires_at
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(update.status.map(|status| status.as_str()))
    .bind(update.current_step.map(|step| step.as_str()))
    .bind(draft)
    .bind(now)
    .bind(update.expected_status.as_ref().map(OnboardingStatus::as_str))
    .fetch_optional(conn)
    .await
    .map_err(|err| -> anyhow::Error {
        match unique_violation(&err).as_deref() {
            Some(ACTIVE_SESSION_CONSTRAINT) => FlowlyError::update_conflict(format!(
                "user {user_id} already has an active onboarding session"
            ))
            .into(),
            _ => err.into(),
        }
    })?;

    Ok(row)
}

/// Constraint name of a unique violation, if `err` is one
fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}
