//! Best-effort audit trail for login attempts.
//!
//! Recording is never transactional with the login decision; a failed insert
//! is logged and swallowed by the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::models::LoginOutcome;

/// One login attempt, successful or not.
#[derive(Clone, Debug)]
pub struct LoginAttempt<'a> {
    pub user_id: Option<Uuid>,
    pub ip: Option<&'a str>,
    pub email: &'a str,
    pub outcome: LoginOutcome,
    pub reason: &'a str,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record_login_attempt(&self, attempt: LoginAttempt<'_>) -> Result<()>;
}

pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn record_login_attempt(&self, attempt: LoginAttempt<'_>) -> Result<()> {
        let query = r"
            INSERT INTO login_events (user_id, ip, email, outcome, reason)
            VALUES ($1, $2, $3, $4, $5)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(attempt.user_id)
            .bind(attempt.ip)
            .bind(attempt.email)
            .bind(attempt.outcome.as_str())
            .bind(attempt.reason)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login attempt")?;

        Ok(())
    }
}
