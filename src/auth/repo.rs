//! User-record and API-key storage collaborator.
//!
//! The orchestrator only sees the [`UserStore`] trait; `PgUserStore` is the
//! production implementation. Email uniqueness is enforced by the storage
//! layer and surfaces as [`CreateUserOutcome::DuplicateEmail`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::models::{ApiKeyRecord, NewApiKey, NewUser, Role, User, UserStatus};

#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(Uuid),
    DuplicateEmail,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Create a `pending` user with its verification-token hash in one step.
    async fn create(&self, new_user: NewUser) -> Result<CreateUserOutcome>;

    /// Consume an unexpired verification token in a single atomic statement:
    /// flips the user to verified/active and clears the token fields so the
    /// token is unusable afterwards. Returns the user id on a match.
    async fn consume_verification_token(&self, token_hash: &str) -> Result<Option<Uuid>>;

    async fn record_failed_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<()>;

    async fn record_successful_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<()>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    async fn insert_api_key(&self, new_key: NewApiKey) -> Result<ApiKeyRecord>;

    /// Active keys with their hashes, for presented-key verification.
    async fn list_active_api_keys(&self) -> Result<Vec<ApiKeyRecord>>;

    /// Best-effort last-used bump; callers ignore failures.
    async fn touch_api_key(&self, id: Uuid) -> Result<()>;
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

const USER_COLUMNS: &str = r"
    id, name, email, password_hash, roles, status, is_email_verified,
    verify_email_token_hash,
    EXTRACT(EPOCH FROM verify_email_token_expires)::BIGINT AS verify_email_token_expires_unix,
    login_attempts,
    EXTRACT(EPOCH FROM last_login_at)::BIGINT AS last_login_at_unix,
    last_login_ip
";

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User> {
    let roles: Vec<String> = row.get("roles");
    let roles = roles
        .iter()
        .map(|role| Role::parse(role).with_context(|| format!("unknown role: {role}")))
        .collect::<Result<Vec<_>>>()?;

    let status: String = row.get("status");
    let status =
        UserStatus::parse(&status).with_context(|| format!("unknown user status: {status}"))?;

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        roles,
        status,
        is_email_verified: row.get("is_email_verified"),
        verify_email_token_hash: row.get("verify_email_token_hash"),
        verify_email_token_expires: row.get("verify_email_token_expires_unix"),
        login_attempts: row.get("login_attempts"),
        last_login_at: row.get("last_login_at_unix"),
        last_login_ip: row.get("last_login_ip"),
    })
}

fn api_key_from_row(row: &sqlx::postgres::PgRow) -> ApiKeyRecord {
    ApiKeyRecord {
        id: row.get("id"),
        key_hash: row.get("key_hash"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        permissions: row.get("permissions"),
        is_active: row.get("is_active"),
        expires_at: row.get("expires_at_unix"),
        last_used_at: row.get("last_used_at_unix"),
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create(&self, new_user: NewUser) -> Result<CreateUserOutcome> {
        let query = r"
            INSERT INTO users
                (name, email, password_hash, roles, status,
                 verify_email_token_hash, verify_email_token_expires)
            VALUES ($1, $2, $3, $4, 'pending', $5, to_timestamp($6))
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let roles: Vec<String> = new_user
            .roles
            .iter()
            .map(|role| role.as_str().to_string())
            .collect();
        let row = sqlx::query(query)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .bind(&roles)
            .bind(&new_user.verify_email_token_hash)
            .bind(new_user.verify_email_token_expires)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(CreateUserOutcome::Created(row.get("id"))),
            Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::DuplicateEmail),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn consume_verification_token(&self, token_hash: &str) -> Result<Option<Uuid>> {
        // Single statement: matching and consuming cannot be interleaved, so
        // a token can only ever activate one request's view of the user.
        let query = r"
            UPDATE users
            SET is_email_verified = TRUE,
                email_verified_at = NOW(),
                status = 'active',
                verify_email_token_hash = NULL,
                verify_email_token_expires = NULL
            WHERE verify_email_token_hash = $1
              AND verify_email_token_expires > NOW()
            RETURNING id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume verification token")?;

        Ok(row.map(|row| row.get("id")))
    }

    async fn record_failed_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<()> {
        let query = r"
            UPDATE users
            SET login_attempts = login_attempts + 1,
                login_status = 'failure',
                last_login_ip = $2
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(ip)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record failed login")?;

        Ok(())
    }

    async fn record_successful_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<()> {
        let query = r"
            UPDATE users
            SET login_attempts = 0,
                login_status = 'success',
                last_login_at = NOW(),
                last_login_ip = $2
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(ip)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record successful login")?;

        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password")?;

        Ok(())
    }

    async fn insert_api_key(&self, new_key: NewApiKey) -> Result<ApiKeyRecord> {
        let id = Uuid::new_v4();
        let query = r"
            INSERT INTO api_keys
                (id, key_hash, user_id, name, permissions, is_active, expires_at)
            VALUES ($1, $2, $3, $4, $5, TRUE, to_timestamp($6))
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(&new_key.key_hash)
            .bind(new_key.user_id)
            .bind(&new_key.name)
            .bind(&new_key.permissions)
            .bind(new_key.expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert api key")?;

        Ok(ApiKeyRecord {
            id,
            key_hash: new_key.key_hash,
            user_id: new_key.user_id,
            name: new_key.name,
            permissions: new_key.permissions,
            is_active: true,
            expires_at: new_key.expires_at,
            last_used_at: None,
        })
    }

    async fn list_active_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        let query = r"
            SELECT id, key_hash, user_id, name, permissions, is_active,
                   EXTRACT(EPOCH FROM expires_at)::BIGINT AS expires_at_unix,
                   EXTRACT(EPOCH FROM last_used_at)::BIGINT AS last_used_at_unix
            FROM api_keys
            WHERE is_active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list api keys")?;

        Ok(rows.iter().map(api_key_from_row).collect())
    }

    async fn touch_api_key(&self, id: Uuid) -> Result<()> {
        let query = "UPDATE api_keys SET last_used_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch api key")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
