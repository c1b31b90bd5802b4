//! Auth orchestrator: the state machine behind every endpoint.
//!
//! `register` creates a `pending` user and issues a verification token;
//! `verify_email` flips the account to `active`; `login` checks credentials
//! and mints one access and one refresh token, whitelisting the refresh jti
//! before the pair leaves the process; `refresh` re-validates signature,
//! expiry, and whitelist membership; `logout` revokes; the forgot/reset pair
//! runs the one-time reset-token protocol.
//!
//! Collaborators arrive as constructor dependencies, never as ambient
//! globals, and all cross-request coordination lives in the key-value store.

use anyhow::anyhow;
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::audit::{AuditLog, LoginAttempt};
use crate::auth::error::AuthError;
use crate::auth::models::{ApiKeyRecord, LoginOutcome, NewApiKey, NewUser, Role};
use crate::auth::password;
use crate::auth::repo::{CreateUserOutcome, UserStore};
use crate::auth::token_store::TokenStore;
use crate::auth::tokens::{Claims, TokenSigner};
use crate::auth::unix_now;
use crate::mail::MailSender;

const DEFAULT_VERIFICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_RESET_TTL: Duration = Duration::from_secs(15 * 60);

/// Tunables for the orchestrator.
#[derive(Clone, Debug)]
pub struct AuthOptions {
    public_base_url: String,
    verification_ttl: Duration,
    reset_ttl: Duration,
}

impl AuthOptions {
    #[must_use]
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url,
            verification_ttl: DEFAULT_VERIFICATION_TTL,
            reset_ttl: DEFAULT_RESET_TTL,
        }
    }

    #[must_use]
    pub fn with_verification_ttl(mut self, ttl: Duration) -> Self {
        self.verification_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_reset_ttl(mut self, ttl: Duration) -> Self {
        self.reset_ttl = ttl;
        self
    }

    fn link(&self, path: &str, raw_token: &str) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        format!("{base}{path}?token={raw_token}")
    }
}

/// Both tokens returned by a successful login.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Raw key plus its stored record; the raw value exists only in this reply.
#[derive(Clone, Debug)]
pub struct ApiKeyCreated {
    pub api_key: String,
    pub record: ApiKeyRecord,
}

/// Caller input for API-key creation.
#[derive(Clone, Debug, Default)]
pub struct ApiKeyRequest {
    pub name: Option<String>,
    pub permissions: Vec<String>,
    pub expires_at: Option<i64>,
}

/// Admit callers holding at least one of the allowed roles.
///
/// # Errors
///
/// Returns [`AuthError::Forbidden`] otherwise.
pub fn authorize(claims: &Claims, allowed: &[Role]) -> Result<(), AuthError> {
    if claims.roles.iter().any(|role| allowed.contains(role)) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

/// Random one-time token with 256 bits of entropy, base64url encoded.
fn generate_one_time_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| AuthError::Internal(anyhow!("failed to generate token: {err}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a one-time token; only this form is ever stored on the user record.
fn hash_one_time_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// Argon2 is deliberately expensive; keep it off the async executor.
async fn hash_blocking(secret: String) -> Result<String, AuthError> {
    let hash = tokio::task::spawn_blocking(move || password::hash_secret(&secret))
        .await
        .map_err(|err| AuthError::Internal(anyhow!("hashing task failed: {err}")))??;
    Ok(hash)
}

async fn verify_blocking(stored_hash: String, candidate: String) -> Result<bool, AuthError> {
    let matches = tokio::task::spawn_blocking(move || {
        password::verify_secret(&stored_hash, &candidate)
    })
    .await
    .map_err(|err| AuthError::Internal(anyhow!("hashing task failed: {err}")))??;
    Ok(matches)
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    audit: Arc<dyn AuditLog>,
    tokens: TokenSigner,
    store: TokenStore,
    mail: Arc<dyn MailSender>,
    options: AuthOptions,
}

impl AuthService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        audit: Arc<dyn AuditLog>,
        tokens: TokenSigner,
        store: TokenStore,
        mail: Arc<dyn MailSender>,
        options: AuthOptions,
    ) -> Self {
        Self {
            users,
            audit,
            tokens,
            store,
            mail,
            options,
        }
    }

    /// Create a `pending` user and hand the verification link to delivery.
    ///
    /// # Errors
    ///
    /// `Conflict` when the email is already registered.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let password_hash = hash_blocking(password.to_string()).await?;

        let raw_token = generate_one_time_token()?;
        let token_hash = hash_one_time_token(&raw_token);
        let expires = unix_now()
            + i64::try_from(self.options.verification_ttl.as_secs()).unwrap_or(i64::MAX);

        let outcome = self
            .users
            .create(NewUser {
                name: name.to_string(),
                email: email.clone(),
                password_hash,
                roles: vec![Role::User],
                verify_email_token_hash: token_hash,
                verify_email_token_expires: expires,
            })
            .await?;

        match outcome {
            CreateUserOutcome::DuplicateEmail => Err(AuthError::Conflict),
            CreateUserOutcome::Created(_) => {
                let link = self.options.link("/auth/verify-email", &raw_token);
                if let Err(err) = self.mail.deliver_verification_link(&email, &link) {
                    // Fire-and-forget: registration already succeeded.
                    warn!("failed to deliver verification email: {err}");
                }
                Ok(())
            }
        }
    }

    /// Redeem an email-verification token, activating the account.
    ///
    /// # Errors
    ///
    /// `InvalidOrExpiredToken` when no unexpired hash matches.
    pub async fn verify_email(&self, raw_token: &str) -> Result<(), AuthError> {
        let token = raw_token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let token_hash = hash_one_time_token(token);
        match self.users.consume_verification_token(&token_hash).await? {
            Some(_) => Ok(()),
            None => Err(AuthError::InvalidOrExpiredToken),
        }
    }

    /// Authenticate and issue one access plus one refresh token.
    ///
    /// Missing user and wrong password collapse to the same error; the
    /// refresh jti is whitelisted before the pair is returned.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials`, `EmailNotVerified`, or `StoreUnavailable`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.audit_login(None, ip, &email, LoginOutcome::Failure, "invalid credentials")
                .await;
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_blocking(user.password_hash.clone(), password.to_string()).await? {
            if let Err(err) = self.users.record_failed_login(user.id, ip).await {
                warn!("failed to record failed login: {err}");
            }
            self.audit_login(
                Some(user.id),
                ip,
                &email,
                LoginOutcome::Failure,
                "invalid credentials",
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active() {
            self.audit_login(
                Some(user.id),
                ip,
                &email,
                LoginOutcome::Failure,
                "email not verified",
            )
            .await;
            return Err(AuthError::EmailNotVerified);
        }

        let now = unix_now();
        let access_token = self
            .tokens
            .sign_access(user.id, &user.roles, now)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign access token: {err}")))?;
        let (refresh_token, jti) = self
            .tokens
            .sign_refresh(user.id, now)
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign refresh token: {err}")))?;

        // The whitelist write must be committed before the client ever holds
        // the token, or a prompt refresh could be rejected as unknown.
        self.store
            .whitelist_refresh(jti, user.id, self.tokens.refresh_ttl())
            .await?;

        if let Err(err) = self.users.record_successful_login(user.id, ip).await {
            warn!("failed to record successful login: {err}");
        }
        self.audit_login(Some(user.id), ip, &email, LoginOutcome::Success, "login")
            .await;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a live, whitelisted refresh token for a new access token.
    ///
    /// Rotation is deliberately not performed: the same refresh token stays
    /// valid until its own expiry or an explicit logout.
    ///
    /// # Errors
    ///
    /// `InvalidOrExpiredToken` when any check fails; `StoreUnavailable` when
    /// the whitelist cannot be consulted (this path fails closed).
    pub async fn refresh(&self, raw_refresh_token: &str) -> Result<String, AuthError> {
        let claims = self
            .tokens
            .verify_refresh(raw_refresh_token, unix_now())
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        if !self
            .store
            .is_refresh_whitelisted(claims.jti, claims.sub)
            .await?
        {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let access_token = self
            .tokens
            .sign_access(user.id, &user.roles, unix_now())
            .map_err(|err| AuthError::Internal(anyhow!("failed to sign access token: {err}")))?;

        Ok(access_token)
    }

    /// Revoke a refresh token's whitelist entry.
    ///
    /// Idempotent: unparseable tokens and absent entries both report 0
    /// revoked rather than failing.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the whitelist cannot be reached.
    pub async fn logout(&self, raw_refresh_token: &str) -> Result<u64, AuthError> {
        let Ok(claims) = self.tokens.refresh_claims_for_revocation(raw_refresh_token) else {
            return Ok(0);
        };

        let revoked = self.store.revoke_refresh(claims.jti).await?;
        if revoked == 0 {
            debug!("logout for already-absent refresh token {}", claims.jti);
        }
        Ok(revoked)
    }

    /// Issue a one-time reset token if the account exists.
    ///
    /// The outcome is identical either way so callers cannot probe for
    /// registered emails. A store outage does surface: without the entry the
    /// emailed link would be dead on arrival.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the token cannot be stored.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Ok(());
        };

        let raw_token = generate_one_time_token()?;
        self.store
            .issue_reset_token(&raw_token, user.id, self.options.reset_ttl)
            .await?;

        let link = self.options.link("/auth/reset-password", &raw_token);
        if let Err(err) = self.mail.deliver_reset_link(&email, &link) {
            warn!("failed to deliver password reset email: {err}");
        }

        Ok(())
    }

    /// Redeem a reset token and store the new password hash.
    ///
    /// The token is consumed atomically before anything else happens, so a
    /// concurrent attempt with the same token loses even if this call later
    /// fails.
    ///
    /// # Errors
    ///
    /// `InvalidOrExpiredToken` when the token is unknown or already used;
    /// `StoreUnavailable` when redemption cannot be attempted (fails closed).
    pub async fn reset_password(
        &self,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let token = raw_token.trim();
        if token.is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let Some(user_id) = self.store.redeem_reset_token(token).await? else {
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let password_hash = hash_blocking(new_password.to_string()).await?;
        self.users.update_password(user.id, &password_hash).await?;

        Ok(())
    }

    /// Validate a bearer access token for request authentication.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for any failed check; the kind is not differentiated.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens
            .verify_access(token, unix_now())
            .map_err(|_| AuthError::Unauthorized)
    }

    /// Mint an API key for an admin caller; the raw key is shown exactly once.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admin callers.
    pub async fn create_api_key(
        &self,
        claims: &Claims,
        request: ApiKeyRequest,
    ) -> Result<ApiKeyCreated, AuthError> {
        authorize(claims, &[Role::Admin])?;

        let raw_key = Uuid::new_v4().to_string();
        let key_hash = hash_blocking(raw_key.clone()).await?;

        let name = request
            .name
            .unwrap_or_else(|| format!("API key for {}", claims.sub));

        let record = self
            .users
            .insert_api_key(NewApiKey {
                key_hash,
                user_id: Some(claims.sub),
                name,
                permissions: request.permissions,
                expires_at: request.expires_at,
            })
            .await?;

        Ok(ApiKeyCreated {
            api_key: raw_key,
            record,
        })
    }

    /// Authenticate a presented API key against the stored hashes.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when no active, unexpired key verifies.
    pub async fn verify_api_key(&self, presented: &str) -> Result<ApiKeyRecord, AuthError> {
        let now = unix_now();

        for key in self.users.list_active_api_keys().await? {
            if !key.is_usable(now) {
                continue;
            }
            match verify_blocking(key.key_hash.clone(), presented.to_string()).await {
                Ok(true) => {
                    if let Err(err) = self.users.touch_api_key(key.id).await {
                        warn!("failed to update api key last use: {err}");
                    }
                    return Ok(key);
                }
                Ok(false) => {}
                Err(err) => {
                    // One corrupt hash must not lock out every other key.
                    warn!("skipping api key {} with bad hash: {err}", key.id);
                }
            }
        }

        Err(AuthError::Unauthorized)
    }

    async fn audit_login(
        &self,
        user_id: Option<Uuid>,
        ip: Option<&str>,
        email: &str,
        outcome: LoginOutcome,
        reason: &str,
    ) {
        let attempt = LoginAttempt {
            user_id,
            ip,
            email,
            outcome,
            reason,
        };
        // Best-effort: the login decision never waits on the audit trail.
        if let Err(err) = self.audit.record_login_attempt(attempt).await {
            warn!("failed to record login attempt: {err}");
        }
    }
}
