//! In-memory collaborators for orchestrator tests.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::audit::{AuditLog, LoginAttempt};
use crate::auth::models::{
    ApiKeyRecord, LoginOutcome, NewApiKey, NewUser, Role, User, UserStatus,
};
use crate::auth::repo::{CreateUserOutcome, UserStore};
use crate::auth::service::{AuthOptions, AuthService};
use crate::auth::token_store::TokenStore;
use crate::auth::tokens::{Claims, TokenKind, TokenSigner};
use crate::auth::unix_now;
use crate::kv::MemoryKv;
use crate::mail::MailSender;

/// PEM for a throwaway RSA key, generated once per test binary.
fn test_key_pem() -> &'static str {
    static PEM: OnceLock<String> = OnceLock::new();
    PEM.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)
            .expect("failed to generate test key");
        key.to_pkcs8_pem(LineEnding::LF)
            .expect("failed to encode test key")
            .to_string()
    })
}

/// Pull the raw one-time token back out of a delivered link.
pub(crate) fn raw_token_from_link(link: &str) -> String {
    link.split_once("token=")
        .map(|(_, token)| token.to_string())
        .expect("link carries a token")
}

#[derive(Default)]
pub(crate) struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    api_keys: Mutex<Vec<ApiKeyRecord>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock();
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock();
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<CreateUserOutcome> {
        let mut users = self.users.lock();
        if users.iter().any(|user| user.email == new_user.email) {
            return Ok(CreateUserOutcome::DuplicateEmail);
        }

        let id = Uuid::new_v4();
        users.push(User {
            id,
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            roles: new_user.roles,
            status: UserStatus::Pending,
            is_email_verified: false,
            verify_email_token_hash: Some(new_user.verify_email_token_hash),
            verify_email_token_expires: Some(new_user.verify_email_token_expires),
            login_attempts: 0,
            last_login_at: None,
            last_login_ip: None,
        });
        Ok(CreateUserOutcome::Created(id))
    }

    async fn consume_verification_token(&self, token_hash: &str) -> Result<Option<Uuid>> {
        let now = unix_now();
        let mut users = self.users.lock();
        let Some(user) = users.iter_mut().find(|user| {
            user.verify_email_token_hash.as_deref() == Some(token_hash)
                && user.verify_email_token_expires.is_some_and(|exp| exp > now)
        }) else {
            return Ok(None);
        };

        user.is_email_verified = true;
        user.status = UserStatus::Active;
        user.verify_email_token_hash = None;
        user.verify_email_token_expires = None;
        Ok(Some(user.id))
    }

    async fn record_failed_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<()> {
        let mut users = self.users.lock();
        if let Some(user) = users.iter_mut().find(|user| user.id == user_id) {
            user.login_attempts += 1;
            user.last_login_ip = ip.map(str::to_string);
        }
        Ok(())
    }

    async fn record_successful_login(&self, user_id: Uuid, ip: Option<&str>) -> Result<()> {
        let mut users = self.users.lock();
        if let Some(user) = users.iter_mut().find(|user| user.id == user_id) {
            user.login_attempts = 0;
            user.last_login_at = Some(unix_now());
            user.last_login_ip = ip.map(str::to_string);
        }
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let mut users = self.users.lock();
        if let Some(user) = users.iter_mut().find(|user| user.id == user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn insert_api_key(&self, new_key: NewApiKey) -> Result<ApiKeyRecord> {
        let record = ApiKeyRecord {
            id: Uuid::new_v4(),
            key_hash: new_key.key_hash,
            user_id: new_key.user_id,
            name: new_key.name,
            permissions: new_key.permissions,
            is_active: true,
            expires_at: new_key.expires_at,
            last_used_at: None,
        };
        self.api_keys.lock().push(record.clone());
        Ok(record)
    }

    async fn list_active_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        let keys = self.api_keys.lock();
        Ok(keys.iter().filter(|key| key.is_active).cloned().collect())
    }

    async fn touch_api_key(&self, id: Uuid) -> Result<()> {
        let mut keys = self.api_keys.lock();
        if let Some(key) = keys.iter_mut().find(|key| key.id == id) {
            key.last_used_at = Some(unix_now());
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CapturingMailSender {
    verifications: Mutex<Vec<(String, String)>>,
    resets: Mutex<Vec<(String, String)>>,
}

impl CapturingMailSender {
    pub(crate) fn last_verification_link(&self) -> Option<String> {
        self.verifications
            .lock()
            .last()
            .map(|(_, link)| link.clone())
    }

    pub(crate) fn last_reset_link(&self) -> Option<String> {
        self.resets.lock().last().map(|(_, link)| link.clone())
    }
}

impl MailSender for CapturingMailSender {
    fn deliver_verification_link(&self, email: &str, link: &str) -> Result<()> {
        self.verifications
            .lock()
            .push((email.to_string(), link.to_string()));
        Ok(())
    }

    fn deliver_reset_link(&self, email: &str, link: &str) -> Result<()> {
        self.resets
            .lock()
            .push((email.to_string(), link.to_string()));
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct AuditedAttempt {
    pub user_id: Option<Uuid>,
    pub outcome: LoginOutcome,
    pub reason: String,
}

#[derive(Default)]
pub(crate) struct CapturingAuditLog {
    attempts: Mutex<Vec<AuditedAttempt>>,
}

impl CapturingAuditLog {
    pub(crate) fn failures(&self) -> Vec<AuditedAttempt> {
        self.attempts
            .lock()
            .iter()
            .filter(|attempt| attempt.outcome == LoginOutcome::Failure)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditLog for CapturingAuditLog {
    async fn record_login_attempt(&self, attempt: LoginAttempt<'_>) -> Result<()> {
        self.attempts.lock().push(AuditedAttempt {
            user_id: attempt.user_id,
            outcome: attempt.outcome,
            reason: attempt.reason.to_string(),
        });
        Ok(())
    }
}

/// Orchestrator wired to in-memory collaborators.
pub(crate) struct TestHarness {
    pub service: Arc<AuthService>,
    pub users: Arc<MemoryUserStore>,
    pub mail: Arc<CapturingMailSender>,
    pub audit: Arc<CapturingAuditLog>,
    signer: TokenSigner,
}

impl TestHarness {
    pub(crate) fn new() -> Self {
        Self::with_options(|options| options)
    }

    pub(crate) fn with_options(adjust: impl FnOnce(AuthOptions) -> AuthOptions) -> Self {
        let users = Arc::new(MemoryUserStore::default());
        let mail = Arc::new(CapturingMailSender::default());
        let audit = Arc::new(CapturingAuditLog::default());

        let build_signer = || {
            TokenSigner::from_private_key_pem(
                test_key_pem(),
                Duration::from_secs(3600),
                Duration::from_secs(604_800),
            )
            .expect("failed to build test signer")
        };

        let options = adjust(AuthOptions::new("https://auth.example.test".to_string()));

        let service = Arc::new(AuthService::new(
            users.clone(),
            audit.clone(),
            build_signer(),
            TokenStore::new(Arc::new(MemoryKv::new())),
            mail.clone(),
            options,
        ));

        Self {
            service,
            users,
            mail,
            audit,
            signer: build_signer(),
        }
    }

    /// Register and immediately verify, leaving the account `active`.
    pub(crate) async fn register_active(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(), crate::auth::AuthError> {
        self.service.register("Test User", email, password).await?;
        let raw = raw_token_from_link(
            &self
                .mail
                .last_verification_link()
                .expect("registration delivers a link"),
        );
        self.service.verify_email(&raw).await
    }

    /// Current state of a user by (already normalized) email.
    pub(crate) async fn user(&self, email: &str) -> User {
        self.users
            .find_by_email(email)
            .await
            .expect("memory store is infallible")
            .expect("user exists")
    }

    /// Access-token claims for a synthetic caller with the given roles.
    pub(crate) fn claims_for(&self, roles: &[Role]) -> Claims {
        let now = unix_now();
        Claims {
            kind: TokenKind::Access,
            sub: Uuid::new_v4(),
            roles: roles.to_vec(),
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + 3600,
        }
    }

    /// Sign an access token the service will accept for the given claims.
    pub(crate) fn sign_access_for(&self, claims: &Claims) -> String {
        self.signer
            .sign_access(claims.sub, &claims.roles, claims.iat)
            .expect("signing succeeds")
    }
}
