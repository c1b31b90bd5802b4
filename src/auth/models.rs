//! User, API-key, and audit record types shared by the core.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Role granted to a user and embedded in access-token claims.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Account lifecycle; only `active` accounts may log in.
#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// User record as held by the user store.
///
/// `password_hash` is always a PHC string, never the plaintext, and
/// `verify_email_token_hash` holds only a hash of the raw verification
/// token. Timestamps are unix epoch seconds.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub is_email_verified: bool,
    pub verify_email_token_hash: Option<String>,
    pub verify_email_token_expires: Option<i64>,
    pub login_attempts: i32,
    pub last_login_at: Option<i64>,
    pub last_login_ip: Option<String>,
}

impl User {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    #[must_use]
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }
}

/// Fields needed to create a user in `pending` state.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
    pub verify_email_token_hash: String,
    pub verify_email_token_expires: i64,
}

/// API-key record; `key_hash` is the only stored form of the key.
#[derive(Clone, Debug)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub key_hash: String,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub permissions: Vec<String>,
    pub is_active: bool,
    pub expires_at: Option<i64>,
    pub last_used_at: Option<i64>,
}

impl ApiKeyRecord {
    #[must_use]
    pub fn is_usable(&self, now: i64) -> bool {
        self.is_active && self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Fields needed to persist a freshly issued API key.
#[derive(Clone, Debug)]
pub struct NewApiKey {
    pub key_hash: String,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub permissions: Vec<String>,
    pub expires_at: Option<i64>,
}

/// Outcome recorded for each login attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Failure,
}

impl LoginOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_and_status_round_trip() {
        for role in [Role::User, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        for status in [
            UserStatus::Pending,
            UserStatus::Active,
            UserStatus::Inactive,
            UserStatus::Suspended,
        ] {
            assert_eq!(UserStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(Role::parse("root"), None);
        assert_eq!(UserStatus::parse("deleted"), None);
    }

    #[test]
    fn api_key_usable_window() {
        let key = ApiKeyRecord {
            id: Uuid::new_v4(),
            key_hash: "$argon2id$stub".to_string(),
            user_id: None,
            name: "ci".to_string(),
            permissions: vec![],
            is_active: true,
            expires_at: Some(100),
            last_used_at: None,
        };

        assert!(key.is_usable(99));
        assert!(!key.is_usable(100));

        let inactive = ApiKeyRecord {
            is_active: false,
            expires_at: None,
            ..key
        };
        assert!(!inactive.is_usable(0));
    }
}
