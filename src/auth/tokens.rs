//! RS256 signing and verification for access and refresh tokens.
//!
//! Tokens are stateless: validity is signature + expiry only. Refresh tokens
//! gain a third, external condition (whitelist membership) that the
//! orchestrator checks against the token store; nothing here consults it.

use base64ct::{Base64UrlUnpadded, Encoding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{Keypair, SignatureEncoding, Signer, Verifier};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::models::Role;

pub const TOKEN_ALG: &str = "RS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn rs256() -> Self {
        Self {
            alg: TOKEN_ALG.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Which lifecycle a token belongs to; carried in the `use` claim so one kind
/// can never be presented as the other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(rename = "use")]
    pub kind: TokenKind,
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("failed to parse RSA key")]
    KeyParse,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("wrong token kind")]
    WrongKind,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn decode_private_key(pem: &str) -> Result<RsaPrivateKey, TokenError> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Ok(key);
    }
    Err(TokenError::KeyParse)
}

/// Issues and validates the two token kinds with one fixed RSA key pair.
///
/// Verification is pinned to RS256; a token claiming any other algorithm is
/// rejected before the signature is even inspected.
pub struct TokenSigner {
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    /// Build a signer from a PKCS#8 or PKCS#1 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::KeyParse`] when the PEM cannot be decoded.
    pub fn from_private_key_pem(
        pem: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, TokenError> {
        let private_key = decode_private_key(pem)?;
        let signing_key = SigningKey::<Sha256>::new(private_key);
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
            access_ttl,
            refresh_ttl,
        })
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header_b64 = b64e_json(&TokenHeader::rs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature.to_vec());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Sign a short-lived access token carrying the user's roles.
    ///
    /// # Errors
    ///
    /// Returns an error if claim encoding fails.
    pub fn sign_access(
        &self,
        user_id: Uuid,
        roles: &[Role],
        now: i64,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            kind: TokenKind::Access,
            sub: user_id,
            roles: roles.to_vec(),
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + i64::try_from(self.access_ttl.as_secs()).unwrap_or(i64::MAX),
        };
        self.sign(&claims)
    }

    /// Sign a refresh token and return its `jti`.
    ///
    /// Signing alone grants nothing: the caller must register the `jti` in
    /// the whitelist before handing the token to the client.
    ///
    /// # Errors
    ///
    /// Returns an error if claim encoding fails.
    pub fn sign_refresh(&self, user_id: Uuid, now: i64) -> Result<(String, Uuid), TokenError> {
        let jti = Uuid::new_v4();
        let claims = Claims {
            kind: TokenKind::Refresh,
            sub: user_id,
            roles: Vec::new(),
            jti,
            iat: now,
            exp: now + i64::try_from(self.refresh_ttl.as_secs()).unwrap_or(i64::MAX),
        };
        Ok((self.sign(&claims)?, jti))
    }

    fn verify_signed_claims(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != TOKEN_ALG {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signing_input = format!("{header_b64}.{claims_b64}");
        let signature_bytes =
            Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let signature = Signature::try_from(signature_bytes.as_slice())
            .map_err(|_| TokenError::InvalidSignature)?;
        self.verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        b64d_json(claims_b64)
    }

    fn verify(
        &self,
        token: &str,
        expected: TokenKind,
        now_unix_seconds: i64,
    ) -> Result<Claims, TokenError> {
        let claims = self.verify_signed_claims(token)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind);
        }
        if claims.exp <= now_unix_seconds {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Validate an access token: signature, algorithm, kind, expiry.
    ///
    /// Deliberately does not consult the token store; access tokens are
    /// non-revocable before expiry.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] naming the failed check.
    pub fn verify_access(&self, token: &str, now_unix_seconds: i64) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Access, now_unix_seconds)
    }

    /// Validate a refresh token's cryptographic half.
    ///
    /// The caller must additionally confirm whitelist membership before
    /// trusting the result.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] naming the failed check.
    pub fn verify_refresh(&self, token: &str, now_unix_seconds: i64) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Refresh, now_unix_seconds)
    }

    /// Recover a refresh token's claims for revocation, ignoring expiry.
    ///
    /// Revoking an already-expired token is a harmless no-op, so logout only
    /// needs the signature and kind to hold.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] when the signature or kind is wrong.
    pub fn refresh_claims_for_revocation(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = self.verify_signed_claims(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::WrongKind);
        }
        Ok(claims)
    }
}
