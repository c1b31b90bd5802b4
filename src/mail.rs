//! Outbound email collaborator.
//!
//! The core hands raw verification/reset links to a [`MailSender`] and never
//! depends on delivery succeeding. The default sender logs the link, which
//! doubles as the local-dev fallback when no real transport is configured.

use anyhow::Result;
use tracing::info;

/// Delivery abstraction for account emails.
pub trait MailSender: Send + Sync {
    /// Deliver the email-verification link or return an error.
    fn deliver_verification_link(&self, email: &str, link: &str) -> Result<()>;

    /// Deliver the password-reset link or return an error.
    fn deliver_reset_link(&self, email: &str, link: &str) -> Result<()>;
}

/// Local dev sender that logs links instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailSender;

impl MailSender for LogMailSender {
    fn deliver_verification_link(&self, email: &str, link: &str) -> Result<()> {
        info!(to_email = %email, link = %link, "verification email send stub");
        Ok(())
    }

    fn deliver_reset_link(&self, email: &str, link: &str) -> Result<()> {
        info!(to_email = %email, link = %link, "password reset email send stub");
        Ok(())
    }
}
