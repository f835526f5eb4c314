//! Outbound delivery of one-time codes.

use crate::models::Purpose;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("SMS delivery failed: {0}")]
pub struct SendError(pub String);

/// Delivers a code to a phone. Failures are opaque to the caller.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, phone: &str, code: &str, purpose: Purpose) -> Result<(), SendError>;
}

/// Development sender: writes the code to the log instead of a handset.
#[derive(Debug, Default, Clone)]
pub struct ConsoleSender;

#[async_trait]
impl Sender for ConsoleSender {
    async fn send(&self, phone: &str, code: &str, purpose: Purpose) -> Result<(), SendError> {
        tracing::info!(
            action = "sms_console",
            phone = %phone,
            purpose = %purpose,
            code = %code,
            "Verification code (console sender)"
        );
        Ok(())
    }
}
