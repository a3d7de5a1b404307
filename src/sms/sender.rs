use async_trait::async_trait;

use super::CodePurpose;
use crate::error::AuthError;
use crate::traits::MessageSender;

/// Writes codes to the log instead of sending them. Used when no SMS gateway
/// is configured.
#[derive(Debug, Default, Clone)]
pub struct LogSender;

#[async_trait]
impl MessageSender for LogSender {
    async fn send_code(
        &self,
        mobile: &str,
        purpose: CodePurpose,
        code: &str,
    ) -> Result<(), AuthError> {
        tracing::info!(mobile = %mobile, purpose = %purpose, code = %code, "SMS code (not sent, no gateway)");
        Ok(())
    }
}
