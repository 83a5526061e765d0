//! Catch-all handler logging every message that reaches the service.

use async_trait::async_trait;
use messaging::{EventHandler, HandlerError};

/// Logs every inbound message at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugHandler;

#[async_trait]
impl EventHandler for DebugHandler {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn handle(&self, topic: &str, body: &[u8]) -> Result<(), HandlerError> {
        tracing::debug!(
            topic,
            bytes = body.len(),
            body = %String::from_utf8_lossy(body),
            "received event"
        );
        Ok(())
    }
}
