use std::time::Duration;

use thiserror::Error;

/// Errors from a products service call.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Products request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Products service returned status {0}")]
    Status(u16),

    #[error("Invalid products response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Products request timed out after {0:?}")]
    Timeout(Duration),
}
