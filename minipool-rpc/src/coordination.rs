//! Remote coordination service contract
//!
//! The service escrows signed exit messages on the node's behalf and is the
//! source of truth for which validators already have one stored.

use async_trait::async_trait;
use minipool_types::{ExitMessageUpload, RemoteValidator, UploadOutcome};

use crate::error::Result;

#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// All of the node's validators known to the service
    async fn validators(&self) -> Result<Vec<RemoteValidator>>;

    /// Store a batch of signed exits. Registration problems come back in the
    /// outcome rather than as an error.
    async fn upload_signed_exits(&self, exits: Vec<ExitMessageUpload>) -> Result<UploadOutcome>;
}
