//! Chat-channel provisioning seam.
//!
//! The chat channel is owned end to end by an external collaborator; this
//! core only asks for one after acceptance and stores the returned reference.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::types::{ChatRef, ParticipantId};

/// Error from the chat collaborator.
#[derive(Debug, Error)]
#[error("chat provisioning failed: {0}")]
pub struct ChatError(pub String);

/// Creates a chat channel between two participants.
#[async_trait]
pub trait ChatProvisioner: Send + Sync {
    async fn create_channel(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
    ) -> Result<ChatRef, ChatError>;
}

/// Stand-in provisioner: mints a local reference and logs it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingChatProvisioner;

#[async_trait]
impl ChatProvisioner for LoggingChatProvisioner {
    async fn create_channel(
        &self,
        a: &ParticipantId,
        b: &ParticipantId,
    ) -> Result<ChatRef, ChatError> {
        let chat_ref = ChatRef::new(format!("chat-{:016x}", rand::random::<u64>()));
        debug!(%a, %b, %chat_ref, "chat channel logged (not provisioned)");
        Ok(chat_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_provisioner_mints_distinct_refs() {
        let provisioner = LoggingChatProvisioner;
        let a = ParticipantId::new("alice");
        let b = ParticipantId::new("bob");
        let first = provisioner.create_channel(&a, &b).await.unwrap();
        let second = provisioner.create_channel(&a, &b).await.unwrap();
        assert_ne!(first, second);
    }
}
