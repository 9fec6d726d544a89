use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChannelInfo, MessageId, OutgoingMessage, SourceMessage},
    Result,
};

/// Hexagonal port over the chat platform.
///
/// Implementations map a missing channel/message to [`crate::Error::NotFound`]
/// so callers can treat cleanup of already-deleted messages as success.
#[async_trait]
pub trait GatewayPort: Send + Sync {
    async fn fetch_channel(&self, channel: ChannelId) -> Result<ChannelInfo>;

    async fn fetch_message(&self, channel: ChannelId, id: MessageId) -> Result<SourceMessage>;

    async fn send_message(&self, channel: ChannelId, msg: OutgoingMessage) -> Result<MessageId>;

    async fn delete_message(&self, channel: ChannelId, id: MessageId) -> Result<()>;
}
