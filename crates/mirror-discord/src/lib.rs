//! Discord adapter (serenity).
//!
//! This crate implements the `mirror-core` GatewayPort over the Discord HTTP
//! API and feeds gateway events into the forward engine.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use serenity::all::{
    Channel, ChannelType, CreateAllowedMentions, CreateAttachment, CreateMessage, Http, Message,
    MessageUpdateEvent, User,
};
use tokio::time::sleep;
use tracing::warn;

pub mod handler;
pub mod health;
pub mod router;

use mirror_core::{
    domain::{
        Attachment, Author, ChannelId, ChannelInfo, Embed, MessageId, OutgoingMessage,
        SourceMessage, UpdatedMessage,
    },
    errors::Error,
    gateway::GatewayPort,
    Result,
};

#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    fn dc_channel(channel: ChannelId) -> serenity::all::ChannelId {
        serenity::all::ChannelId::new(channel.0)
    }

    fn dc_msg_id(id: MessageId) -> serenity::all::MessageId {
        serenity::all::MessageId::new(id.0)
    }

    fn map_err(e: serenity::Error) -> Error {
        match status_of(&e) {
            Some(404) => Error::NotFound(format!("discord: {e}")),
            _ => Error::External(format!("discord error: {e}")),
        }
    }

    /// Run `op`, retrying once after a short pause on 429/5xx responses.
    /// Non-idempotent calls are retried on 429 only: a 5xx can arrive after
    /// Discord already applied the request.
    async fn with_retry<T, Fut>(&self, idempotent: bool, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: Future<Output = serenity::Result<T>>,
    {
        const MAX_RETRIES: usize = 1;
        const RETRY_DELAY: Duration = Duration::from_secs(1);

        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempts < MAX_RETRIES && should_retry(status_of(&e), idempotent) => {
                    attempts += 1;
                    warn!(error = %e, "discord request failed, retrying");
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(Self::map_err(e)),
            }
        }
    }
}

fn status_of(e: &serenity::Error) -> Option<u16> {
    match e {
        serenity::Error::Http(http_err) => http_err.status_code().map(|s| s.as_u16()),
        _ => None,
    }
}

fn should_retry(status: Option<u16>, idempotent: bool) -> bool {
    match status {
        Some(429) => true,
        Some(500..=599) => idempotent,
        _ => false,
    }
}

fn is_text_kind(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::Text
            | ChannelType::News
            | ChannelType::PublicThread
            | ChannelType::PrivateThread
            | ChannelType::NewsThread
    )
}

/// Convert a serenity message into the platform-neutral form the engine uses.
pub fn source_message(msg: &Message) -> SourceMessage {
    build_source(
        msg.id,
        msg.channel_id,
        &msg.author,
        &msg.attachments,
        &msg.embeds,
    )
}

/// Resolve an update from the event payload alone when it carries the
/// author and the media fields; otherwise the engine has to fetch it.
pub fn updated_message(event: &MessageUpdateEvent) -> UpdatedMessage {
    match (&event.author, &event.attachments, &event.embeds) {
        (Some(author), Some(attachments), Some(embeds)) => UpdatedMessage::Full(build_source(
            event.id,
            event.channel_id,
            author,
            attachments,
            embeds,
        )),
        _ => UpdatedMessage::Partial {
            channel_id: ChannelId(event.channel_id.get()),
            id: MessageId(event.id.get()),
        },
    }
}

fn build_source(
    id: serenity::all::MessageId,
    channel_id: serenity::all::ChannelId,
    author: &User,
    attachments: &[serenity::all::Attachment],
    embeds: &[serenity::all::Embed],
) -> SourceMessage {
    SourceMessage {
        id: MessageId(id.get()),
        channel_id: Some(ChannelId(channel_id.get())),
        author: Some(Author {
            tag: Some(author.tag()).filter(|t| !t.is_empty()),
            username: Some(author.name.clone()).filter(|n| !n.is_empty()),
            bot: author.bot,
        }),
        attachments: attachments
            .iter()
            .map(|a| Attachment {
                url: a.url.clone(),
                name: Some(a.filename.clone()),
                content_type: a.content_type.clone(),
            })
            .collect(),
        embeds: embeds
            .iter()
            .map(|e| Embed {
                url: e.url.clone(),
                image_url: e.image.as_ref().map(|i| i.url.clone()),
                thumbnail_url: e.thumbnail.as_ref().map(|t| t.url.clone()),
                video_url: e.video.as_ref().map(|v| v.url.clone()),
            })
            .collect(),
    }
}

#[async_trait]
impl GatewayPort for DiscordGateway {
    async fn fetch_channel(&self, channel: ChannelId) -> Result<ChannelInfo> {
        let fetched = self
            .with_retry(true, || Self::dc_channel(channel).to_channel(&self.http))
            .await?;

        let is_text = match fetched {
            Channel::Guild(gc) => is_text_kind(gc.kind),
            Channel::Private(_) => true,
            _ => false,
        };
        Ok(ChannelInfo {
            id: channel,
            is_text,
        })
    }

    async fn fetch_message(&self, channel: ChannelId, id: MessageId) -> Result<SourceMessage> {
        let msg = self
            .with_retry(true, || {
                Self::dc_channel(channel).message(&self.http, Self::dc_msg_id(id))
            })
            .await?;
        Ok(source_message(&msg))
    }

    async fn send_message(&self, channel: ChannelId, msg: OutgoingMessage) -> Result<MessageId> {
        let files: Vec<CreateAttachment> = msg
            .files
            .into_iter()
            .map(|f| CreateAttachment::bytes(f.bytes, f.name))
            .collect();

        let mut builder = CreateMessage::new().content(msg.content).add_files(files);
        if msg.suppress_mentions {
            builder = builder.allowed_mentions(CreateAllowedMentions::new());
        }

        let sent = self
            .with_retry(false, || {
                Self::dc_channel(channel).send_message(&self.http, builder.clone())
            })
            .await?;
        Ok(MessageId(sent.id.get()))
    }

    async fn delete_message(&self, channel: ChannelId, id: MessageId) -> Result<()> {
        self.with_retry(true, || {
            Self::dc_channel(channel).delete_message(&self.http, Self::dc_msg_id(id))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_kinds() {
        assert!(is_text_kind(ChannelType::Text));
        assert!(is_text_kind(ChannelType::News));
        assert!(!is_text_kind(ChannelType::Voice));
        assert!(!is_text_kind(ChannelType::Category));
    }

    #[test]
    fn retries_server_errors_only_when_idempotent() {
        assert!(should_retry(Some(429), false));
        assert!(should_retry(Some(502), true));
        assert!(!should_retry(Some(502), false));
        assert!(!should_retry(Some(404), true));
        assert!(!should_retry(None, true));
    }

    #[test]
    fn update_without_media_fields_needs_fetch() {
        let event: MessageUpdateEvent =
            serde_json::from_value(serde_json::json!({ "id": "7", "channel_id": "8" })).unwrap();

        assert_eq!(
            updated_message(&event),
            UpdatedMessage::Partial {
                channel_id: ChannelId(8),
                id: MessageId(7),
            }
        );
    }

    #[test]
    fn update_with_payload_resolves_in_place() {
        let event: MessageUpdateEvent = serde_json::from_value(serde_json::json!({
            "id": "7",
            "channel_id": "8",
            "author": { "id": "3", "username": "carol", "discriminator": "0", "avatar": null },
            "attachments": [],
            "embeds": []
        }))
        .unwrap();

        let UpdatedMessage::Full(msg) = updated_message(&event) else {
            panic!("expected a full update");
        };
        assert_eq!(msg.id, MessageId(7));
        assert_eq!(msg.channel_id, Some(ChannelId(8)));
        assert_eq!(msg.author.unwrap().username.as_deref(), Some("carol"));
    }

    #[test]
    fn converts_message_identity_and_author() {
        let mut msg = Message::default();
        msg.id = serenity::all::MessageId::new(5);
        msg.channel_id = serenity::all::ChannelId::new(6);
        msg.author.name = "carol".to_string();
        msg.author.bot = true;

        let src = source_message(&msg);
        assert_eq!(src.id, MessageId(5));
        assert_eq!(src.channel_id, Some(ChannelId(6)));
        let author = src.author.unwrap();
        assert_eq!(author.username.as_deref(), Some("carol"));
        assert!(author.tag.unwrap().starts_with("carol"));
        assert!(author.bot);
        assert!(src.attachments.is_empty());
        assert!(src.embeds.is_empty());
    }
}
