use std::{future::Future, pin::Pin, sync::OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::{
    domain::{Attachment, ChannelId, Embed, MediaKind, MediaRef, MessageId, SourceMessage},
    gateway::GatewayPort,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn media_extension_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\.(jpe?g|png|gif|webp|bmp|svg|avif|mp4|mov|webm|mp3|wav|ogg|flac|m4a)(?:\?.*)?$",
        )
        .expect("media extension regex")
    })
}

fn message_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)discord(?:app)?\.com/channels/(\d+|@me)/(\d+)/(\d+)")
            .expect("message link regex")
    })
}

/// Media kind implied by a file name or URL ending in a known media extension.
pub fn kind_from_extension(name_or_url: &str) -> Option<MediaKind> {
    let caps = media_extension_re().captures(name_or_url)?;
    let ext = caps.get(1)?.as_str().to_ascii_lowercase();
    Some(match ext.as_str() {
        "mp4" | "mov" | "webm" => MediaKind::Video,
        "mp3" | "wav" | "ogg" | "flac" | "m4a" => MediaKind::Audio,
        _ => MediaKind::Image,
    })
}

pub fn kind_from_content_type(content_type: &str) -> Option<MediaKind> {
    let ct = content_type.trim().to_ascii_lowercase();
    if ct.starts_with("image") {
        Some(MediaKind::Image)
    } else if ct.starts_with("video") {
        Some(MediaKind::Video)
    } else if ct.starts_with("audio") {
        Some(MediaKind::Audio)
    } else {
        None
    }
}

/// Parse a `.../channels/{guild}/{channel}/{message}` link.
pub fn parse_message_link(url: &str) -> Option<(ChannelId, MessageId)> {
    let caps = message_link_re().captures(url)?;
    let channel = caps.get(2)?.as_str().parse::<u64>().ok()?;
    let message = caps.get(3)?.as_str().parse::<u64>().ok()?;
    Some((ChannelId(channel), MessageId(message)))
}

fn attachment_kind(att: &Attachment) -> Option<MediaKind> {
    if let Some(kind) = att.content_type.as_deref().and_then(kind_from_content_type) {
        return Some(kind);
    }
    att.name
        .as_deref()
        .and_then(kind_from_extension)
        .or_else(|| kind_from_extension(&att.url))
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Collects the media references of a message: attachments first, then
/// embeds, each in message order.
///
/// Embeds that link to another message are resolved through the gateway, at
/// most `max_hops` levels deep.
pub struct MediaExtractor<'a> {
    gateway: &'a dyn GatewayPort,
    max_hops: u8,
}

impl<'a> MediaExtractor<'a> {
    pub fn new(gateway: &'a dyn GatewayPort, max_hops: u8) -> Self {
        Self { gateway, max_hops }
    }

    pub async fn extract(&self, msg: &SourceMessage) -> Vec<MediaRef> {
        self.collect(msg, self.max_hops).await
    }

    fn collect<'b>(&'b self, msg: &'b SourceMessage, hops: u8) -> BoxFuture<'b, Vec<MediaRef>> {
        Box::pin(async move {
            let mut refs: Vec<MediaRef> = msg
                .attachments
                .iter()
                .filter_map(|att| {
                    attachment_kind(att).map(|kind| MediaRef {
                        url: att.url.clone(),
                        suggested_name: att.name.clone(),
                        kind,
                    })
                })
                .collect();

            for embed in &msg.embeds {
                refs.extend(self.embed_refs(embed, hops).await);
            }
            refs
        })
    }

    async fn embed_refs(&self, embed: &Embed, hops: u8) -> Vec<MediaRef> {
        let direct = [
            (non_empty(&embed.image_url), MediaKind::Image),
            (non_empty(&embed.thumbnail_url), MediaKind::Image),
            (non_empty(&embed.video_url), MediaKind::Video),
        ];
        if let Some((Some(url), kind)) = direct.into_iter().find(|(url, _)| url.is_some()) {
            return vec![unnamed(url, kind)];
        }

        let Some(url) = non_empty(&embed.url) else {
            return Vec::new();
        };
        if let Some(kind) = kind_from_extension(url) {
            return vec![unnamed(url, kind)];
        }

        if hops > 0 {
            if let Some((channel, id)) = parse_message_link(url) {
                match self.gateway.fetch_message(channel, id).await {
                    Ok(linked) => {
                        let linked_refs = self.collect(&linked, hops - 1).await;
                        if !linked_refs.is_empty() {
                            debug!(%channel, message_id = %id, count = linked_refs.len(), "resolved linked message media");
                            return linked_refs;
                        }
                    }
                    Err(e) => {
                        warn!(%channel, message_id = %id, error = %e, "failed to resolve linked message");
                    }
                }
            }
        }

        vec![unnamed(url, MediaKind::Unknown)]
    }
}

fn unnamed(url: &str, kind: MediaKind) -> MediaRef {
    MediaRef {
        url: url.to_string(),
        suggested_name: None,
        kind,
    }
}
