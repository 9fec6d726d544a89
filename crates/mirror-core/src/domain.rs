use std::fmt;

use serde::{Deserialize, Serialize};

/// Discord channel id (snowflake).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

/// Discord message id (snowflake). Used for both source and forwarded messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// The subset of a rich embed that can carry media.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Platform-neutral view of a message observed on a source channel.
///
/// Fields that a partial gateway payload may lack are optional; the header
/// formatter has placeholders for them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: MessageId,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

impl SourceMessage {
    pub fn is_from_bot(&self) -> bool {
        self.author.as_ref().is_some_and(|a| a.bot)
    }
}

/// Payload of a message-updated event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdatedMessage {
    Full(SourceMessage),
    /// Only identifiers were delivered; the engine fetches the rest.
    Partial {
        channel_id: ChannelId,
        id: MessageId,
    },
}

impl UpdatedMessage {
    pub fn id(&self) -> MessageId {
        match self {
            UpdatedMessage::Full(m) => m.id,
            UpdatedMessage::Partial { id, .. } => *id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Unknown,
}

/// A candidate piece of media found on a message. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    pub url: String,
    pub suggested_name: Option<String>,
    pub kind: MediaKind,
}

/// A downloaded payload ready for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    pub name: String,
    pub size_bytes: usize,
}

impl fmt::Debug for FetchedMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedMedia")
            .field("name", &self.name)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

/// A message to be posted on the target channel.
#[derive(Clone, Debug)]
pub struct OutgoingMessage {
    pub content: String,
    pub files: Vec<FetchedMedia>,
    /// Disable all mention parsing (no pings from mirrored content).
    pub suppress_mentions: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub is_text: bool,
}

/// Mapping entry between a source message and its forwarded copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardRecord {
    pub source_id: MessageId,
    pub forwarded_id: MessageId,
}
