//! Forward-state reconciliation.
//!
//! Every create/edit/delete on a source message is turned into the matching
//! send/delete on the target channel. Per source id the state is either
//! "no record" or "forwarded as message X"; a record is written only after a
//! send succeeded and removed as soon as its forwarded message was deleted.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use crate::{
    config::Config,
    domain::{
        ChannelId, ChannelInfo, ForwardRecord, MediaRef, MessageId, OutgoingMessage,
        SourceMessage, UpdatedMessage,
    },
    errors::Error,
    extract::MediaExtractor,
    fetch::{FetchOutcome, MediaFetcher},
    gateway::GatewayPort,
    header::{format_header, format_text_fallback},
    locks::KeyedLocks,
    store::ForwardStore,
    Result,
};

/// Discord's message content limit.
const MAX_CONTENT_LEN: usize = 2000;

#[derive(Clone, Debug)]
pub struct ForwardSettings {
    pub source_channels: HashSet<ChannelId>,
    pub target_channel: ChannelId,
    pub embed_link_hops: u8,
}

impl ForwardSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            source_channels: cfg.source_channels.iter().copied().collect(),
            target_channel: cfg.target_channel,
            embed_link_hops: cfg.embed_link_hops,
        }
    }

    pub fn is_monitored(&self, channel: Option<ChannelId>) -> bool {
        channel.is_some_and(|c| self.source_channels.contains(&c))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    FromBot,
    UnmonitoredChannel,
    NoMedia,
    AlreadyForwarded,
}

/// What a single event did to the mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Ignored(IgnoreReason),
    Forwarded {
        forwarded_id: MessageId,
        files: usize,
    },
    Reforwarded {
        previous_id: MessageId,
        forwarded_id: MessageId,
        files: usize,
    },
    Withdrawn {
        forwarded_id: MessageId,
    },
    /// The event concerned a message with no forwarded copy; nothing to do.
    Untracked,
}

pub struct ForwardEngine {
    gateway: Arc<dyn GatewayPort>,
    fetcher: MediaFetcher,
    settings: ForwardSettings,
    store: ForwardStore,
    locks: KeyedLocks<MessageId>,
}

impl ForwardEngine {
    pub fn new(
        gateway: Arc<dyn GatewayPort>,
        fetcher: MediaFetcher,
        settings: ForwardSettings,
    ) -> Self {
        Self {
            gateway,
            fetcher,
            settings,
            store: ForwardStore::new(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn settings(&self) -> &ForwardSettings {
        &self.settings
    }

    pub fn store(&self) -> &ForwardStore {
        &self.store
    }

    /// Verify the target channel exists and accepts messages.
    pub async fn check_target(&self) -> Result<ChannelInfo> {
        let info = self
            .gateway
            .fetch_channel(self.settings.target_channel)
            .await?;
        if !info.is_text {
            return Err(Error::Config(format!(
                "target channel {} is not a text channel",
                info.id
            )));
        }
        Ok(info)
    }

    pub async fn on_create(&self, msg: &SourceMessage) -> Result<Transition> {
        if let Some(reason) = self.gate(msg) {
            return Ok(Transition::Ignored(reason));
        }

        let _guard = self.locks.lock(msg.id).await;

        // Replayed create for a message we already mirrored.
        if self.store.get(msg.id).is_some() {
            return Ok(Transition::Ignored(IgnoreReason::AlreadyForwarded));
        }

        let refs = self.extract(msg).await;
        if refs.is_empty() {
            return Ok(Transition::Ignored(IgnoreReason::NoMedia));
        }

        let outgoing = self.prepare(msg, &refs, false).await;
        let files = outgoing.files.len();
        let forwarded_id = self.send(outgoing).await?;
        self.store.insert(msg.id, forwarded_id);

        Ok(Transition::Forwarded {
            forwarded_id,
            files,
        })
    }

    /// Reconcile an edited message. Attachments can't be edited in place, so
    /// a forward whose media survives the edit is deleted and sent again.
    pub async fn on_update(&self, new: UpdatedMessage) -> Result<Transition> {
        let _guard = self.locks.lock(new.id()).await;

        let msg = match new {
            UpdatedMessage::Full(m) => m,
            UpdatedMessage::Partial { channel_id, id } => {
                // Skip the fetch for channels we never forward from.
                if !self.settings.is_monitored(Some(channel_id)) {
                    return Ok(Transition::Ignored(IgnoreReason::UnmonitoredChannel));
                }
                self.gateway.fetch_message(channel_id, id).await?
            }
        };

        if let Some(reason) = self.gate(&msg) {
            return Ok(Transition::Ignored(reason));
        }

        let refs = self.extract(&msg).await;
        if refs.is_empty() {
            return Ok(match self.store.get(msg.id) {
                Some(record) => {
                    self.withdraw(record).await;
                    Transition::Withdrawn {
                        forwarded_id: record.forwarded_id,
                    }
                }
                None => Transition::Untracked,
            });
        }

        // Download before touching the old copy to keep the gap short.
        let outgoing = self.prepare(&msg, &refs, true).await;
        let previous = self.store.get(msg.id);
        if let Some(record) = previous {
            self.withdraw(record).await;
        }

        let files = outgoing.files.len();
        let forwarded_id = self.send(outgoing).await?;
        self.store.insert(msg.id, forwarded_id);

        Ok(match previous {
            Some(record) => Transition::Reforwarded {
                previous_id: record.forwarded_id,
                forwarded_id,
                files,
            },
            None => Transition::Forwarded {
                forwarded_id,
                files,
            },
        })
    }

    pub async fn on_delete(&self, source_id: MessageId) -> Transition {
        let _guard = self.locks.lock(source_id).await;

        let Some(record) = self.store.get(source_id) else {
            return Transition::Untracked;
        };
        self.withdraw(record).await;
        Transition::Withdrawn {
            forwarded_id: record.forwarded_id,
        }
    }

    pub async fn on_bulk_delete(&self, source_ids: &[MessageId]) -> Vec<Transition> {
        let mut out = Vec::with_capacity(source_ids.len());
        for id in source_ids {
            out.push(self.on_delete(*id).await);
        }
        out
    }

    fn gate(&self, msg: &SourceMessage) -> Option<IgnoreReason> {
        if msg.is_from_bot() {
            return Some(IgnoreReason::FromBot);
        }
        if !self.settings.is_monitored(msg.channel_id) {
            return Some(IgnoreReason::UnmonitoredChannel);
        }
        None
    }

    async fn extract(&self, msg: &SourceMessage) -> Vec<MediaRef> {
        MediaExtractor::new(self.gateway.as_ref(), self.settings.embed_link_hops)
            .extract(msg)
            .await
    }

    async fn prepare(
        &self,
        msg: &SourceMessage,
        refs: &[MediaRef],
        edited: bool,
    ) -> OutgoingMessage {
        let header = format_header(msg, edited);

        let (content, files) = match self.fetcher.fetch_all(refs).await {
            FetchOutcome::Complete(media) => (header, media),
            FetchOutcome::Partial { media, dropped } => {
                debug!(message_id = %msg.id, dropped, "forwarding partial media set");
                (header, media)
            }
            FetchOutcome::Failed => {
                debug!(message_id = %msg.id, refs = refs.len(), "no media fetched, forwarding links");
                let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
                (format_text_fallback(&header, &urls, MAX_CONTENT_LEN), Vec::new())
            }
        };

        OutgoingMessage {
            content,
            files,
            suppress_mentions: true,
        }
    }

    async fn send(&self, outgoing: OutgoingMessage) -> Result<MessageId> {
        self.gateway
            .send_message(self.settings.target_channel, outgoing)
            .await
    }

    /// Best-effort delete of the forwarded copy, then drop the record.
    async fn withdraw(&self, record: ForwardRecord) {
        match self
            .gateway
            .delete_message(self.settings.target_channel, record.forwarded_id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(forwarded_id = %record.forwarded_id, "forwarded message already gone");
            }
            Err(e) => {
                warn!(forwarded_id = %record.forwarded_id, error = %e, "failed to delete forwarded message");
            }
        }
        self.store.remove(record.source_id);
    }
}
