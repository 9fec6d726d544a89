use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use serenity::all::{
    Context, EventHandler, GuildId, Message, MessageUpdateEvent, Ready,
};
use tracing::{debug, error, info, warn};

use mirror_core::{
    domain::{MessageId, UpdatedMessage},
    engine::{ForwardEngine, Transition},
    Result,
};

use crate::{source_message, updated_message};

/// Feeds gateway events into the forward engine.
pub struct MirrorHandler {
    engine: Arc<ForwardEngine>,
}

impl MirrorHandler {
    pub fn new(engine: Arc<ForwardEngine>) -> Self {
        Self { engine }
    }
}

/// Run one event transition on its own task so a panic stays contained
/// and the gateway keeps receiving events.
async fn contained<T, F>(event: &'static str, message_id: MessageId, fut: F) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(v) => Some(v),
        Err(e) if e.is_panic() => {
            error!(event, %message_id, "event handler panicked");
            None
        }
        Err(e) => {
            warn!(event, %message_id, error = %e, "event handler cancelled");
            None
        }
    }
}

fn log_transition(event: &'static str, message_id: MessageId, t: Transition) {
    match t {
        Transition::Forwarded {
            forwarded_id,
            files,
        } => info!(event, %message_id, %forwarded_id, files, "forwarded"),
        Transition::Reforwarded {
            previous_id,
            forwarded_id,
            files,
        } => info!(event, %message_id, %previous_id, %forwarded_id, files, "re-forwarded"),
        Transition::Withdrawn { forwarded_id } => {
            info!(event, %message_id, %forwarded_id, "withdrew forwarded copy")
        }
        Transition::Ignored(reason) => debug!(event, %message_id, ?reason, "ignored"),
        Transition::Untracked => debug!(event, %message_id, "no forwarded copy"),
    }
}

fn log_result(event: &'static str, message_id: MessageId, res: Option<Result<Transition>>) {
    match res {
        Some(Ok(t)) => log_transition(event, message_id, t),
        Some(Err(e)) => error!(event, %message_id, error = %e, "event handling failed"),
        None => {}
    }
}

#[async_trait]
impl EventHandler for MirrorHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "connected to discord"
        );

        match self.engine.check_target().await {
            Ok(target) => info!(target_channel = %target.id, "target channel ok"),
            Err(e) => error!(error = %e, "target channel check failed"),
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let source = source_message(&msg);
        let id = source.id;
        let engine = Arc::clone(&self.engine);
        let res = contained("create", id, async move { engine.on_create(&source).await }).await;
        log_result("create", id, res);
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let update = match new {
            Some(m) => UpdatedMessage::Full(source_message(&m)),
            None => updated_message(&event),
        };
        let id = update.id();
        let engine = Arc::clone(&self.engine);
        let res = contained("update", id, async move { engine.on_update(update).await }).await;
        log_result("update", id, res);
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        _channel_id: serenity::all::ChannelId,
        deleted_message_id: serenity::all::MessageId,
        _guild_id: Option<GuildId>,
    ) {
        let id = MessageId(deleted_message_id.get());
        let engine = Arc::clone(&self.engine);
        if let Some(t) = contained("delete", id, async move { engine.on_delete(id).await }).await {
            log_transition("delete", id, t);
        }
    }

    async fn message_delete_bulk(
        &self,
        _ctx: Context,
        _channel_id: serenity::all::ChannelId,
        multiple_deleted_messages_ids: Vec<serenity::all::MessageId>,
        _guild_id: Option<GuildId>,
    ) {
        let ids: Vec<MessageId> = multiple_deleted_messages_ids
            .iter()
            .map(|m| MessageId(m.get()))
            .collect();
        let Some(first) = ids.first().copied() else {
            return;
        };

        let engine = Arc::clone(&self.engine);
        let batch = ids.clone();
        let res = contained("bulk_delete", first, async move {
            engine.on_bulk_delete(&batch).await
        })
        .await;

        if let Some(transitions) = res {
            for (id, t) in ids.into_iter().zip(transitions) {
                log_transition("bulk_delete", id, t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn contained_returns_value() {
        let out = contained("create", MessageId(1), async { 7 }).await;
        assert_eq!(out, Some(7));
    }

    #[tokio::test]
    async fn contained_swallows_panics() {
        let out: Option<u8> = contained("create", MessageId(1), async {
            panic!("boom");
        })
        .await;
        assert_eq!(out, None);
    }
}
