//! In-memory fakes for the gateway and media ports.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChannelInfo, MessageId, OutgoingMessage, SourceMessage},
    errors::Error,
    fetch::{MediaSource, Payload},
    gateway::GatewayPort,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Send(ChannelId, MessageId),
    Delete(ChannelId, MessageId),
}

#[derive(Default)]
pub struct FakeGateway {
    next_id: Mutex<u64>,
    messages: Mutex<HashMap<MessageId, SourceMessage>>,
    channels: Mutex<HashMap<ChannelId, ChannelInfo>>,
    fetched: Mutex<Vec<MessageId>>,
    sends: Mutex<Vec<OutgoingMessage>>,
    calls: Mutex<Vec<Call>>,
    already_deleted: Mutex<HashSet<MessageId>>,
    fail_sends: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Default::default()
        }
    }

    pub fn put_message(&self, msg: SourceMessage) {
        self.messages.lock().unwrap().insert(msg.id, msg);
    }

    pub fn put_channel(&self, info: ChannelInfo) {
        self.channels.lock().unwrap().insert(info.id, info);
    }

    /// Simulate a forwarded message removed by someone else.
    pub fn mark_deleted(&self, id: MessageId) {
        self.already_deleted.lock().unwrap().insert(id);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fetched_messages(&self) -> Vec<MessageId> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<OutgoingMessage> {
        self.sends.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<MessageId> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(_, id) => Some(id),
                Call::Send(..) => None,
            })
            .collect()
    }
}

#[async_trait]
impl GatewayPort for FakeGateway {
    async fn fetch_channel(&self, channel: ChannelId) -> Result<ChannelInfo> {
        self.channels
            .lock()
            .unwrap()
            .get(&channel)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("channel {channel}")))
    }

    async fn fetch_message(&self, _channel: ChannelId, id: MessageId) -> Result<SourceMessage> {
        self.fetched.lock().unwrap().push(id);
        self.messages
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("message {id}")))
    }

    async fn send_message(&self, channel: ChannelId, msg: OutgoingMessage) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::External("send rejected".to_string()));
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            MessageId(*next)
        };
        self.sends.lock().unwrap().push(msg);
        self.calls.lock().unwrap().push(Call::Send(channel, id));
        Ok(id)
    }

    async fn delete_message(&self, channel: ChannelId, id: MessageId) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Delete(channel, id));
        if !self.already_deleted.lock().unwrap().insert(id) {
            return Err(Error::NotFound(format!("message {id}")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSource {
    payloads: Mutex<HashMap<String, Payload>>,
    requests: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, url: &str, bytes: Vec<u8>, content_type: Option<&str>) {
        self.payloads.lock().unwrap().insert(
            url.to_string(),
            Payload {
                bytes,
                content_type: content_type.map(|s| s.to_string()),
            },
        );
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn get(&self, url: &str, _max_bytes: usize) -> Result<Payload> {
        self.requests.lock().unwrap().push(url.to_string());
        self.payloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::NotFound(url.to_string()))
    }
}
