use std::{collections::HashMap, sync::Mutex};

use crate::domain::{ForwardRecord, MessageId};

/// In-memory source → forwarded mapping.
///
/// Owned by the engine; resets on restart. The lock is never held across an
/// await point.
#[derive(Default)]
pub struct ForwardStore {
    records: Mutex<HashMap<MessageId, ForwardRecord>>,
}

impl ForwardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_id: MessageId) -> Option<ForwardRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&source_id)
            .copied()
    }

    /// Insert or replace the record for `source_id`. Returns the previous record.
    pub fn insert(&self, source_id: MessageId, forwarded_id: MessageId) -> Option<ForwardRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                source_id,
                ForwardRecord {
                    source_id,
                    forwarded_id,
                },
            )
    }

    pub fn remove(&self, source_id: MessageId) -> Option<ForwardRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&source_id)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_record_per_source() {
        let store = ForwardStore::new();
        assert!(store.insert(MessageId(1), MessageId(100)).is_none());

        let prev = store.insert(MessageId(1), MessageId(101)).unwrap();
        assert_eq!(prev.forwarded_id, MessageId(100));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(MessageId(1)).unwrap().forwarded_id, MessageId(101));

        assert!(store.remove(MessageId(1)).is_some());
        assert!(store.remove(MessageId(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_resets() {
        let store = ForwardStore::new();
        store.insert(MessageId(1), MessageId(2));
        store.insert(MessageId(3), MessageId(4));
        store.clear();
        assert!(store.get(MessageId(1)).is_none());
        assert_eq!(store.len(), 0);
    }
}
