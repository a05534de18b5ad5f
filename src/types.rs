use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Name of one cached group of records, e.g. `/api/grocery-lists`.
pub type CollectionKey = Arc<str>;

/// Read-only view of one cache slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: CollectionKey,
    pub value: Option<T>,
    pub is_fetching: bool,
    pub is_stale: bool,
    /// Number of `invalidate` calls the slot has seen.
    pub invalidations: u64,
}

/// Server to client message on the invalidation channel.
///
/// Carries only the key; receivers refetch instead of trusting a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelMessage {
    Invalidate {
        #[serde(rename = "queryKey", alias = "collectionKey")]
        query_key: String,
    },
}

impl ChannelMessage {
    pub fn invalidate(key: &str) -> Self {
        ChannelMessage::Invalidate {
            query_key: key.to_string(),
        }
    }
}
