//! Which cached collections a mutating request path affects.
//!
//! Matching is by static path prefix and deliberately coarse: a change to a
//! single child record invalidates its whole parent collection.

use std::sync::Arc;

use crate::resources::{
    AUTH_USER, CALENDAR_EVENTS, CHAT_MESSAGES, FAMILY, FAMILY_IDEAS, FAMILY_MEMBERS,
    GROCERY_LISTS, RECIPES, VISION_ITEMS, WISHLIST_ITEMS,
};
use crate::types::CollectionKey;

const PREFIXES: &[(&str, &[&str])] = &[
    ("/api/grocery-items", &[GROCERY_LISTS]),
    ("/api/grocery-lists", &[GROCERY_LISTS]),
    ("/api/calendar-events", &[CALENDAR_EVENTS]),
    ("/api/family-ideas", &[FAMILY_IDEAS]),
    ("/api/vision-items", &[VISION_ITEMS]),
    ("/api/wishlist-items", &[WISHLIST_ITEMS]),
    ("/api/family-members", &[FAMILY_MEMBERS]),
    // create/join change both the family and the caller's own membership
    ("/api/family/", &[FAMILY, AUTH_USER]),
];

/// Returns the collection keys to invalidate after a successful mutation on
/// `path`. Unknown paths map to nothing.
pub fn collection_keys_for(path: &str) -> Vec<CollectionKey> {
    keys_for(path).iter().map(|key| Arc::from(*key)).collect()
}

fn keys_for(path: &str) -> &'static [&'static str] {
    if path == "/api/chat" {
        return &[CHAT_MESSAGES];
    }
    if path.starts_with("/api/recipes") {
        if path.ends_with("/to-grocery-list") {
            return &[GROCERY_LISTS];
        }
        return &[RECIPES];
    }
    PREFIXES
        .iter()
        .find(|(prefix, _)| path.starts_with(prefix))
        .map(|&(_, keys)| keys)
        .unwrap_or(&[])
}
