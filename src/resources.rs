//! The family hub's resource families: where each one is mutated, which
//! collection key caches it, and how an optimistic write reshapes that
//! collection.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};

use crate::mutation::MutationRequest;
use crate::patch::{has_id, FlatCollection, NestedCollection, OptimisticPatch};
use crate::types::CollectionKey;

pub const GROCERY_LISTS: &str = "/api/grocery-lists";
pub const CALENDAR_EVENTS: &str = "/api/calendar-events";
pub const FAMILY_IDEAS: &str = "/api/family-ideas";
pub const VISION_ITEMS: &str = "/api/vision-items";
pub const WISHLIST_ITEMS: &str = "/api/wishlist-items";
pub const RECIPES: &str = "/api/recipes";
pub const FAMILY_MEMBERS: &str = "/api/family-members";
pub const FAMILY: &str = "/api/family";
pub const AUTH_USER: &str = "/api/auth/user";
pub const CHAT_MESSAGES: &str = "/api/chat-messages";

#[derive(Debug, Clone, Default)]
pub struct SuccessMessages {
    pub created: Option<&'static str>,
    pub updated: Option<&'static str>,
    pub deleted: Option<&'static str>,
}

/// One mutable resource family.
#[derive(Clone)]
pub struct Resource {
    pub endpoint: &'static str,
    pub collection_key: CollectionKey,
    pub patch: Arc<dyn OptimisticPatch>,
    pub messages: SuccessMessages,
}

impl Resource {
    fn flat(endpoint: &'static str, messages: SuccessMessages) -> Self {
        Self {
            endpoint,
            collection_key: Arc::from(endpoint),
            patch: Arc::new(FlatCollection),
            messages,
        }
    }

    pub fn grocery_lists() -> Self {
        Self::flat(
            GROCERY_LISTS,
            SuccessMessages {
                created: Some("Grocery list created successfully!"),
                updated: Some("Grocery list updated successfully!"),
                deleted: Some("Grocery list deleted successfully!"),
            },
        )
    }

    /// Items live inside their list's `items`, so they share the lists' key.
    pub fn grocery_items() -> Self {
        Self {
            endpoint: "/api/grocery-items",
            collection_key: Arc::from(GROCERY_LISTS),
            patch: Arc::new(NestedCollection {
                children: "items",
                parent_ref: "listId",
            }),
            messages: SuccessMessages {
                deleted: Some("Item deleted successfully!"),
                ..SuccessMessages::default()
            },
        }
    }

    pub fn calendar_events() -> Self {
        Self::flat(
            CALENDAR_EVENTS,
            SuccessMessages {
                created: Some("Calendar event created successfully!"),
                updated: Some("Event updated successfully!"),
                deleted: Some("Event deleted successfully!"),
            },
        )
    }

    pub fn family_ideas() -> Self {
        Self::flat(
            FAMILY_IDEAS,
            SuccessMessages {
                created: Some("Idea created successfully!"),
                ..SuccessMessages::default()
            },
        )
    }

    pub fn vision_items() -> Self {
        Self::flat(
            VISION_ITEMS,
            SuccessMessages {
                created: Some("Vision item created successfully!"),
                updated: Some("Vision item updated successfully!"),
                deleted: Some("Vision item deleted successfully!"),
            },
        )
    }

    pub fn wishlist_items() -> Self {
        Self::flat(
            WISHLIST_ITEMS,
            SuccessMessages {
                created: Some("Wishlist item created successfully!"),
                updated: Some("Wishlist item updated successfully!"),
                deleted: Some("Wishlist item deleted successfully!"),
            },
        )
    }

    pub fn recipes() -> Self {
        Self::flat(
            RECIPES,
            SuccessMessages {
                created: Some("Recipe created!"),
                updated: Some("Recipe updated!"),
                deleted: Some("Recipe deleted!"),
            },
        )
    }

    pub fn family_members() -> Self {
        Self::flat(FAMILY_MEMBERS, SuccessMessages::default())
    }

    /// Posting to `/api/chat` stores the user's message and the assistant's
    /// reply, both of which show up under `/api/chat-messages`.
    pub fn chat() -> Self {
        Self {
            endpoint: "/api/chat",
            collection_key: Arc::from(CHAT_MESSAGES),
            patch: Arc::new(FlatCollection),
            messages: SuccessMessages::default(),
        }
    }

    pub fn record_path(&self, id: &str) -> String {
        format!("{}/{}", self.endpoint, id)
    }
}

/// Flips `userLiked` on one idea and moves its like count to match.
pub fn toggle_like(current: Option<Value>, id: &str) -> Value {
    let ideas = match current {
        Some(Value::Array(ideas)) => ideas,
        other => return other.unwrap_or_else(|| Value::Array(Vec::new())),
    };
    let ideas = ideas
        .into_iter()
        .map(|mut idea| {
            if has_id(&idea, id) {
                let liked = idea.get("userLiked").and_then(Value::as_bool).unwrap_or(false);
                let likes = idea.get("likes").and_then(Value::as_i64).unwrap_or(0);
                idea["userLiked"] = json!(!liked);
                idea["likes"] = json!(if liked { likes - 1 } else { likes + 1 });
            }
            idea
        })
        .collect();
    Value::Array(ideas)
}

pub fn like_idea(idea_id: &str) -> MutationRequest {
    MutationRequest {
        method: Method::POST,
        path: format!("{FAMILY_IDEAS}/{idea_id}/like"),
        body: None,
        collection_key: Arc::from(FAMILY_IDEAS),
        success_message: None,
    }
}

/// Copies a recipe's ingredients into a grocery list. Nothing is predicted
/// locally; the settle-time invalidation brings the new items in.
pub fn add_recipe_to_grocery_list(recipe_id: &str, list_id: &str) -> MutationRequest {
    MutationRequest {
        method: Method::POST,
        path: format!("{RECIPES}/{recipe_id}/to-grocery-list"),
        body: Some(json!({ "listId": list_id })),
        collection_key: Arc::from(GROCERY_LISTS),
        success_message: Some("Ingredients added to grocery list!".into()),
    }
}
