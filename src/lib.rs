//! Keeps every family member's view of the shared lists, calendar and boards
//! in step.
//!
//! The client half writes mutations into a local [`cache::QueryCache`] before
//! the server answers, rolls back on failure and always invalidates on
//! settle. The server half ([`server`]) proxies the family API and, after
//! each successful mutation, pushes an invalidation notice for the affected
//! collections to every connected client, whose [`channel`] listener marks
//! them stale and refetches.

pub mod broadcast;
pub mod cache;
pub mod channel;
pub mod config;
pub mod core_client;
pub mod error;
pub mod invalidation;
pub mod mutation;
pub mod patch;
pub mod request;
pub mod resources;
pub mod routes;
pub mod server;
pub mod types;
pub mod ws_gateway;
