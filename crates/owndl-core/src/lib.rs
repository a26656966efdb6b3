#![deny(missing_docs)]
//! OwnDownloader relay core.
//!
//! Worker registry, link dispatch, reply decoding and media assembly shared by
//! the chat transports. Nothing in here knows about a concrete chat platform:
//! delivery and user preferences are reached through the [`delivery::ChatDelivery`]
//! and [`preferences::PreferenceStore`] traits.

/// Media batching, caption composition and local file cleanup.
pub mod assembly;
/// Configuration management and delivery limits.
pub mod config;
/// Chat delivery interface.
pub mod delivery;
/// Link dispatch to registered workers.
pub mod dispatch;
/// Error types shared by the relay.
pub mod error;
/// Worker reply handling.
pub mod handler;
/// Periodic stale file sweep.
pub mod janitor;
/// Platform link extraction.
pub mod links;
/// Per-chat signature preference storage.
pub mod preferences;
/// Relay/worker wire protocol.
pub mod protocol;
/// Registry of connected workers.
pub mod registry;
/// WebSocket relay endpoint.
pub mod server;
/// Text splitting and file helpers.
pub mod utils;

#[cfg(test)]
pub mod testing;
