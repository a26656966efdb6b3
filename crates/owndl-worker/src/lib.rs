#![deny(missing_docs)]
//! OwnDownloader worker.
//!
//! Connects to the relay, registers for one platform and answers every
//! dispatched link with the media a third-party resolver returns. Resolver
//! calls go through a single-flight FIFO queue with retries.

/// Worker settings.
pub mod config;
/// Relay connection and reconnect loop.
pub mod connection;
/// Worker error types.
pub mod error;
/// Single-flight request queue.
pub mod queue;
/// Third-party resolver client.
pub mod resolver;
