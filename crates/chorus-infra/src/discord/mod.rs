//! Discord REST (v10) platform adapter.
//!
//! Implements the [`ChatPlatform`](chorus_core::platform::ChatPlatform)
//! primitives over plain HTTPS, and polls watched channels for new
//! messages to feed `PersonaRuntime::run_events`.

pub mod client;
pub mod poller;
pub mod types;

pub use client::DiscordRestPlatform;
pub use poller::spawn_channel_poller;
