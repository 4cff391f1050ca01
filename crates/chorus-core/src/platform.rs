//! ChatPlatform trait definition.
//!
//! The narrow interface through which a persona talks to its messaging
//! platform. Connection, authentication and event delivery belong to the
//! implementation; the core only needs these send/fetch primitives.

use chorus_types::error::PlatformError;
use chorus_types::platform::{ChannelInfo, IncomingMessage, PlatformUser};

/// Messaging platform primitives for one logged-in persona account.
///
/// Every operation may fail; callers recover by fallback or skip and never
/// let a `PlatformError` escape into message handling.
///
/// Implementations live in chorus-infra (e.g., `DiscordRestPlatform`).
pub trait ChatPlatform: Send + Sync + 'static {
    /// The account this connection is logged in as.
    fn self_user(&self) -> &PlatformUser;

    /// Post a plain message to a channel. Returns the new message id.
    fn send_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> impl std::future::Future<Output = Result<String, PlatformError>> + Send;

    /// Post a message as a reply to `message_id`. Returns the new message id.
    fn reply_to(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> impl std::future::Future<Output = Result<String, PlatformError>> + Send;

    /// Show the typing indicator in a channel.
    fn send_typing(
        &self,
        channel_id: &str,
    ) -> impl std::future::Future<Output = Result<(), PlatformError>> + Send;

    fn fetch_channel(
        &self,
        channel_id: &str,
    ) -> impl std::future::Future<Output = Result<ChannelInfo, PlatformError>> + Send;

    fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> impl std::future::Future<Output = Result<IncomingMessage, PlatformError>> + Send;
}
