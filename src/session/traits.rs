use crate::error::BridgeError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Reference to a media payload still held by the provider.
#[derive(Debug, Clone)]
pub struct MediaRef {
    /// Provider-side id used to fetch the bytes.
    pub provider_id: String,
    pub mime_type: String,
    pub file_name: Option<String>,
}

/// An inbound message carrying media, as delivered by the provider.
#[derive(Debug, Clone)]
pub struct InboundMedia {
    /// External identity of the sender (JID-like string).
    pub sender: String,
    pub sender_name: Option<String>,
    /// The originating chat (equals `sender` for direct messages).
    pub chat: String,
    pub is_group: bool,
    pub media: MediaRef,
}

/// A file handed to the provider for delivery.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime_type: String,
    pub caption: Option<String>,
}

/// A chat/conversation visible to the active session.
#[derive(Debug, Clone)]
pub struct ProviderChat {
    pub address: String,
    pub display_name: String,
    pub is_group: bool,
    pub group_id: Option<String>,
}

/// Lifecycle and inbound events a provider emits after `connect`.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A link challenge (QR payload) that must be confirmed on the phone.
    LinkChallenge(String),
    Ready,
    Disconnected(String),
    AuthFailure(String),
    Media(InboundMedia),
}

/// Capability boundary to the messaging network. The wire protocol behind
/// it (pairing crypto, media transport) is the provider's business; the
/// bridge only consumes this surface.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Short provider name for logs and status output.
    fn name(&self) -> &str;

    /// Start the provider and begin emitting events on `events`. Returns
    /// once the connection attempt is under way; long-running work happens
    /// on the provider's own tasks.
    async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), BridgeError>;

    /// Deliver one file to one target identity.
    async fn send_file(&self, target: &str, file: &OutgoingFile) -> Result<(), BridgeError>;

    /// Download the raw bytes behind an inbound media reference.
    async fn fetch_media(&self, media: &MediaRef) -> Result<Vec<u8>, BridgeError>;

    /// Chats visible to the active session, for contact sync.
    async fn list_chats(&self) -> Result<Vec<ProviderChat>, BridgeError>;
}
