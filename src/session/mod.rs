pub mod cloud;
pub mod ingest;
pub mod manager;
pub mod traits;

pub use cloud::CloudProvider;
pub use ingest::Ingestor;
pub use manager::{render_challenge_svg, SessionManager, SessionState, SessionStatus};
pub use traits::{
    InboundMedia, MediaRef, OutgoingFile, ProviderChat, SessionEvent, SessionProvider,
};

use crate::error::BridgeError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Stand-in provider for deployments with no messaging binding configured.
/// Initialization fails with a pointer at the config knob; the session then
/// sits in `Disconnected` and all sends report `NotReady`.
pub struct NullProvider;

const NO_PROVIDER: &str = "no session provider is configured; set [session] provider = \"cloud\"";

#[async_trait]
impl SessionProvider for NullProvider {
    fn name(&self) -> &str {
        "none"
    }

    async fn connect(&self, _events: mpsc::Sender<SessionEvent>) -> Result<(), BridgeError> {
        Err(BridgeError::Transport(NO_PROVIDER.into()))
    }

    async fn send_file(&self, _target: &str, _file: &OutgoingFile) -> Result<(), BridgeError> {
        Err(BridgeError::Transport(NO_PROVIDER.into()))
    }

    async fn fetch_media(&self, _media: &MediaRef) -> Result<Vec<u8>, BridgeError> {
        Err(BridgeError::Transport(NO_PROVIDER.into()))
    }

    async fn list_chats(&self) -> Result<Vec<ProviderChat>, BridgeError> {
        Err(BridgeError::Unsupported(NO_PROVIDER.into()))
    }
}
