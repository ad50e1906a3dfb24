use crate::error::BridgeError;
use crate::session::ingest::Ingestor;
use crate::session::traits::{
    OutgoingFile, ProviderChat, SessionEvent, SessionProvider,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle of the single messaging-client connection.
///
/// The pending link challenge lives inside `AwaitingLink`, so it exists
/// exactly while the session is waiting to be authorized and disappears on
/// every other transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    AwaitingLink { challenge: String },
    Ready,
    Disconnected { reason: String },
}

/// Snapshot served to the UI and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
}

/// Owns the session state machine and dispatches provider events.
///
/// One instance per process, injected wherever the session is needed.
/// `initialize` may be called concurrently and repeatedly; only the caller
/// that wins the transition into `Initializing` connects the provider, so a
/// second underlying connection is never opened.
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    ingestor: Arc<Ingestor>,
    state: Arc<Mutex<SessionState>>,
    /// Bumped on every connection attempt; event pumps from older
    /// connections notice and stand down instead of touching state.
    epoch: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn SessionProvider>, ingestor: Ingestor) -> Arc<Self> {
        Arc::new(Self {
            provider,
            ingestor: Arc::new(ingestor),
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
            epoch: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Connect the provider and start pumping its events. Idempotent: a
    /// call while already initializing, linked, or ready is a no-op.
    pub async fn initialize(&self) -> Result<(), BridgeError> {
        {
            let mut state = self.state.lock();
            match &*state {
                SessionState::Uninitialized | SessionState::Disconnected { .. } => {
                    *state = SessionState::Initializing;
                }
                _ => return Ok(()),
            }
        }

        tracing::info!("Initializing {} session", self.provider.name());
        let my_epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel(64);
        if let Err(err) = self.provider.connect(tx).await {
            *self.state.lock() = SessionState::Disconnected {
                reason: err.to_string(),
            };
            return Err(err);
        }

        tokio::spawn(pump_events(
            Arc::clone(&self.state),
            Arc::clone(&self.provider),
            Arc::clone(&self.ingestor),
            rx,
            Arc::clone(&self.epoch),
            my_epoch,
        ));
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.lock(), SessionState::Ready)
    }

    /// The pending link challenge payload, if one is live.
    pub fn challenge(&self) -> Option<String> {
        match &*self.state.lock() {
            SessionState::AwaitingLink { challenge } => Some(challenge.clone()),
            _ => None,
        }
    }

    /// The pending link challenge rendered as a scannable SVG data URL.
    pub fn challenge_data_url(&self) -> Result<Option<String>, BridgeError> {
        self.challenge()
            .map(|payload| render_challenge_svg(&payload))
            .transpose()
    }

    pub fn status(&self) -> SessionStatus {
        match &*self.state.lock() {
            SessionState::Uninitialized => SessionStatus {
                connected: false,
                message: "not initialized".into(),
                challenge: None,
            },
            SessionState::Initializing => SessionStatus {
                connected: false,
                message: "initializing session".into(),
                challenge: None,
            },
            SessionState::AwaitingLink { challenge } => SessionStatus {
                connected: false,
                message: "scan the link code to authorize this session".into(),
                challenge: Some(challenge.clone()),
            },
            SessionState::Ready => SessionStatus {
                connected: true,
                message: "connected".into(),
                challenge: None,
            },
            SessionState::Disconnected { reason } => SessionStatus {
                connected: false,
                message: format!("disconnected: {reason}"),
                challenge: None,
            },
        }
    }

    /// Hand one file to the provider. Fails fast outside `Ready`; nothing
    /// is queued.
    pub async fn send_file(&self, target: &str, file: &OutgoingFile) -> Result<(), BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::NotReady);
        }
        self.provider.send_file(target, file).await
    }

    /// Chats visible to the active session, for contact sync.
    pub async fn list_chats(&self) -> Result<Vec<ProviderChat>, BridgeError> {
        if !self.is_ready() {
            return Err(BridgeError::NotReady);
        }
        self.provider.list_chats().await
    }

    #[cfg(test)]
    pub(crate) fn state_snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }
}

async fn pump_events(
    state: Arc<Mutex<SessionState>>,
    provider: Arc<dyn SessionProvider>,
    ingestor: Arc<Ingestor>,
    mut rx: mpsc::Receiver<SessionEvent>,
    epoch: Arc<AtomicU64>,
    my_epoch: u64,
) {
    while let Some(event) = rx.recv().await {
        if epoch.load(Ordering::SeqCst) != my_epoch {
            // A newer connection took over; this pump is stale.
            return;
        }
        match event {
            SessionEvent::LinkChallenge(challenge) => {
                tracing::info!("Session link challenge received; waiting for confirmation");
                *state.lock() = SessionState::AwaitingLink { challenge };
            }
            SessionEvent::Ready => {
                tracing::info!("Session is ready");
                *state.lock() = SessionState::Ready;
            }
            SessionEvent::Disconnected(reason) => {
                tracing::warn!("Session disconnected: {reason}");
                *state.lock() = SessionState::Disconnected { reason };
            }
            SessionEvent::AuthFailure(reason) => {
                tracing::error!("Session authentication failure: {reason}");
                *state.lock() = SessionState::Disconnected {
                    reason: format!("authentication failure: {reason}"),
                };
            }
            SessionEvent::Media(inbound) => {
                // Each capture runs as its own task so a slow download
                // cannot hold up delivery of the next event.
                let provider = Arc::clone(&provider);
                let ingestor = Arc::clone(&ingestor);
                tokio::spawn(async move {
                    if let Err(err) = ingestor.ingest(provider, inbound).await {
                        tracing::error!("Failed to capture inbound media: {err}");
                    }
                });
            }
        }
    }

    // The provider dropped its sender: the connection is gone. A stale
    // pump leaves the newer connection's state alone.
    if epoch.load(Ordering::SeqCst) != my_epoch {
        return;
    }
    let mut state = state.lock();
    if !matches!(
        &*state,
        SessionState::Disconnected { .. } | SessionState::Uninitialized
    ) {
        *state = SessionState::Disconnected {
            reason: "event stream closed".into(),
        };
    }
}

/// Render a link-challenge payload as an SVG data URL the UI can show in an
/// `<img>` tag.
pub fn render_challenge_svg(payload: &str) -> Result<String, BridgeError> {
    use base64::Engine as _;

    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::Validation("link challenge payload is empty".into()));
    }
    let code = qrcode::QrCode::new(trimmed.as_bytes())
        .map_err(|err| BridgeError::Storage(format!("failed to encode link challenge: {err}")))?;
    let svg = code
        .render::<qrcode::render::svg::Color>()
        .min_dimensions(240, 240)
        .quiet_zone(true)
        .build();
    let encoded = base64::engine::general_purpose::STANDARD.encode(svg);
    Ok(format!("data:image/svg+xml;base64,{encoded}"))
}
