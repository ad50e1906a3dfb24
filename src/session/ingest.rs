use crate::audit::AuditLog;
use crate::contacts::ContactResolver;
use crate::db::{Direction, Outcome, TransferLogEntry};
use crate::error::BridgeError;
use crate::session::traits::{InboundMedia, MediaRef, SessionProvider};
use crate::storage::StorageService;
use std::sync::Arc;

/// Inbound capture pipeline: download the media, place the bytes, resolve
/// the sender to a contact, journal the receive.
pub struct Ingestor {
    storage: Arc<StorageService>,
    contacts: Arc<ContactResolver>,
    audit: Arc<AuditLog>,
}

impl Ingestor {
    pub fn new(
        storage: Arc<StorageService>,
        contacts: Arc<ContactResolver>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            storage,
            contacts,
            audit,
        }
    }

    pub async fn ingest(
        &self,
        provider: Arc<dyn SessionProvider>,
        inbound: InboundMedia,
    ) -> Result<TransferLogEntry, BridgeError> {
        let bytes = provider.fetch_media(&inbound.media).await?;

        let original_name = inbound
            .media
            .file_name
            .clone()
            .unwrap_or_else(|| fallback_name(&inbound.media));
        let artifact = self
            .storage
            .place(&bytes, &original_name, &inbound.media.mime_type)
            .await?;

        // Addresses are stored without their domain suffix; the suffix is
        // re-derived from `is_group` at send time.
        let address = inbound
            .sender
            .split('@')
            .next()
            .unwrap_or(&inbound.sender)
            .to_string();
        let hint = inbound
            .sender_name
            .clone()
            .unwrap_or_else(|| inbound.sender.clone());
        let contact = self
            .contacts
            .find_or_create(&address, &hint, inbound.is_group, None)?;

        let entry = self.audit.append(
            Direction::Receive,
            &artifact.id,
            &contact.id,
            Outcome::Success,
            None,
        )?;
        tracing::info!(
            "Captured '{}' ({} bytes) from {}",
            artifact.original_name,
            artifact.size_bytes,
            contact.display_name
        );
        Ok(entry)
    }
}

fn fallback_name(media: &MediaRef) -> String {
    let ext = mime_guess::get_mime_extensions_str(&media.mime_type)
        .and_then(|exts| exts.first())
        .map_or("bin", |e| *e);
    format!("{}.{ext}", media.provider_id)
}
