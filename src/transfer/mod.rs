//! Transfer orchestration: one artifact, N recipients, independent failure
//! isolation.
//!
//! The orchestrator's core guarantee: one recipient's failure never aborts
//! processing of the rest, and the caller gets exactly one result per input
//! contact id, in input order. The whole call only fails when the artifact
//! itself cannot be resolved.

use crate::audit::AuditLog;
use crate::contacts::ContactResolver;
use crate::db::{Artifact, Contact, Direction, Outcome, Tier};
use crate::error::BridgeError;
use crate::session::{OutgoingFile, SessionManager};
use crate::storage::{Readable, StorageService};
use serde::Serialize;
use std::sync::Arc;

/// Per-recipient outcome of a fan-out send.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientResult {
    pub contact_id: String,
    pub contact_name: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

pub struct TransferOrchestrator {
    storage: Arc<StorageService>,
    contacts: Arc<ContactResolver>,
    session: Arc<SessionManager>,
    audit: Arc<AuditLog>,
}

impl TransferOrchestrator {
    pub fn new(
        storage: Arc<StorageService>,
        contacts: Arc<ContactResolver>,
        session: Arc<SessionManager>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            storage,
            contacts,
            session,
            audit,
        }
    }

    /// Send one artifact to each contact id in order. Recipients are
    /// processed sequentially; there is no mid-flight cancellation.
    pub async fn send_file(
        &self,
        artifact_id: &str,
        contact_ids: &[String],
    ) -> Result<Vec<RecipientResult>, BridgeError> {
        let artifact = self
            .storage
            .get(artifact_id)?
            .ok_or_else(|| BridgeError::not_found("File not found"))?;

        let mut results = Vec::with_capacity(contact_ids.len());
        for contact_id in contact_ids {
            let contact = match self.contacts.get(contact_id)? {
                Some(contact) => contact,
                None => {
                    // No contact row exists, so nothing reaches the
                    // transport stage and nothing is journaled.
                    results.push(RecipientResult {
                        contact_id: contact_id.clone(),
                        contact_name: "Unknown".into(),
                        outcome: Outcome::Failed,
                        error_detail: Some("Contact not found".into()),
                    });
                    continue;
                }
            };

            let result = match self.attempt(&artifact, &contact).await {
                Ok(()) => match self.audit.append(
                    Direction::Send,
                    &artifact.id,
                    &contact.id,
                    Outcome::Success,
                    None,
                ) {
                    Ok(_) => RecipientResult {
                        contact_id: contact.id.clone(),
                        contact_name: contact.display_name.clone(),
                        outcome: Outcome::Success,
                        error_detail: None,
                    },
                    // A send whose journal write failed counts as failed.
                    Err(err) => self.failed(&artifact, &contact, err.to_string()),
                },
                Err(err) => self.failed(&artifact, &contact, err.to_string()),
            };
            results.push(result);
        }
        Ok(results)
    }

    /// Everything that can go wrong for a single resolved recipient.
    async fn attempt(&self, artifact: &Artifact, contact: &Contact) -> Result<(), BridgeError> {
        if artifact.tier == Tier::Remote {
            return Err(BridgeError::Unsupported(
                "sending is unsupported for cloud-tier artifacts; download the file first".into(),
            ));
        }
        let path = match self.storage.resolve_readable(artifact)? {
            Readable::File(path) => path,
            Readable::Url(_) => unreachable!("local tier resolved to a URL"),
        };

        let file = OutgoingFile {
            path,
            file_name: artifact.original_name.clone(),
            mime_type: artifact.mime_type.clone(),
            caption: Some(artifact.original_name.clone()),
        };
        self.session
            .send_file(&transport_target(contact), &file)
            .await
    }

    fn failed(&self, artifact: &Artifact, contact: &Contact, detail: String) -> RecipientResult {
        tracing::warn!(
            "Send of '{}' to {} failed: {detail}",
            artifact.original_name,
            contact.display_name
        );
        if let Err(log_err) = self.audit.append(
            Direction::Send,
            &artifact.id,
            &contact.id,
            Outcome::Failed,
            Some(detail.clone()),
        ) {
            tracing::error!("Failed to journal a failed send attempt: {log_err}");
        }
        RecipientResult {
            contact_id: contact.id.clone(),
            contact_name: contact.display_name.clone(),
            outcome: Outcome::Failed,
            error_detail: Some(detail),
        }
    }
}

/// Derive the transport identity for a contact: addresses that already
/// carry a domain suffix go out verbatim, bare ones get the group or
/// direct-message suffix.
fn transport_target(contact: &Contact) -> String {
    if contact.address.contains('@') {
        contact.address.clone()
    } else if contact.is_group {
        format!("{}@g.us", contact.address)
    } else {
        format!("{}@c.us", contact.address)
    }
}
