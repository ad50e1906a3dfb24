//! Contact resolution: maps external session identities to local contact
//! records. Used by outbound addressing, inbound ingestion, and the
//! session-sync path.

use crate::db::{Contact, Store};
use crate::error::BridgeError;
use crate::session::ProviderChat;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct NewContact {
    pub display_name: String,
    pub address: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub group_id: Option<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPatch {
    pub display_name: Option<String>,
    pub address: Option<String>,
    pub is_group: Option<bool>,
    pub group_id: Option<String>,
}

pub struct ContactResolver {
    store: Store,
}

impl ContactResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<Contact>, BridgeError> {
        self.store.list_contacts().map_err(BridgeError::storage)
    }

    pub fn get(&self, id: &str) -> Result<Option<Contact>, BridgeError> {
        self.store.get_contact(id).map_err(BridgeError::storage)
    }

    pub fn create(&self, new: NewContact) -> Result<Contact, BridgeError> {
        if new.display_name.trim().is_empty() || new.address.trim().is_empty() {
            return Err(BridgeError::Validation(
                "display_name and address are required".into(),
            ));
        }
        if self
            .store
            .get_contact_by_identity(&new.address, new.is_group)
            .map_err(BridgeError::storage)?
            .is_some()
        {
            return Err(BridgeError::Validation(
                "a contact with this address already exists".into(),
            ));
        }

        let contact = Contact {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: new.display_name.trim().to_string(),
            address: new.address.trim().to_string(),
            is_group: new.is_group,
            group_id: new.group_id,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store
            .insert_contact(&contact)
            .map_err(BridgeError::storage)?;
        Ok(contact)
    }

    pub fn update(&self, id: &str, patch: &ContactPatch) -> Result<Contact, BridgeError> {
        let updated = self
            .store
            .update_contact(
                id,
                patch.display_name.as_deref(),
                patch.address.as_deref(),
                patch.is_group,
                patch.group_id.as_deref().map(Some),
            )
            .map_err(BridgeError::storage)?;
        if !updated {
            return Err(BridgeError::not_found("Contact not found"));
        }
        self.get(id)?
            .ok_or_else(|| BridgeError::not_found("Contact not found"))
    }

    pub fn delete(&self, id: &str) -> Result<(), BridgeError> {
        let deleted = self
            .store
            .delete_contact(id)
            .map_err(BridgeError::storage)?;
        if !deleted {
            return Err(BridgeError::not_found("Contact not found"));
        }
        Ok(())
    }

    /// Look up by `(address, is_group)`, creating from the hints if absent.
    /// Safe against concurrent callers with the same identity.
    pub fn find_or_create(
        &self,
        address: &str,
        display_name_hint: &str,
        is_group: bool,
        group_id: Option<&str>,
    ) -> Result<Contact, BridgeError> {
        self.store
            .find_or_create_contact(address, display_name_hint, is_group, group_id)
            .map_err(BridgeError::storage)
    }

    /// Upsert every chat visible to the session. Existing contacts only get
    /// their display name refreshed; new ones are created. Returns the full
    /// set in provider order.
    pub fn sync_all(&self, chats: &[ProviderChat]) -> Result<Vec<Contact>, BridgeError> {
        let mut synced = Vec::with_capacity(chats.len());
        for chat in chats {
            let existing = self
                .store
                .get_contact_by_identity(&chat.address, chat.is_group)
                .map_err(BridgeError::storage)?;
            let contact = match existing {
                Some(contact) => {
                    if contact.display_name != chat.display_name {
                        self.store
                            .refresh_contact_name(&contact.id, &chat.display_name)
                            .map_err(BridgeError::storage)?;
                    }
                    Contact {
                        display_name: chat.display_name.clone(),
                        ..contact
                    }
                }
                None => self.find_or_create(
                    &chat.address,
                    &chat.display_name,
                    chat.is_group,
                    chat.group_id.as_deref(),
                )?,
            };
            synced.push(contact);
        }
        Ok(synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    fn resolver() -> ContactResolver {
        ContactResolver::new(Store::open_in_memory().unwrap())
    }

    fn chat(address: &str, name: &str, is_group: bool) -> ProviderChat {
        ProviderChat {
            address: address.into(),
            display_name: name.into(),
            is_group,
            group_id: is_group.then(|| format!("{address}@g.us")),
        }
    }

    #[test]
    fn create_validates_required_fields() {
        let resolver = resolver();
        let err = resolver
            .create(NewContact {
                display_name: "  ".into(),
                address: "1555".into(),
                is_group: false,
                group_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn create_rejects_duplicate_identity() {
        let resolver = resolver();
        resolver
            .create(NewContact {
                display_name: "Ada".into(),
                address: "1555".into(),
                is_group: false,
                group_id: None,
            })
            .unwrap();
        let err = resolver
            .create(NewContact {
                display_name: "Ada Again".into(),
                address: "1555".into(),
                is_group: false,
                group_id: None,
            })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[test]
    fn update_missing_contact_is_not_found() {
        let resolver = resolver();
        let err = resolver
            .update("missing", &ContactPatch::default())
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }

    #[test]
    fn delete_missing_contact_is_not_found() {
        let resolver = resolver();
        let err = resolver.delete("missing").unwrap_err();
        assert_eq!(err.to_string(), "Contact not found");
    }

    #[test]
    fn sync_refreshes_names_and_creates_missing() {
        let resolver = resolver();
        let existing = resolver
            .create(NewContact {
                display_name: "Old Name".into(),
                address: "1555".into(),
                is_group: false,
                group_id: None,
            })
            .unwrap();

        let synced = resolver
            .sync_all(&[chat("1555", "New Name", false), chat("2666", "Fresh", true)])
            .unwrap();

        assert_eq!(synced.len(), 2);
        assert_eq!(synced[0].id, existing.id);
        assert_eq!(synced[0].display_name, "New Name");
        assert_eq!(synced[1].display_name, "Fresh");
        assert!(synced[1].is_group);

        // The refresh is persisted, not just echoed.
        let reloaded = resolver.get(&existing.id).unwrap().unwrap();
        assert_eq!(reloaded.display_name, "New Name");
    }

    #[test]
    fn sync_is_stable_across_repeat_runs() {
        let resolver = resolver();
        let chats = [chat("1555", "Ada", false)];
        let first = resolver.sync_all(&chats).unwrap();
        let second = resolver.sync_all(&chats).unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(resolver.list().unwrap().len(), 1);
    }
}
