//! WhatsApp Cloud API session binding.
//!
//! Token-authorized sessions restore straight to `Ready` — there is no link
//! challenge in this mode. Inbound traffic arrives on the gateway's webhook
//! route, which hands the raw payload to [`CloudProvider::process_webhook`];
//! parsed media events are then forwarded onto the session event channel.

use crate::config::CloudSessionConfig;
use crate::error::BridgeError;
use crate::session::traits::{
    InboundMedia, MediaRef, OutgoingFile, ProviderChat, SessionEvent, SessionProvider,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

const CLOUD_API_BASE: &str = "https://graph.facebook.com/v18.0";

#[derive(Debug, Deserialize)]
struct WebhookEntry {
    changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
struct WebhookChange {
    value: WebhookValue,
}

#[derive(Debug, Deserialize)]
struct WebhookValue {
    messages: Option<Vec<WebhookMessage>>,
    contacts: Option<Vec<WebhookContact>>,
    statuses: Option<Vec<MessageStatus>>,
}

#[derive(Debug, Deserialize)]
struct WebhookMessage {
    from: String,
    id: String,
    image: Option<MediaPayload>,
    document: Option<MediaPayload>,
    video: Option<MediaPayload>,
    audio: Option<MediaPayload>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    id: String,
    mime_type: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookContact {
    wa_id: String,
    profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
struct ContactProfile {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStatus {
    id: String,
    status: String,
    recipient_id: String,
}

pub struct CloudProvider {
    config: CloudSessionConfig,
    api_base: String,
    client: reqwest::Client,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

impl CloudProvider {
    pub fn new(config: CloudSessionConfig) -> Self {
        Self {
            config,
            api_base: CLOUD_API_BASE.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            events: Mutex::new(None),
        }
    }

    /// Point the provider at a different API root (proxies, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, tail: &str) -> String {
        format!("{}/{tail}", self.api_base)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.config.access_token)
    }

    /// Webhook subscription handshake (`hub.mode`/`hub.verify_token`).
    pub fn verify_webhook(
        &self,
        mode: &str,
        token: &str,
        challenge: &str,
    ) -> Result<String, BridgeError> {
        if mode == "subscribe" && token == self.config.verify_token {
            Ok(challenge.to_string())
        } else {
            Err(BridgeError::Validation("webhook verification failed".into()))
        }
    }

    /// Parse an inbound webhook payload and forward each media message as a
    /// session event. Non-media messages and delivery statuses are logged
    /// and dropped. Returns the number of media events forwarded.
    pub async fn process_webhook(&self, payload: &Value) -> usize {
        let Some(tx) = self.events.lock().clone() else {
            tracing::warn!("Webhook delivery before the session was initialized; ignoring");
            return 0;
        };

        let mut forwarded = 0;
        let entries = payload
            .get("entry")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for entry in entries {
            let Ok(entry) = serde_json::from_value::<WebhookEntry>(entry) else {
                continue;
            };
            for change in entry.changes {
                if let Some(statuses) = change.value.statuses {
                    for s in statuses {
                        tracing::debug!("Delivery status {}: {} for {}", s.id, s.status, s.recipient_id);
                    }
                }
                let Some(messages) = change.value.messages else {
                    continue;
                };
                let contacts = change.value.contacts.unwrap_or_default();
                for msg in messages {
                    let Some(media) = media_ref(&msg) else {
                        tracing::debug!("Inbound message {} carries no media; ignoring", msg.id);
                        continue;
                    };
                    let sender_name = contacts
                        .iter()
                        .find(|c| c.wa_id == msg.from)
                        .and_then(|c| c.profile.as_ref())
                        .and_then(|p| p.name.clone());
                    let inbound = InboundMedia {
                        sender: msg.from.clone(),
                        sender_name,
                        chat: msg.from.clone(),
                        is_group: false,
                        media,
                    };
                    if tx.send(SessionEvent::Media(inbound)).await.is_err() {
                        tracing::warn!("Session event channel closed; dropping inbound media");
                        return forwarded;
                    }
                    forwarded += 1;
                }
            }
        }
        forwarded
    }
}

fn media_ref(msg: &WebhookMessage) -> Option<MediaRef> {
    let (payload, default_mime) = if let Some(doc) = &msg.document {
        (doc, "application/octet-stream")
    } else if let Some(image) = &msg.image {
        (image, "image/jpeg")
    } else if let Some(video) = &msg.video {
        (video, "video/mp4")
    } else if let Some(audio) = &msg.audio {
        (audio, "audio/ogg")
    } else {
        return None;
    };
    Some(MediaRef {
        provider_id: payload.id.clone(),
        mime_type: payload
            .mime_type
            .clone()
            .unwrap_or_else(|| default_mime.into()),
        file_name: payload.filename.clone(),
    })
}

#[async_trait]
impl SessionProvider for CloudProvider {
    fn name(&self) -> &str {
        "whatsapp-cloud"
    }

    async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), BridgeError> {
        *self.events.lock() = Some(events.clone());

        // Probe the phone-number endpoint to validate the token. A restored
        // Cloud session needs no link step, so success goes straight to
        // Ready.
        let url = self.api_url(&self.config.phone_number_id);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", self.bearer())
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Transport(format!(
                "Cloud API rejected credentials ({status}): {body}"
            )));
        }

        events
            .send(SessionEvent::Ready)
            .await
            .map_err(|err| BridgeError::Transport(err.to_string()))?;
        Ok(())
    }

    async fn send_file(&self, target: &str, file: &OutgoingFile) -> Result<(), BridgeError> {
        // JID-style targets carry a domain suffix; the Cloud API wants the
        // bare identity.
        let to = target.split('@').next().unwrap_or(target);

        let bytes = tokio::fs::read(&file.path).await?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|err| BridgeError::Validation(format!("invalid mime type: {err}")))?;
        let form = reqwest::multipart::Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", file.mime_type.clone())
            .part("file", part);

        let upload_url = self.api_url(&format!("{}/media", self.config.phone_number_id));
        let resp = self
            .client
            .post(&upload_url)
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Transport(format!("media upload failed: {body}")));
        }
        let uploaded: Value = resp.json().await?;
        let media_id = uploaded
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BridgeError::Transport("media upload response carried no id".into())
            })?
            .to_string();

        let mut document = json!({
            "id": media_id,
            "filename": file.file_name,
        });
        if let Some(caption) = &file.caption {
            document["caption"] = json!(caption);
        }
        let body = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "document",
            "document": document,
        });

        let send_url = self.api_url(&format!("{}/messages", self.config.phone_number_id));
        let resp = self
            .client
            .post(&send_url)
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Transport(format!("send failed: {body}")));
        }
        tracing::debug!("Cloud API: sent '{}' to {to}", file.file_name);
        Ok(())
    }

    async fn fetch_media(&self, media: &MediaRef) -> Result<Vec<u8>, BridgeError> {
        // Two hops: resolve the media id to a short-lived URL, then fetch
        // the bytes with the same bearer token.
        let meta_url = self.api_url(&media.provider_id);
        let meta: Value = self
            .client
            .get(&meta_url)
            .header("Authorization", self.bearer())
            .send()
            .await?
            .error_for_status()
            .map_err(|err| BridgeError::Transport(format!("media lookup failed: {err}")))?
            .json()
            .await?;
        let download_url = meta
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::Transport("media lookup carried no url".into()))?;

        let bytes = self
            .client
            .get(download_url)
            .header("Authorization", self.bearer())
            .send()
            .await?
            .error_for_status()
            .map_err(|err| BridgeError::Transport(format!("media download failed: {err}")))?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn list_chats(&self) -> Result<Vec<ProviderChat>, BridgeError> {
        Err(BridgeError::Unsupported(
            "the WhatsApp Cloud API does not expose a chat list; add contacts manually".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> CloudSessionConfig {
        CloudSessionConfig {
            phone_number_id: "10001".into(),
            access_token: "token".into(),
            verify_token: "verify-me".into(),
        }
    }

    fn media_webhook(filename: Option<&str>) -> Value {
        let mut document = json!({"id": "media-77", "mime_type": "application/pdf"});
        if let Some(name) = filename {
            document["filename"] = json!(name);
        }
        json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "contacts": [{"wa_id": "15551234567", "profile": {"name": "Ada"}}],
                        "messages": [{
                            "from": "15551234567",
                            "id": "wamid.1",
                            "document": document
                        }]
                    }
                }]
            }]
        })
    }

    #[test]
    fn verify_webhook_accepts_matching_token() {
        let provider = CloudProvider::new(config());
        assert_eq!(
            provider.verify_webhook("subscribe", "verify-me", "1234").unwrap(),
            "1234"
        );
    }

    #[test]
    fn verify_webhook_rejects_wrong_token() {
        let provider = CloudProvider::new(config());
        let err = provider
            .verify_webhook("subscribe", "wrong", "1234")
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation(_)));
    }

    #[tokio::test]
    async fn process_webhook_forwards_media_with_sender_name() {
        let provider = CloudProvider::new(config());
        let (tx, mut rx) = mpsc::channel(4);
        *provider.events.lock() = Some(tx);

        let forwarded = provider.process_webhook(&media_webhook(Some("contract.pdf"))).await;
        assert_eq!(forwarded, 1);

        let Some(SessionEvent::Media(inbound)) = rx.recv().await else {
            panic!("expected a media event");
        };
        assert_eq!(inbound.sender, "15551234567");
        assert_eq!(inbound.sender_name.as_deref(), Some("Ada"));
        assert_eq!(inbound.media.provider_id, "media-77");
        assert_eq!(inbound.media.mime_type, "application/pdf");
        assert_eq!(inbound.media.file_name.as_deref(), Some("contract.pdf"));
    }

    #[tokio::test]
    async fn process_webhook_ignores_text_messages_and_statuses() {
        let provider = CloudProvider::new(config());
        let (tx, mut rx) = mpsc::channel(4);
        *provider.events.lock() = Some(tx);

        let payload = json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "messages": [{"from": "1555", "id": "wamid.2", "text": {"body": "hi"}}],
                        "statuses": [{"id": "wamid.3", "status": "delivered", "recipient_id": "1555"}]
                    }
                }]
            }]
        });
        assert_eq!(provider.process_webhook(&payload).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn process_webhook_before_connect_drops_payload() {
        let provider = CloudProvider::new(config());
        assert_eq!(provider.process_webhook(&media_webhook(None)).await, 0);
    }

    #[tokio::test]
    async fn connect_emits_ready_after_credential_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/10001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "10001"})))
            .mount(&server)
            .await;

        let provider = CloudProvider::new(config()).with_api_base(server.uri());
        let (tx, mut rx) = mpsc::channel(4);
        provider.connect(tx).await.unwrap();
        assert!(matches!(rx.recv().await, Some(SessionEvent::Ready)));
    }

    #[tokio::test]
    async fn connect_surfaces_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/10001"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let provider = CloudProvider::new(config()).with_api_base(server.uri());
        let (tx, _rx) = mpsc::channel(4);
        let err = provider.connect(tx).await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert!(err.to_string().contains("bad token"));
    }

    #[tokio::test]
    async fn send_file_uploads_then_sends_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10001/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "media-42"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/10001/messages"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"messages": [{"id": "wamid.out"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("report.pdf");
        std::fs::write(&file_path, b"pdf bytes").unwrap();

        let provider = CloudProvider::new(config()).with_api_base(server.uri());
        provider
            .send_file(
                "15551234567@c.us",
                &OutgoingFile {
                    path: file_path,
                    file_name: "report.pdf".into(),
                    mime_type: "application/pdf".into(),
                    caption: Some("report.pdf".into()),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_file_surfaces_upload_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10001/media"))
            .respond_with(ResponseTemplate::new(500).set_body_string("storage offline"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("report.pdf");
        std::fs::write(&file_path, b"pdf bytes").unwrap();

        let provider = CloudProvider::new(config()).with_api_base(server.uri());
        let err = provider
            .send_file(
                "1555",
                &OutgoingFile {
                    path: file_path,
                    file_name: "report.pdf".into(),
                    mime_type: "application/pdf".into(),
                    caption: None,
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("storage offline"));
    }

    #[tokio::test]
    async fn fetch_media_follows_the_lookup_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media-77"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": format!("{}/cdn/media-77", server.uri())
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cdn/media-77"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raw media".to_vec()))
            .mount(&server)
            .await;

        let provider = CloudProvider::new(config()).with_api_base(server.uri());
        let bytes = provider
            .fetch_media(&MediaRef {
                provider_id: "media-77".into(),
                mime_type: "application/pdf".into(),
                file_name: None,
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"raw media");
    }

    #[tokio::test]
    async fn list_chats_is_unsupported() {
        let provider = CloudProvider::new(config());
        let err = provider.list_chats().await.unwrap_err();
        assert!(matches!(err, BridgeError::Unsupported(_)));
    }
}
