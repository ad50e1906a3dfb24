//! HTTP gateway: REST surface over the bridge components plus the session
//! provider webhook. Transport concerns only — every decision with state
//! behind it lives in the component the handler calls.

use crate::audit::AuditLog;
use crate::contacts::{ContactPatch, ContactResolver, NewContact};
use crate::db::{Direction, LogFilter, Outcome};
use crate::error::BridgeError;
use crate::session::{CloudProvider, SessionManager};
use crate::storage::{Readable, StorageService};
use crate::transfer::TransferOrchestrator;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for all gateway routes.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageService>,
    pub contacts: Arc<ContactResolver>,
    pub session: Arc<SessionManager>,
    pub transfer: Arc<TransferOrchestrator>,
    pub audit: Arc<AuditLog>,
    /// Present when the Cloud API binding is configured; the webhook routes
    /// 404 without it.
    pub cloud: Option<Arc<CloudProvider>>,
    pub max_upload_bytes: u64,
}

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub fn err(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiResponse<()>>) {
        (
            status,
            Json(ApiResponse::<()> {
                success: false,
                data: None,
                error: Some(message.into()),
            }),
        )
    }
}

fn bridge_error(err: &BridgeError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ApiResponse::<()>::err(status, err.to_string())
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes as usize;
    Router::new()
        .route("/health", get(health))
        .route("/api/files", post(files_upload).get(files_list))
        .route("/api/files/{id}", get(files_get).delete(files_delete))
        .route("/api/contacts", get(contacts_list).post(contacts_create))
        .route("/api/contacts/sync", post(contacts_sync))
        .route(
            "/api/contacts/{id}",
            axum::routing::put(contacts_update).delete(contacts_delete),
        )
        .route("/api/send", post(send_file))
        .route("/api/logs", get(logs_list))
        .route("/api/logs/export", get(logs_export))
        .route("/api/logs/{id}", get(logs_get))
        .route("/api/session/status", get(session_status))
        .route("/api/session/qr", get(session_qr))
        .route("/api/session/initialize", post(session_initialize))
        .route(
            "/api/session/webhook",
            get(webhook_verify).post(webhook_receive),
        )
        .layer(DefaultBodyLimit::max(body_limit.saturating_add(64 * 1024)))
        .with_state(state)
}

// ── Health ────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "runtime": crate::health::snapshot_json(),
    }))
}

// ── Files ─────────────────────────────────────────────────────────

async fn files_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return ApiResponse::<()>::err(
                    StatusCode::BAD_REQUEST,
                    "multipart field 'file' is required",
                )
                .into_response();
            }
            Err(err) => {
                return ApiResponse::<()>::err(
                    StatusCode::BAD_REQUEST,
                    format!("invalid multipart body: {err}"),
                )
                .into_response();
            }
        }
    };

    let original_name = field
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| "upload".into());
    let mime_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&original_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

    let bytes = match field.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            return ApiResponse::<()>::err(
                StatusCode::BAD_REQUEST,
                format!("failed to read upload: {err}"),
            )
            .into_response();
        }
    };
    if bytes.is_empty() {
        return ApiResponse::<()>::err(StatusCode::BAD_REQUEST, "uploaded file is empty")
            .into_response();
    }
    if bytes.len() as u64 > state.max_upload_bytes {
        return ApiResponse::<()>::err(
            StatusCode::BAD_REQUEST,
            format!("file exceeds the {} byte upload limit", state.max_upload_bytes),
        )
        .into_response();
    }

    match state.storage.place(&bytes, &original_name, &mime_type).await {
        Ok(artifact) => (StatusCode::CREATED, ApiResponse::ok(artifact)).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn files_list(State(state): State<AppState>) -> Response {
    match state.storage.list() {
        Ok(artifacts) => ApiResponse::ok(artifacts).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn files_get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let artifact = match state.storage.get(&id) {
        Ok(Some(artifact)) => artifact,
        Ok(None) => {
            return ApiResponse::<()>::err(StatusCode::NOT_FOUND, "File not found")
                .into_response();
        }
        Err(err) => return bridge_error(&err).into_response(),
    };

    match state.storage.resolve_readable(&artifact) {
        Ok(Readable::Url(url)) => Redirect::temporary(&url).into_response(),
        Ok(Readable::File(path)) => {
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(err) => {
                    return bridge_error(&BridgeError::storage(err)).into_response();
                }
            };
            let stream = tokio_util::io::ReaderStream::new(file);
            let body = axum::body::Body::from_stream(stream);
            let disposition = format!(
                "attachment; filename=\"{}\"",
                artifact.original_name.replace('"', "")
            );
            Response::builder()
                .header(header::CONTENT_TYPE, artifact.mime_type.clone())
                .header(header::CONTENT_DISPOSITION, disposition)
                .body(body)
                .unwrap_or_else(|_| {
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                })
        }
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn files_delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.storage.remove(&id).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({"deleted": id})).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

// ── Contacts ──────────────────────────────────────────────────────

async fn contacts_list(State(state): State<AppState>) -> Response {
    match state.contacts.list() {
        Ok(contacts) => ApiResponse::ok(contacts).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn contacts_create(
    State(state): State<AppState>,
    Json(body): Json<NewContact>,
) -> Response {
    match state.contacts.create(body) {
        Ok(contact) => (StatusCode::CREATED, ApiResponse::ok(contact)).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn contacts_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ContactPatch>,
) -> Response {
    match state.contacts.update(&id, &patch) {
        Ok(contact) => ApiResponse::ok(contact).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn contacts_delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.contacts.delete(&id) {
        Ok(()) => ApiResponse::ok(serde_json::json!({"deleted": id})).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn contacts_sync(State(state): State<AppState>) -> Response {
    let chats = match state.session.list_chats().await {
        Ok(chats) => chats,
        Err(err) => return bridge_error(&err).into_response(),
    };
    match state.contacts.sync_all(&chats) {
        Ok(contacts) => ApiResponse::ok(contacts).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

// ── Send ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendRequest {
    file_id: String,
    contact_ids: Vec<String>,
}

async fn send_file(State(state): State<AppState>, Json(body): Json<SendRequest>) -> Response {
    match state
        .transfer
        .send_file(&body.file_id, &body.contact_ids)
        .await
    {
        Ok(results) => ApiResponse::ok(results).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

// ── Logs ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LogsQuery {
    direction: Option<String>,
    outcome: Option<String>,
    contact_id: Option<String>,
    artifact_id: Option<String>,
    from: Option<String>,
    until: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn logs_list(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> Response {
    let direction = match query.direction.as_deref() {
        None => None,
        Some(raw) => match Direction::parse(raw) {
            Some(direction) => Some(direction),
            None => {
                return ApiResponse::<()>::err(
                    StatusCode::BAD_REQUEST,
                    "direction must be 'send' or 'receive'",
                )
                .into_response();
            }
        },
    };
    let outcome = match query.outcome.as_deref() {
        None => None,
        Some(raw) => match Outcome::parse(raw) {
            Some(outcome) => Some(outcome),
            None => {
                return ApiResponse::<()>::err(
                    StatusCode::BAD_REQUEST,
                    "outcome must be 'success' or 'failed'",
                )
                .into_response();
            }
        },
    };

    let filter = LogFilter {
        direction,
        outcome,
        contact_id: query.contact_id,
        artifact_id: query.artifact_id,
        from: query.from,
        until: query.until,
        limit: query.limit,
        offset: query.offset,
    };
    match state.audit.query(&filter) {
        Ok(records) => ApiResponse::ok(records).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn logs_get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.audit.get(&id) {
        Ok(Some(record)) => ApiResponse::ok(record).into_response(),
        Ok(None) => {
            ApiResponse::<()>::err(StatusCode::NOT_FOUND, "Log entry not found").into_response()
        }
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn logs_export(State(state): State<AppState>) -> Response {
    match state.audit.export_csv() {
        Ok(csv) => Response::builder()
            .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
            .header(
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"transfer-logs.csv\"",
            )
            .body(axum::body::Body::from(csv))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(err) => bridge_error(&err).into_response(),
    }
}

// ── Session ───────────────────────────────────────────────────────

async fn session_status(State(state): State<AppState>) -> Response {
    ApiResponse::ok(state.session.status()).into_response()
}

async fn session_qr(State(state): State<AppState>) -> Response {
    let status = state.session.status();
    match state.session.challenge_data_url() {
        Ok(qr) => ApiResponse::ok(serde_json::json!({
            "qr": qr,
            "message": status.message,
        }))
        .into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

async fn session_initialize(State(state): State<AppState>) -> Response {
    match state.session.initialize().await {
        Ok(()) => ApiResponse::ok(state.session.status()).into_response(),
        Err(err) => bridge_error(&err).into_response(),
    }
}

// ── Provider webhook ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

async fn webhook_verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let Some(cloud) = state.cloud.as_ref() else {
        return ApiResponse::<()>::err(StatusCode::NOT_FOUND, "webhook is not configured")
            .into_response();
    };
    let verified = cloud.verify_webhook(
        query.mode.as_deref().unwrap_or(""),
        query.verify_token.as_deref().unwrap_or(""),
        query.challenge.as_deref().unwrap_or(""),
    );
    match verified {
        Ok(challenge) => (StatusCode::OK, challenge).into_response(),
        Err(_) => {
            tracing::warn!("Webhook verification failed: token mismatch");
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        }
    }
}

async fn webhook_receive(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let Some(cloud) = state.cloud.as_ref() else {
        return ApiResponse::<()>::err(StatusCode::NOT_FOUND, "webhook is not configured")
            .into_response();
    };
    let forwarded = cloud.process_webhook(&payload).await;
    tracing::debug!("Webhook delivered {forwarded} media event(s)");
    // Always acknowledge; the provider retries on anything else.
    (StatusCode::OK, "OK").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::session::traits::{
        MediaRef, OutgoingFile, ProviderChat, SessionEvent, SessionProvider,
    };
    use crate::session::Ingestor;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct ReadyProvider {
        // Keep the event sender alive for the provider's lifetime so the
        // pump's stream stays open; otherwise dropping it on `connect`
        // return immediately transitions the session to `Disconnected`.
        held: std::sync::Mutex<Option<mpsc::Sender<SessionEvent>>>,
    }

    #[async_trait]
    impl SessionProvider for ReadyProvider {
        fn name(&self) -> &str {
            "ready"
        }

        async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), BridgeError> {
            events
                .send(SessionEvent::Ready)
                .await
                .map_err(|e| BridgeError::Transport(e.to_string()))?;
            *self.held.lock().unwrap() = Some(events);
            Ok(())
        }

        async fn send_file(&self, _target: &str, _file: &OutgoingFile) -> Result<(), BridgeError> {
            Ok(())
        }

        async fn fetch_media(&self, _media: &MediaRef) -> Result<Vec<u8>, BridgeError> {
            Ok(vec![])
        }

        async fn list_chats(&self) -> Result<Vec<ProviderChat>, BridgeError> {
            Ok(vec![ProviderChat {
                address: "1555".into(),
                display_name: "Ada".into(),
                is_group: false,
                group_id: None,
            }])
        }
    }

    struct TestServer {
        base: String,
        client: reqwest::Client,
        _dir: tempfile::TempDir,
    }

    async fn serve() -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let storage = Arc::new(
            StorageService::new(store.clone(), dir.path().to_path_buf(), 1024 * 1024, None)
                .unwrap(),
        );
        let contacts = Arc::new(ContactResolver::new(store.clone()));
        let audit = Arc::new(AuditLog::new(store.clone()));
        let session = SessionManager::new(
            Arc::new(ReadyProvider::default()),
            Ingestor::new(storage.clone(), contacts.clone(), audit.clone()),
        );
        session.initialize().await.unwrap();
        for _ in 0..100 {
            if session.is_ready() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let transfer = Arc::new(TransferOrchestrator::new(
            storage.clone(),
            contacts.clone(),
            session.clone(),
            audit.clone(),
        ));
        let state = AppState {
            storage,
            contacts,
            session,
            transfer,
            audit,
            cloud: None,
            max_upload_bytes: 1024 * 1024,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        TestServer {
            base,
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .unwrap(),
            _dir: dir,
        }
    }

    async fn upload(server: &TestServer, name: &str, bytes: &'static [u8]) -> serde_json::Value {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("application/pdf")
            .unwrap();
        let form = reqwest::multipart::Form::new().part("file", part);
        let resp = server
            .client
            .post(format!("{}/api/files", server.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        resp.json::<serde_json::Value>().await.unwrap()["data"].clone()
    }

    #[tokio::test]
    async fn health_reports_ok_with_timestamp() {
        let server = serve().await;
        let body: serde_json::Value = server
            .client
            .get(format!("{}/health", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn upload_then_download_roundtrip() {
        let server = serve().await;
        let artifact = upload(&server, "deck.pdf", b"pdf bytes here").await;
        assert_eq!(artifact["original_name"], "deck.pdf");
        assert_eq!(artifact["tier"], "local");

        let id = artifact["id"].as_str().unwrap();
        let resp = server
            .client
            .get(format!("{}/api/files/{id}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE.as_str()],
            "application/pdf"
        );
        assert!(resp.headers()[header::CONTENT_DISPOSITION.as_str()]
            .to_str()
            .unwrap()
            .contains("deck.pdf"));
        assert_eq!(resp.bytes().await.unwrap().as_ref(), &b"pdf bytes here"[..]);
    }

    #[tokio::test]
    async fn missing_file_is_a_structured_404() {
        let server = serve().await;
        let resp = server
            .client
            .get(format!("{}/api/files/nope", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "File not found");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected() {
        let server = serve().await;
        let form = reqwest::multipart::Form::new().text("note", "no file here");
        let resp = server
            .client
            .post(format!("{}/api/files", server.base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn delete_removes_the_artifact() {
        let server = serve().await;
        let artifact = upload(&server, "bye.pdf", b"x").await;
        let id = artifact["id"].as_str().unwrap();

        let resp = server
            .client
            .delete(format!("{}/api/files/{id}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = server
            .client
            .get(format!("{}/api/files/{id}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn contact_crud_and_validation() {
        let server = serve().await;

        let resp = server
            .client
            .post(format!("{}/api/contacts", server.base))
            .json(&serde_json::json!({"display_name": "", "address": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = server
            .client
            .post(format!("{}/api/contacts", server.base))
            .json(&serde_json::json!({"display_name": "Ada", "address": "1555"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: serde_json::Value = resp.json().await.unwrap();
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let resp = server
            .client
            .put(format!("{}/api/contacts/{id}", server.base))
            .json(&serde_json::json!({"display_name": "Ada Lovelace"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let listed: serde_json::Value = server
            .client
            .get(format!("{}/api/contacts", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed["data"][0]["display_name"], "Ada Lovelace");

        let resp = server
            .client
            .delete(format!("{}/api/contacts/{id}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn contacts_sync_pulls_from_the_session() {
        let server = serve().await;
        let synced: serde_json::Value = server
            .client
            .post(format!("{}/api/contacts/sync", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(synced["data"][0]["address"], "1555");
    }

    #[tokio::test]
    async fn send_returns_per_recipient_results_and_journals() {
        let server = serve().await;
        let artifact = upload(&server, "deck.pdf", b"bytes").await;
        let artifact_id = artifact["id"].as_str().unwrap();

        let created: serde_json::Value = server
            .client
            .post(format!("{}/api/contacts", server.base))
            .json(&serde_json::json!({"display_name": "Ada", "address": "1555"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let contact_id = created["data"]["id"].as_str().unwrap();

        let resp: serde_json::Value = server
            .client
            .post(format!("{}/api/send", server.base))
            .json(&serde_json::json!({
                "file_id": artifact_id,
                "contact_ids": [contact_id, "missing-id"],
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let results = resp["data"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["outcome"], "success");
        assert_eq!(results[1]["outcome"], "failed");
        assert_eq!(results[1]["error_detail"], "Contact not found");

        let logs: serde_json::Value = server
            .client
            .get(format!(
                "{}/api/logs?artifact_id={artifact_id}",
                server.base
            ))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(logs["data"].as_array().unwrap().len(), 1);
        assert_eq!(logs["data"][0]["outcome"], "success");
    }

    #[tokio::test]
    async fn send_with_unknown_artifact_is_404() {
        let server = serve().await;
        let resp = server
            .client
            .post(format!("{}/api/send", server.base))
            .json(&serde_json::json!({"file_id": "nope", "contact_ids": ["x"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn logs_reject_bad_filter_values() {
        let server = serve().await;
        let resp = server
            .client
            .get(format!("{}/api/logs?direction=upward", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn logs_export_is_a_csv_attachment() {
        let server = serve().await;
        let resp = server
            .client
            .get(format!("{}/api/logs/export", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.headers()[header::CONTENT_TYPE.as_str()]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let body = resp.text().await.unwrap();
        assert!(body.starts_with("ID,Direction,Outcome,Timestamp"));
    }

    #[tokio::test]
    async fn session_status_and_qr_render() {
        let server = serve().await;
        let status: serde_json::Value = server
            .client
            .get(format!("{}/api/session/status", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["data"]["connected"], true);

        let qr: serde_json::Value = server
            .client
            .get(format!("{}/api/session/qr", server.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        // Connected session has no pending challenge.
        assert!(qr["data"]["qr"].is_null());
    }

    #[tokio::test]
    async fn webhook_routes_404_without_cloud_binding() {
        let server = serve().await;
        let resp = server
            .client
            .post(format!("{}/api/session/webhook", server.base))
            .json(&serde_json::json!({"entry": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }
}
