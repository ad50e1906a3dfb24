//! Storage tiering: decides and executes where an artifact's bytes live.
//!
//! Every placement spools the bytes to the local upload root first. Files
//! over the configured threshold are then promoted to the remote tier when a
//! backend is configured; a failed promotion falls back to the local tier
//! and the caller never sees the error. The `tier` field on the resulting
//! artifact records which path actually succeeded.

pub mod remote;

pub use remote::{RemoteStore, S3RemoteStore};

use crate::db::{Artifact, Store, Tier};
use crate::error::BridgeError;
use std::path::PathBuf;
use std::sync::Arc;

/// How an artifact's bytes can be read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readable {
    /// Bytes are on the local disk at this path.
    File(PathBuf),
    /// Bytes live remotely; fetch via this URL.
    Url(String),
}

pub struct StorageService {
    store: Store,
    upload_dir: PathBuf,
    remote_threshold: u64,
    remote: Option<Arc<dyn RemoteStore>>,
}

impl StorageService {
    pub fn new(
        store: Store,
        upload_dir: PathBuf,
        remote_threshold: u64,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Result<Self, BridgeError> {
        std::fs::create_dir_all(&upload_dir)?;
        Ok(Self {
            store,
            upload_dir,
            remote_threshold,
            remote,
        })
    }

    /// Persist uploaded or captured bytes and record the artifact.
    pub async fn place(
        &self,
        bytes: &[u8],
        original_name: &str,
        mime_type: &str,
    ) -> Result<Artifact, BridgeError> {
        let stored_name = generated_name(original_name, mime_type);
        let spool_path = self.upload_dir.join(&stored_name);
        tokio::fs::write(&spool_path, bytes).await?;

        let size_bytes = bytes.len() as u64;
        let (tier, locator) = match (&self.remote, size_bytes > self.remote_threshold) {
            (Some(remote), true) => match remote.put_object(&stored_name, &spool_path).await {
                Ok(url) => (Tier::Remote, url),
                Err(err) => {
                    tracing::warn!("Remote upload failed, keeping '{stored_name}' local: {err}");
                    (Tier::Local, stored_name.clone())
                }
            },
            _ => (Tier::Local, stored_name.clone()),
        };

        let artifact = Artifact {
            id: uuid::Uuid::new_v4().to_string(),
            stored_name,
            original_name: original_name.to_string(),
            size_bytes,
            mime_type: mime_type.to_string(),
            tier,
            locator,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store
            .insert_artifact(&artifact)
            .map_err(BridgeError::storage)?;
        tracing::info!(
            "Placed '{}' ({} bytes) on the {} tier",
            artifact.original_name,
            artifact.size_bytes,
            artifact.tier.as_str()
        );
        Ok(artifact)
    }

    pub fn get(&self, id: &str) -> Result<Option<Artifact>, BridgeError> {
        self.store.get_artifact(id).map_err(BridgeError::storage)
    }

    pub fn list(&self) -> Result<Vec<Artifact>, BridgeError> {
        self.store.list_artifacts().map_err(BridgeError::storage)
    }

    /// Where to read the artifact's bytes from.
    ///
    /// A local record whose file has gone missing is reported distinctly
    /// from an unknown artifact id: the record exists, the bytes do not.
    pub fn resolve_readable(&self, artifact: &Artifact) -> Result<Readable, BridgeError> {
        match artifact.tier {
            Tier::Remote => Ok(Readable::Url(artifact.locator.clone())),
            Tier::Local => {
                let path = self.upload_dir.join(&artifact.locator);
                if !path.exists() {
                    return Err(BridgeError::not_found("File not found on disk"));
                }
                Ok(Readable::File(path))
            }
        }
    }

    /// Delete the artifact record and any local bytes. Remote objects are
    /// left behind (the remote tier has no delete path yet).
    pub async fn remove(&self, id: &str) -> Result<(), BridgeError> {
        let artifact = self
            .get(id)?
            .ok_or_else(|| BridgeError::not_found("File not found"))?;

        let spool_path = self.upload_dir.join(&artifact.stored_name);
        if spool_path.exists() {
            tokio::fs::remove_file(&spool_path).await?;
        }
        self.store
            .delete_artifact(id)
            .map_err(BridgeError::storage)?;
        Ok(())
    }

    pub fn upload_dir(&self) -> &PathBuf {
        &self.upload_dir
    }
}

/// Collision-resistant on-disk name, never the client-supplied one.
fn generated_name(original_name: &str, mime_type: &str) -> String {
    let ext = std::path::Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(mime_type)
                .and_then(|exts| exts.first())
                .map(|e| (*e).to_string())
        })
        .unwrap_or_else(|| "bin".into());
    format!("{}.{ext}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedRemote {
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedRemote {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        async fn put_object(&self, key: &str, _source: &Path) -> Result<String, BridgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BridgeError::Storage("bucket unreachable".into()))
            } else {
                Ok(format!("https://bucket.example.com/{key}"))
            }
        }
    }

    fn service(
        dir: &Path,
        threshold: u64,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> StorageService {
        let store = Store::open_in_memory().unwrap();
        StorageService::new(store, dir.to_path_buf(), threshold, remote).unwrap()
    }

    #[tokio::test]
    async fn small_files_stay_local_without_touching_remote() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(false);
        let svc = service(dir.path(), 1024, Some(remote.clone()));

        let artifact = svc.place(b"tiny", "notes.txt", "text/plain").await.unwrap();
        assert_eq!(artifact.tier, Tier::Local);
        assert_eq!(artifact.locator, artifact.stored_name);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
        assert!(dir.path().join(&artifact.stored_name).exists());
    }

    #[tokio::test]
    async fn large_files_promote_to_remote() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(false);
        let svc = service(dir.path(), 8, Some(remote.clone()));

        let artifact = svc
            .place(b"way more than eight bytes", "big.bin", "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(artifact.tier, Tier::Remote);
        assert!(artifact.locator.starts_with("https://bucket.example.com/"));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        // The local spool is retained even after promotion.
        assert!(dir.path().join(&artifact.stored_name).exists());
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_local() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(true);
        let svc = service(dir.path(), 8, Some(remote.clone()));

        let artifact = svc
            .place(b"way more than eight bytes", "big.bin", "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(artifact.tier, Tier::Local);
        assert_eq!(artifact.locator, artifact.stored_name);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_backend_means_local_regardless_of_size() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), 1, None);

        let artifact = svc
            .place(b"definitely over one byte", "big.bin", "application/octet-stream")
            .await
            .unwrap();
        assert_eq!(artifact.tier, Tier::Local);
    }

    #[tokio::test]
    async fn resolve_readable_distinguishes_missing_bytes_from_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), 1024, None);

        let artifact = svc.place(b"data", "a.txt", "text/plain").await.unwrap();
        assert!(matches!(
            svc.resolve_readable(&artifact).unwrap(),
            Readable::File(_)
        ));

        std::fs::remove_file(dir.path().join(&artifact.stored_name)).unwrap();
        let err = svc.resolve_readable(&artifact).unwrap_err();
        assert_eq!(err.to_string(), "File not found on disk");
    }

    #[tokio::test]
    async fn resolve_readable_yields_url_for_remote_tier() {
        let dir = tempfile::tempdir().unwrap();
        let remote = ScriptedRemote::new(false);
        let svc = service(dir.path(), 1, Some(remote));

        let artifact = svc.place(b"12345", "a.bin", "application/octet-stream").await.unwrap();
        assert_eq!(
            svc.resolve_readable(&artifact).unwrap(),
            Readable::Url(artifact.locator.clone())
        );
    }

    #[tokio::test]
    async fn remove_deletes_record_and_local_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), 1024, None);

        let artifact = svc.place(b"data", "a.txt", "text/plain").await.unwrap();
        let spool = dir.path().join(&artifact.stored_name);
        assert!(spool.exists());

        svc.remove(&artifact.id).await.unwrap();
        assert!(!spool.exists());
        assert!(svc.get(&artifact.id).unwrap().is_none());

        let err = svc.remove(&artifact.id).await.unwrap_err();
        assert_eq!(err.to_string(), "File not found");
    }

    #[test]
    fn generated_names_keep_extension_and_avoid_collisions() {
        let a = generated_name("report.PDF", "application/pdf");
        let b = generated_name("report.PDF", "application/pdf");
        assert!(a.ends_with(".pdf"));
        assert_ne!(a, b);

        let from_mime = generated_name("no-extension", "text/plain");
        assert!(from_mime.contains('.'));
    }
}
