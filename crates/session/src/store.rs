//! Durable storage for the opaque credential blob.

use std::path::{Path, PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, info},
};

use crate::error::{Context, Result};

/// File name of the credential blob inside the session directory.
pub const CREDENTIALS_FILE: &str = "creds.json";

/// Opaque authentication state. Never printed or logged.
#[derive(Clone)]
pub struct CredentialBlob(Secret<String>);

impl CredentialBlob {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(Secret::new(raw.into()))
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the blob parses as JSON. Informational only.
    pub fn is_json(&self) -> bool {
        serde_json::from_str::<serde_json::Value>(self.expose()).is_ok()
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl std::fmt::Debug for CredentialBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialBlob([REDACTED; {} bytes])", self.len())
    }
}

/// Credential file under a session directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CREDENTIALS_FILE)
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(self.path()).await.unwrap_or(false)
    }

    /// Read the stored blob, `None` when no credential file exists.
    pub async fn load(&self) -> Result<Option<CredentialBlob>> {
        let path = self.path();
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(CredentialBlob::new(raw))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Write the blob atomically (temp file, then rename over the old one).
    pub async fn save(&self, blob: &CredentialBlob) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create {}", self.dir.display()))?;

        let path = self.path();
        let tmp = self.dir.join(format!("{CREDENTIALS_FILE}.tmp"));
        tokio::fs::write(&tmp, blob.expose().as_bytes())
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("rename to {}", path.display()))?;

        debug!(path = %path.display(), bytes = blob.len(), "credentials saved");
        Ok(())
    }

    pub async fn save_json(&self, value: &serde_json::Value) -> Result<()> {
        self.save(&CredentialBlob::from_json(value)?).await
    }

    /// Delete the credential file. Returns whether a file was removed.
    pub async fn clear(&self) -> Result<bool> {
        let path = self.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "credentials removed");
                Ok(true)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[tokio::test]
    async fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("session"));

        assert!(!store.exists().await);
        assert!(store.load().await.unwrap().is_none());

        store
            .save_json(&json!({ "me": { "id": "1@s.whatsapp.net" } }))
            .await
            .unwrap();
        assert!(store.exists().await);
        let blob = store.load().await.unwrap().unwrap();
        assert!(blob.is_json());
        assert!(blob.expose().contains("1@s.whatsapp.net"));

        assert!(store.clear().await.unwrap());
        assert!(!store.exists().await);
        assert!(!store.clear().await.unwrap());
    }

    #[tokio::test]
    async fn save_overwrites_previous_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        store.save(&CredentialBlob::new("first")).await.unwrap();
        store.save(&CredentialBlob::new("second")).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().expose(), "second");
        assert!(!dir.path().join("creds.json.tmp").exists());
    }

    #[test]
    fn debug_is_redacted() {
        let blob = CredentialBlob::new("{\"noiseKey\":\"secret\"}");
        let rendered = format!("{blob:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
