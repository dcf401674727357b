//! Credential acquisition fallback chain.

use std::sync::Arc;

use {
    secrecy::ExposeSecret,
    tracing::{debug, info, warn},
};

use {
    zenor_config::SessionConfig,
    zenor_common::FromMessage,
};

use crate::{
    archive::{ArchiveFetcher, ArchiveRef, HttpArchiveFetcher},
    bundle::decode_inline_bundle,
    error::{Error, Result},
    store::{CredentialBlob, CredentialStore},
};

/// Lifecycle of the credential at a storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing stored and pairing not started.
    Absent,
    /// Connecting without credentials; the pairing flow will produce them.
    PendingPairing,
    Authenticated,
}

/// Authentication material handed to the connection supervisor.
#[derive(Debug, Clone)]
pub struct CredentialHandle {
    state: CredentialState,
    blob: Option<CredentialBlob>,
}

impl CredentialHandle {
    pub fn absent() -> Self {
        Self {
            state: CredentialState::Absent,
            blob: None,
        }
    }

    pub fn pending_pairing() -> Self {
        Self {
            state: CredentialState::PendingPairing,
            blob: None,
        }
    }

    pub fn authenticated(blob: CredentialBlob) -> Self {
        Self {
            state: CredentialState::Authenticated,
            blob: Some(blob),
        }
    }

    pub fn state(&self) -> CredentialState {
        self.state
    }

    pub fn blob(&self) -> Option<&CredentialBlob> {
        self.blob.as_ref()
    }

    /// Connect with pairing (QR) enabled.
    pub fn needs_pairing(&self) -> bool {
        self.state != CredentialState::Authenticated
    }
}

/// Which step of the chain produced the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    LocalFile,
    InlineBundle,
    RemoteArchive,
}

impl std::fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::LocalFile => "local file",
            Self::InlineBundle => "inline bundle",
            Self::RemoteArchive => "remote archive",
        })
    }
}

#[derive(Debug)]
pub enum BootstrapOutcome {
    Authenticated {
        handle: CredentialHandle,
        origin: CredentialOrigin,
    },
    PairingRequired,
}

impl BootstrapOutcome {
    pub fn into_handle(self) -> CredentialHandle {
        match self {
            Self::Authenticated { handle, .. } => handle,
            Self::PairingRequired => CredentialHandle::pending_pairing(),
        }
    }

    pub fn origin(&self) -> Option<CredentialOrigin> {
        match self {
            Self::Authenticated { origin, .. } => Some(*origin),
            Self::PairingRequired => None,
        }
    }
}

/// Resolves credentials from the local file, an inline bundle, a remote
/// archive, or falls back to pairing.
pub struct Bootstrapper {
    store: CredentialStore,
    inline_marker: String,
    archive_marker: String,
    fetcher: Option<Arc<dyn ArchiveFetcher>>,
}

impl Bootstrapper {
    pub fn new(store: CredentialStore, config: &SessionConfig) -> Self {
        let fetcher = config
            .archive_base_url
            .as_deref()
            .map(|url| Arc::new(HttpArchiveFetcher::new(url)) as Arc<dyn ArchiveFetcher>);
        Self {
            store,
            inline_marker: config.inline_marker.clone(),
            archive_marker: config.archive_marker.clone(),
            fetcher,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Run the chain with the configured session source.
    pub async fn bootstrap_from(&self, config: &SessionConfig) -> BootstrapOutcome {
        let source = config.source.as_ref().map(|s| s.expose_secret().as_str());
        self.bootstrap(source).await
    }

    /// Run the fallback chain. Never fails: every error degrades to the next
    /// step and finally to [`BootstrapOutcome::PairingRequired`].
    pub async fn bootstrap(&self, source: Option<&str>) -> BootstrapOutcome {
        match self.store.load().await {
            Ok(Some(blob)) => {
                info!(path = %self.store.path().display(), "using stored credentials");
                return authenticated(blob, CredentialOrigin::LocalFile);
            },
            Ok(None) => debug!("no stored credentials"),
            Err(e) => warn!(error = %e, "stored credentials unreadable, trying session source"),
        }

        let source = source.map(str::trim).filter(|s| !s.is_empty());

        if let Some(source) = source {
            match self.try_inline(source) {
                Ok(Some(blob)) => {
                    self.persist(&blob).await;
                    return authenticated(blob, CredentialOrigin::InlineBundle);
                },
                Ok(None) => {},
                Err(e) => warn!(error = %e, "inline session bundle rejected"),
            }

            match self.try_archive(source).await {
                Ok(Some(blob)) => {
                    self.persist(&blob).await;
                    return authenticated(blob, CredentialOrigin::RemoteArchive);
                },
                Ok(None) => {},
                Err(e) => warn!(error = %e, "remote session archive unavailable"),
            }
        }

        info!("no usable credentials, pairing required");
        BootstrapOutcome::PairingRequired
    }

    fn try_inline(&self, source: &str) -> Result<Option<CredentialBlob>> {
        let Some(payload) = source.strip_prefix(self.inline_marker.as_str()) else {
            return Ok(None);
        };
        let json = decode_inline_bundle(payload)?;
        let blob = CredentialBlob::new(json);
        if !blob.is_json() {
            warn!("inline bundle decoded to non-JSON credentials");
        }
        Ok(Some(blob))
    }

    async fn try_archive(&self, source: &str) -> Result<Option<CredentialBlob>> {
        let Some(reference) = ArchiveRef::parse(source, &self.archive_marker)? else {
            return Ok(None);
        };
        let Some(fetcher) = &self.fetcher else {
            return Err(Error::from_message(
                "archive reference given but no archive base url is configured".into(),
            ));
        };
        let body = fetcher.fetch(&reference.file_id).await?;
        let plaintext = reference.open(&body)?;
        let json = String::from_utf8(plaintext)
            .map_err(|_| Error::Decrypt("archive is not valid UTF-8".into()))?;
        debug!(file_id = %reference.file_id, "session archive decrypted");
        Ok(Some(CredentialBlob::new(json)))
    }

    async fn persist(&self, blob: &CredentialBlob) {
        if let Err(e) = self.store.save(blob).await {
            warn!(error = %e, "failed to persist credentials, continuing in memory");
        }
    }
}

fn authenticated(blob: CredentialBlob, origin: CredentialOrigin) -> BootstrapOutcome {
    info!(%origin, "credentials resolved");
    BootstrapOutcome::Authenticated {
        handle: CredentialHandle::authenticated(blob),
        origin,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{archive::seal_archive, bundle::encode_inline_bundle},
        async_trait::async_trait,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    const CREDS: &str = r#"{"me":{"id":"447700900000@s.whatsapp.net"}}"#;

    struct StaticFetcher {
        body: Option<Vec<u8>>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(body: Option<Vec<u8>>) -> Arc<Self> {
            Arc::new(Self {
                body,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ArchiveFetcher for StaticFetcher {
        async fn fetch(&self, _file_id: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body.clone().ok_or(Error::HttpStatus { status: 404 })
        }
    }

    fn bootstrapper(dir: &std::path::Path) -> Bootstrapper {
        Bootstrapper::new(CredentialStore::new(dir), &SessionConfig::default())
    }

    #[tokio::test]
    async fn local_file_wins_and_skips_sources() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = StaticFetcher::new(None);
        let boot = bootstrapper(dir.path()).with_fetcher(fetcher.clone());
        boot.store().save(&CredentialBlob::new(CREDS)).await.unwrap();

        let outcome = boot.bootstrap(Some("Gifted~f1#key")).await;
        assert_eq!(outcome.origin(), Some(CredentialOrigin::LocalFile));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        let handle = outcome.into_handle();
        assert_eq!(handle.state(), CredentialState::Authenticated);
        assert_eq!(handle.blob().unwrap().expose(), CREDS);
    }

    #[tokio::test]
    async fn inline_bundle_is_decoded_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let boot = bootstrapper(dir.path());
        let source = encode_inline_bundle("Zenor~", CREDS).unwrap();

        let outcome = boot.bootstrap(Some(&source)).await;
        assert_eq!(outcome.origin(), Some(CredentialOrigin::InlineBundle));
        let stored = boot.store().load().await.unwrap().unwrap();
        assert_eq!(stored.expose(), CREDS);

        // Next start uses the file.
        let again = boot.bootstrap(Some(&source)).await;
        assert_eq!(again.origin(), Some(CredentialOrigin::LocalFile));
    }

    #[tokio::test]
    async fn malformed_bundle_falls_through_to_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let boot = bootstrapper(dir.path());

        let outcome = boot.bootstrap(Some("Zenor~%%%not-base64%%%")).await;
        assert!(matches!(outcome, BootstrapOutcome::PairingRequired));
        assert!(!boot.store().exists().await);
    }

    #[tokio::test]
    async fn bad_magic_falls_through_to_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let boot = bootstrapper(dir.path());
        // base64 of plain JSON, no compression header
        let outcome = boot.bootstrap(Some("Zenor~eyJtZSI6e319")).await;
        assert!(matches!(outcome, BootstrapOutcome::PairingRequired));
        assert_eq!(outcome.into_handle().state(), CredentialState::PendingPairing);
    }

    #[tokio::test]
    async fn remote_archive_is_fetched_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (body, key) = seal_archive(CREDS.as_bytes()).unwrap();
        let fetcher = StaticFetcher::new(Some(body));
        let boot = bootstrapper(dir.path()).with_fetcher(fetcher.clone());

        let outcome = boot.bootstrap(Some(&format!("Gifted~f1#{key}"))).await;
        assert_eq!(outcome.origin(), Some(CredentialOrigin::RemoteArchive));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            boot.store().load().await.unwrap().unwrap().expose(),
            CREDS
        );
    }

    #[tokio::test]
    async fn failed_fetch_falls_through_to_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let (_, key) = seal_archive(b"unused").unwrap();
        let boot = bootstrapper(dir.path()).with_fetcher(StaticFetcher::new(None));

        let outcome = boot.bootstrap(Some(&format!("Gifted~f1#{key}"))).await;
        assert!(matches!(outcome, BootstrapOutcome::PairingRequired));
    }

    #[tokio::test]
    async fn undecryptable_archive_falls_through_to_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let (body, _) = seal_archive(CREDS.as_bytes()).unwrap();
        let (_, wrong_key) = seal_archive(b"other").unwrap();
        let boot = bootstrapper(dir.path()).with_fetcher(StaticFetcher::new(Some(body)));

        let outcome = boot.bootstrap(Some(&format!("Gifted~f1#{wrong_key}"))).await;
        assert!(matches!(outcome, BootstrapOutcome::PairingRequired));
        assert!(!boot.store().exists().await);
    }

    #[tokio::test]
    async fn archive_without_base_url_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let boot = bootstrapper(dir.path());
        let outcome = boot.bootstrap(Some("Gifted~f1#key")).await;
        assert!(matches!(outcome, BootstrapOutcome::PairingRequired));
    }

    #[tokio::test]
    async fn no_source_means_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let boot = bootstrapper(dir.path());
        assert!(matches!(
            boot.bootstrap(None).await,
            BootstrapOutcome::PairingRequired
        ));
        assert!(matches!(
            boot.bootstrap(Some("   ")).await,
            BootstrapOutcome::PairingRequired
        ));
    }

    #[tokio::test]
    async fn unrecognized_source_means_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let boot = bootstrapper(dir.path());
        assert!(matches!(
            boot.bootstrap(Some("something-else")).await,
            BootstrapOutcome::PairingRequired
        ));
    }

    #[tokio::test]
    async fn persist_failure_keeps_in_memory_credentials() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the session directory should be.
        let blocker = dir.path().join("session");
        std::fs::write(&blocker, b"").unwrap();
        let boot = bootstrapper(&blocker);
        let source = encode_inline_bundle("Zenor~", CREDS).unwrap();

        let outcome = boot.bootstrap(Some(&source)).await;
        assert_eq!(outcome.origin(), Some(CredentialOrigin::InlineBundle));
        assert_eq!(outcome.into_handle().blob().unwrap().expose(), CREDS);
    }
}
