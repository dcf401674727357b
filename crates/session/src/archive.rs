//! Remote encrypted credential archives referenced as `<marker><fileId>#<key>`.
//!
//! The object store serves the archive body at `{base_url}/{fileId}`. The body
//! is `[nonce: 24 bytes][XChaCha20-Poly1305 ciphertext + tag]`. The key is 32
//! bytes, URL-safe base64 without padding.

#[allow(deprecated)]
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::RngCore,
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use crate::error::{Error, Result};

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Associated data bound into every archive.
const ARCHIVE_AAD: &[u8] = b"zenor-session-archive";

/// A parsed `fileId#key` archive reference.
pub struct ArchiveRef {
    pub file_id: String,
    key: Secret<String>,
}

impl ArchiveRef {
    /// Parse `source` if it carries `marker`. Returns `Ok(None)` when the
    /// marker is absent.
    pub fn parse(source: &str, marker: &str) -> Result<Option<Self>> {
        let Some(start) = source.find(marker) else {
            return Ok(None);
        };
        let rest = source[start + marker.len()..].trim();
        let Some((file_id, key)) = rest.split_once('#') else {
            return Err(Error::InvalidArchiveRef("missing '#' delimiter".into()));
        };
        if file_id.is_empty() || key.is_empty() {
            return Err(Error::InvalidArchiveRef(
                "file id and key must both be non-empty".into(),
            ));
        }
        Ok(Some(Self {
            file_id: file_id.to_string(),
            key: Secret::new(key.to_string()),
        }))
    }

    fn key_bytes(&self) -> Result<[u8; KEY_LEN]> {
        decode_key(self.key.expose_secret())
    }

    /// Decrypt a fetched archive body with this reference's key.
    pub fn open(&self, body: &[u8]) -> Result<Vec<u8>> {
        open_archive(&self.key_bytes()?, body)
    }
}

impl std::fmt::Debug for ArchiveRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveRef")
            .field("file_id", &self.file_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('='))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::InvalidArchiveRef(format!(
            "key must be {KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

/// Source of raw archive bodies.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// Fetches archives over HTTP from `{base_url}/{file_id}`.
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArchiveFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{file_id}", self.base_url);
        debug!(%url, "fetching session archive");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Decrypt an archive body.
#[allow(deprecated)]
pub fn open_archive(key: &[u8; KEY_LEN], body: &[u8]) -> Result<Vec<u8>> {
    if body.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::Decrypt("archive too short".into()));
    }
    let (nonce, ciphertext) = body.split_at(NONCE_LEN);
    XChaCha20Poly1305::new(key.into())
        .decrypt(XNonce::from_slice(nonce), Payload {
            msg: ciphertext,
            aad: ARCHIVE_AAD,
        })
        .map_err(|e| Error::Decrypt(e.to_string()))
}

/// Encrypt `plaintext` under a fresh random key.
///
/// Returns the archive body and the key in reference form (URL-safe base64).
#[allow(deprecated)]
pub fn seal_archive(plaintext: &[u8]) -> Result<(Vec<u8>, String)> {
    let mut key = [0u8; KEY_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut key);
    rng.fill_bytes(&mut nonce);

    let ciphertext = XChaCha20Poly1305::new((&key).into())
        .encrypt(XNonce::from_slice(&nonce), Payload {
            msg: plaintext,
            aad: ARCHIVE_AAD,
        })
        .map_err(|e| Error::Decrypt(e.to_string()))?;

    let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);
    Ok((body, URL_SAFE_NO_PAD.encode(key)))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn parses_reference() {
        let r = ArchiveRef::parse("Gifted~abc123#S2V5", "Gifted~")
            .unwrap()
            .unwrap();
        assert_eq!(r.file_id, "abc123");
        assert!(!format!("{r:?}").contains("S2V5"));
    }

    #[test]
    fn missing_marker_is_not_a_reference() {
        assert!(ArchiveRef::parse("Zenor~H4sI", "Gifted~").unwrap().is_none());
    }

    #[rstest]
    #[case("Gifted~abc123")]
    #[case("Gifted~#key")]
    #[case("Gifted~id#")]
    fn rejects_malformed(#[case] source: &str) {
        assert!(matches!(
            ArchiveRef::parse(source, "Gifted~"),
            Err(Error::InvalidArchiveRef(_))
        ));
    }

    #[test]
    fn seal_then_open() {
        let (body, key) = seal_archive(b"{\"me\":{}}").unwrap();
        let r = ArchiveRef::parse(&format!("Gifted~f1#{key}"), "Gifted~")
            .unwrap()
            .unwrap();
        assert_eq!(r.open(&body).unwrap(), b"{\"me\":{}}");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let (body, _) = seal_archive(b"creds").unwrap();
        let (_, other_key) = seal_archive(b"other").unwrap();
        let r = ArchiveRef::parse(&format!("Gifted~f1#{other_key}"), "Gifted~")
            .unwrap()
            .unwrap();
        assert!(matches!(r.open(&body), Err(Error::Decrypt(_))));
    }

    #[test]
    fn short_key_is_rejected() {
        let r = ArchiveRef::parse("Gifted~f1#c2hvcnQ", "Gifted~")
            .unwrap()
            .unwrap();
        assert!(matches!(
            r.open(&[0u8; 64]),
            Err(Error::InvalidArchiveRef(_))
        ));
    }

    #[tokio::test]
    async fn http_fetcher_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/f1")
            .with_status(200)
            .with_body(b"archive-bytes")
            .create_async()
            .await;

        let fetcher = HttpArchiveFetcher::new(format!("{}/", server.url()));
        let body = fetcher.fetch("f1").await.unwrap();
        assert_eq!(body, b"archive-bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_fetcher_maps_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = HttpArchiveFetcher::new(server.url());
        assert!(matches!(
            fetcher.fetch("missing").await,
            Err(Error::HttpStatus { status: 404 })
        ));
    }
}
