//! Session credentials: durable storage and the bootstrap fallback chain.
//!
//! A process start resolves credentials from, in order, the local credential
//! file, an inline compressed bundle, a remote encrypted archive, and finally
//! falls back to interactive pairing. See [`Bootstrapper::bootstrap`].

pub mod archive;
pub mod bootstrap;
pub mod bundle;
pub mod error;
pub mod store;

pub use {
    archive::{ArchiveFetcher, ArchiveRef, HttpArchiveFetcher},
    bootstrap::{
        BootstrapOutcome, Bootstrapper, CredentialHandle, CredentialOrigin, CredentialState,
    },
    error::{Error, Result},
    store::{CredentialBlob, CredentialStore},
};
