use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    zenor_config::ZenorConfig,
    zenor_session::{CredentialStore, archive::seal_archive, bundle::encode_inline_bundle},
};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Print an inline session string for a credentials file.
    Pack {
        /// Credentials JSON file (for example `session/creds.json`).
        file: PathBuf,
    },
    /// Encrypt a credentials file into an archive and print its key.
    Seal {
        file: PathBuf,
        /// Where to write the encrypted archive.
        out: PathBuf,
    },
    /// Delete the stored credentials.
    Clear,
}

pub async fn handle_session(action: SessionAction, config: &ZenorConfig) -> Result<()> {
    match action {
        SessionAction::Pack { file } => {
            let json = read_credentials(&file)?;
            println!("{}", encode_inline_bundle(&config.session.inline_marker, &json)?);
        },
        SessionAction::Seal { file, out } => {
            let json = read_credentials(&file)?;
            let (body, key) = seal_archive(json.as_bytes())?;
            std::fs::write(&out, body).with_context(|| format!("writing {}", out.display()))?;
            eprintln!(
                "Wrote {}. Upload it and use {}<file-id>#<key> as the session source.",
                out.display(),
                config.session.archive_marker
            );
            println!("{key}");
        },
        SessionAction::Clear => {
            let store = CredentialStore::new(config.session.dir.clone());
            if store.clear().await? {
                println!("Removed {}", store.path().display());
            } else {
                println!("No stored credentials at {}", store.path().display());
            }
        },
    }
    Ok(())
}

/// Read a credentials file, refusing anything that is not JSON.
fn read_credentials(path: &Path) -> Result<String> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str::<serde_json::Value>(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(raw)
}
