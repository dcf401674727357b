use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::{BotMode, ZenorConfig},
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["zenor.toml", "zenor.yaml", "zenor.yml", "zenor.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<ZenorConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&substitute_env(&raw), path)
}

/// Load `explicit` if given, otherwise discover a config file in the standard
/// locations. Falls back to defaults when nothing is found or parsing fails.
///
/// Search order:
/// 1. `./zenor.{toml,yaml,yml,json}`
/// 2. `~/.config/zenor/zenor.{toml,yaml,yml,json}`
pub fn discover_and_load(explicit: Option<&Path>) -> ZenorConfig {
    let path = explicit.map(Path::to_path_buf).or_else(find_config_file);
    let Some(path) = path else {
        debug!("no config file found, using defaults");
        return ZenorConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            ZenorConfig::default()
        },
    }
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/zenor/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "zenor").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<ZenorConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

/// Apply the bot's environment variables on top of file values.
pub fn apply_env_overrides(config: &mut ZenorConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_overrides_with(config: &mut ZenorConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(source) = get("SESSION_SOURCE").or_else(|| get("SESSION_ID")) {
        config.session.source = Some(Secret::new(source));
    }
    if let Some(dir) = get("ZENOR_SESSION_DIR") {
        config.session.dir = PathBuf::from(dir);
    }
    if let Some(url) = get("ZENOR_ARCHIVE_URL") {
        config.session.archive_base_url = Some(url);
    }
    if let Some(prefix) = get("PREFIX") {
        config.bot.prefix = prefix;
    }
    if let Some(mode) = get("MODE") {
        match mode.parse::<BotMode>() {
            Ok(mode) => config.bot.mode = mode,
            Err(e) => warn!(error = %e, "ignoring MODE override"),
        }
    }
    if let Some(owner) = get("OWNER_NUMBER") {
        config.bot.owner_numbers = owner.split(',').map(|n| n.trim().to_string()).collect();
    }
    override_bool(&get, "AUTO_REACT", &mut config.reactions.auto_react);
    override_bool(&get, "AUTO_STATUS_SEEN", &mut config.status.auto_seen);
    override_bool(&get, "AUTO_STATUS_REPLY", &mut config.status.auto_reply);
    if let Some(text) = get("STATUS_READ_MSG") {
        config.status.reply_text = text;
    }
}

fn override_bool(get: &impl Fn(&str) -> Option<String>, name: &str, target: &mut bool) {
    let Some(raw) = get(name) else {
        return;
    };
    match parse_bool(&raw) {
        Some(value) => *target = value,
        None => warn!(name, value = %raw, "ignoring non-boolean override"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::collections::HashMap};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zenor.toml");
        std::fs::write(&path, "[bot]\nprefix = \"!\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.bot.prefix, "!");
    }

    #[test]
    fn loads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zenor.yaml");
        std::fs::write(&path, "status:\n  auto_reply: true\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert!(cfg.status.auto_reply);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zenor.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn broken_explicit_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zenor.toml");
        std::fs::write(&path, "[bot\n").unwrap();
        let cfg = discover_and_load(Some(&path));
        assert_eq!(cfg.bot.prefix, ".");
    }

    #[test]
    fn env_overrides() {
        let mut cfg = ZenorConfig::default();
        apply_overrides_with(
            &mut cfg,
            env(&[
                ("SESSION_ID", "Zenor~abc"),
                ("MODE", "private"),
                ("AUTO_REACT", "true"),
                ("AUTO_STATUS_SEEN", "no"),
                ("STATUS_READ_MSG", "seen"),
                ("OWNER_NUMBER", "441, 442"),
            ]),
        );
        assert_eq!(cfg.session.source.unwrap().expose_secret(), "Zenor~abc");
        assert_eq!(cfg.bot.mode, BotMode::Private);
        assert!(cfg.reactions.auto_react);
        assert!(!cfg.status.auto_seen);
        assert_eq!(cfg.status.reply_text, "seen");
        assert_eq!(cfg.bot.owner_numbers, vec!["441", "442"]);
    }

    #[test]
    fn session_source_wins_over_session_id() {
        let mut cfg = ZenorConfig::default();
        apply_overrides_with(
            &mut cfg,
            env(&[("SESSION_ID", "old"), ("SESSION_SOURCE", "new")]),
        );
        assert_eq!(cfg.session.source.unwrap().expose_secret(), "new");
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut cfg = ZenorConfig::default();
        apply_overrides_with(
            &mut cfg,
            env(&[("MODE", "sometimes"), ("AUTO_REACT", "maybe"), ("PREFIX", "  ")]),
        );
        assert_eq!(cfg.bot.mode, BotMode::Public);
        assert!(!cfg.reactions.auto_react);
        assert_eq!(cfg.bot.prefix, ".");
    }
}
