use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, overrides::apply_env_overrides, schema::WabridgeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "wabridge.toml",
    "wabridge.yaml",
    "wabridge.yml",
    "wabridge.json",
];

/// Resolve the effective configuration.
///
/// An explicit `path` must exist and parse. Without one, the standard
/// locations are searched (see [`discover_and_load`]). Environment overrides
/// are applied last and the result is validated.
pub fn load(path: Option<&Path>) -> anyhow::Result<WabridgeConfig> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<WabridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./wabridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wabridge/wabridge.{toml,yaml,yml,json}` (user-global)
///
/// Returns `WabridgeConfig::default()` if no file is found or the file
/// found cannot be parsed.
pub fn discover_and_load() -> WabridgeConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return WabridgeConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            WabridgeConfig::default()
        },
    }
}

fn find_config_file() -> Option<PathBuf> {
    let mut dirs = vec![PathBuf::from(".")];
    if let Some(dir) = config_dir() {
        dirs.push(dir);
    }
    find_in(&dirs)
}

fn find_in(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Returns `~/.config/wabridge/` on all platforms.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("wabridge"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<WabridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 3100

[delivery]
ack_timeout_secs = 5
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 3100);
        assert_eq!(cfg.delivery.ack_timeout_secs, 5);
        assert_eq!(cfg.delivery.retention_secs, 3600);
        assert_eq!(cfg.media.retention_secs, 60);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("wabridge.yaml");
        std::fs::write(&yaml, "sessions:\n  sweep_interval_secs: 60\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().sessions.sweep_interval_secs, 60);

        let json = dir.path().join("wabridge.json");
        std::fs::write(&json, r#"{"webhooks":{"timeout_secs":3}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().webhooks.timeout_secs, 3);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabridge.ini");
        std::fs::write(&path, "port=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn find_in_respects_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("wabridge.json"), "{}").unwrap();
        std::fs::write(dir.path().join("wabridge.toml"), "").unwrap();
        let found = find_in(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(found.file_name().unwrap(), "wabridge.toml");
    }
}
