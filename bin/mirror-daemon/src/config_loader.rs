//! Loads a [`sync_core::MirrorConfig`] from a JSON or TOML file, selected by
//! extension (§6 "Configuration file format").

use std::path::Path;

use anyhow::Context;
use sync_core::MirrorConfig;

pub fn load(path: &Path) -> anyhow::Result<MirrorConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&raw).with_context(|| format!("parsing {} as TOML", path.display())),
        _ => serde_json::from_str(&raw).with_context(|| format!("parsing {} as JSON", path.display())),
    }
}
