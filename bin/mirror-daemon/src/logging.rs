//! `tracing-subscriber` setup (§10 "Logging"): console or file output, with
//! the `--log-level`/`log_level` value seeding the `EnvFilter` default.

use std::path::Path;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Maps the spec's `{debug, info, warning, error}` level names onto the
/// names `tracing`'s filter parser actually recognizes (`warn`, not
/// `warning`) before handing the string off.
fn normalize_level(log_level: &str) -> String {
    if log_level.eq_ignore_ascii_case("warning") {
        "warn".to_string()
    } else {
        log_level.to_string()
    }
}

pub fn init(console: bool, log_file: Option<&str>, log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(normalize_level(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    if console || log_file.is_none() {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
        return Ok(());
    }

    let path = log_file.expect("checked above");
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating log directory for {path}"))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {path}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(file)
        .with_ansi(false)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_maps_to_warn() {
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("Warning"), "warn");
    }

    #[test]
    fn other_levels_pass_through() {
        assert_eq!(normalize_level("debug"), "debug");
        assert_eq!(normalize_level("info"), "info");
        assert_eq!(normalize_level("error"), "error");
    }
}
