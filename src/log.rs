// src/log.rs
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global tracing subscriber. Log lines go to `log_file`
/// (appended, created if missing) when given, otherwise to stderr.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());

    let installed = match log_file {
        Some(path) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_writes_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("panpost.log");

        init(Some(&log_path)).unwrap();
        tracing::info!("hello from the test");

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("hello from the test"));

        // A second subscriber cannot be installed in the same process.
        assert!(init(None).is_err());
    }
}
