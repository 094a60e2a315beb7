pub mod config;
pub mod log;
pub mod prompt;
pub mod publish;
pub mod storage;
pub mod watcher;

pub fn work_dir() -> anyhow::Result<std::path::PathBuf> {
    std::env::current_dir().context("Failed to get current directory")
}

use anyhow::Context;
