//! Setup/initialization module - handles application startup tasks
//!
//! Includes:
//! - Folder structure initialization
//! - Logger initialization (stdout + log file)

use anyhow::{Context, Result};
use env_logger::{Builder, Env, WriteStyle};
use log::kv::Key;
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
};

use crate::config::AppConfig;

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

/// Create required folder structure for the application
pub fn initialize_folder(config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&config.upload_dir)
        .with_context(|| format!("Failed to create upload dir {:?}", config.upload_dir))?;
    fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log dir {:?}", config.log_dir))?;
    if let Some(parent) = config.database_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database dir {:?}", parent))?;
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

/// A `Write` adapter that copies every formatted record to stdout and the log file.
pub struct TeePipe {
    file: File,
}

impl Write for TeePipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = std::io::stdout().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = std::io::stdout().flush();
        self.file.flush()
    }
}

/// Initialize the logger. `RUST_LOG` overrides the default `info` level.
pub fn initialize_logger(config: &AppConfig) -> Result<()> {
    let log_path = config.log_path();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .write_style(WriteStyle::Never)
        .format(|buf, record| {
            let ts = buf.timestamp();

            // Duration key-value, padded to a fixed column
            let dur = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| format!("{:>10}", v.to_string()))
                .unwrap_or_else(|| " ".repeat(10));

            writeln!(
                buf,
                "{} {:<5} {}:{} {} {}",
                ts,
                record.level(),
                record.target(),
                record.line().unwrap_or_default(),
                dur,
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(TeePipe { file })))
        // Rocket is noisy at INFO
        .filter(Some("rocket"), log::LevelFilter::Warn)
        .try_init()
        .context("Logger already initialized")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_folder_creates_all_directories() {
        let root = tempfile::tempdir().unwrap();
        let config = AppConfig {
            upload_dir: root.path().join("uploads"),
            database_path: root.path().join("db").join("images.redb"),
            log_dir: root.path().join("logs"),
            ..AppConfig::default()
        };

        initialize_folder(&config).unwrap();
        initialize_folder(&config).unwrap();

        assert!(config.upload_dir.is_dir());
        assert!(config.log_dir.is_dir());
        assert!(root.path().join("db").is_dir());
    }
}
