use anyhow::{Context, Result, bail};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "IMAGE_SERVICE_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Directory that uploaded images are stored in
    pub upload_dir: PathBuf,
    /// redb file holding image records
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_file: String,
    /// Number of filter applications the worker keeps in flight at once
    pub dispatch_width: usize,
    /// Size of the rayon pool that runs filters; 0 uses the rayon default
    pub filter_threads: usize,
    /// Upload size limit (MB)
    pub upload_limit_mb: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            database_path: PathBuf::from("./db/images.redb"),
            log_dir: PathBuf::from("./logs"),
            log_file: "service_report.log".to_string(),
            dispatch_width: 1,
            filter_threads: 0,
            upload_limit_mb: 64,
        }
    }
}

impl AppConfig {
    /// Read `.env` if present, then overlay `IMAGE_SERVICE_*` variables on the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let config = envy::prefixed(ENV_PREFIX)
            .from_env::<AppConfig>()
            .context("Failed to read IMAGE_SERVICE_* environment variables")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_iter<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed(ENV_PREFIX)
            .from_iter::<_, AppConfig>(vars)
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch_width == 0 {
            bail!("dispatch_width must be at least 1");
        }
        if self.log_file.trim().is_empty() {
            bail!("log_file must not be empty");
        }
        Ok(())
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }
}
