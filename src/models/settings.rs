// Installer settings
//
// Layered: built-in defaults (relative to the app root) <- optional installer.toml
// <- SCHEDULER_INSTALLER_* environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::security::password::DEFAULT_COST;
use crate::utils::path_resolver::{
    default_config_file, default_lock_file, default_log_folder, default_settings_file,
};

pub const ENV_PREFIX: &str = "SCHEDULER_INSTALLER";

/// Character set written into the `db` section and used for every connection.
pub const DEFAULT_CHARSET: &str = "utf8";

#[derive(Debug, Clone, Deserialize)]
pub struct InstallerSettings {
    /// Application config the installer writes (`[db]` section lives here).
    pub config_file: PathBuf,
    /// Install lock marker.
    pub lock_file: PathBuf,
    pub log_dir: PathBuf,
    pub charset: String,
    pub connect_timeout_secs: u64,
    pub max_connections: u32,
    pub password_cost: u32,
}

impl InstallerSettings {
    /// Load settings for an application rooted at `app_root`.
    ///
    /// `settings_file` overrides `<root>/conf/installer.toml`; a missing file is fine.
    pub fn load(app_root: &Path, settings_file: Option<&Path>) -> Result<Self> {
        let settings_path = settings_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_settings_file(app_root));

        let cfg = Config::builder()
            .set_default(
                "config_file",
                default_config_file(app_root).to_string_lossy().to_string(),
            )?
            .set_default(
                "lock_file",
                default_lock_file(app_root).to_string_lossy().to_string(),
            )?
            .set_default(
                "log_dir",
                default_log_folder(app_root).to_string_lossy().to_string(),
            )?
            .set_default("charset", DEFAULT_CHARSET)?
            .set_default("connect_timeout_secs", 20)?
            .set_default("max_connections", 5)?
            .set_default("password_cost", DEFAULT_COST)?
            .add_source(File::from(settings_path.clone()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .with_context(|| format!("Failed to load installer settings: {:?}", settings_path))?;

        let settings: InstallerSettings = cfg
            .try_deserialize()
            .context("Installer settings are malformed")?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<()> {
        if self.charset.trim().is_empty() {
            anyhow::bail!("charset must not be empty");
        }
        if self.connect_timeout_secs == 0 {
            anyhow::bail!("connect_timeout_secs must be positive");
        }
        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be positive");
        }
        if !(4..=31).contains(&self.password_cost) {
            anyhow::bail!("password_cost must be between 4 and 31");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_app_root_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = InstallerSettings::load(dir.path(), None).expect("load");

        assert_eq!(settings.config_file, dir.path().join("conf").join("app.toml"));
        assert_eq!(settings.lock_file, dir.path().join("data").join("install.lock"));
        assert_eq!(settings.charset, "utf8");
        assert_eq!(settings.connect_timeout(), Duration::from_secs(20));
        assert_eq!(settings.password_cost, DEFAULT_COST);
    }

    #[test]
    fn settings_file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("custom.toml");
        std::fs::write(
            &file,
            "lock_file = \"/var/lib/cron/install.lock\"\nconnect_timeout_secs = 5\n",
        )
        .expect("write settings");

        let settings = InstallerSettings::load(dir.path(), Some(&file)).expect("load");
        assert_eq!(settings.lock_file, PathBuf::from("/var/lib/cron/install.lock"));
        assert_eq!(settings.connect_timeout_secs, 5);
        assert_eq!(settings.max_connections, 5);
    }

    #[test]
    fn out_of_range_cost_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "password_cost = 2\n").expect("write settings");

        assert!(InstallerSettings::load(dir.path(), Some(&file)).is_err());
    }
}
