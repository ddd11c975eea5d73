use anyhow::Result;
use std::path::{Path, PathBuf};

/// Resolve the application root folder (absolute path)
pub fn resolve_app_root() -> Result<PathBuf> {
    // Prefer the folder where the binary is running from (works in dev and deployed)
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return Ok(dir.to_path_buf());
        }
    }

    // Fallback: current working directory
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    Ok(cwd)
}

/// Application config file written by the installer: `<root>/conf/app.toml`
pub fn default_config_file(app_root: &Path) -> PathBuf {
    app_root.join("conf").join("app.toml")
}

/// Install lock marker: `<root>/data/install.lock`
pub fn default_lock_file(app_root: &Path) -> PathBuf {
    app_root.join("data").join("install.lock")
}

/// Installer log folder: `<root>/log`
pub fn default_log_folder(app_root: &Path) -> PathBuf {
    app_root.join("log")
}

/// Optional installer settings file: `<root>/conf/installer.toml`
pub fn default_settings_file(app_root: &Path) -> PathBuf {
    app_root.join("conf").join("installer.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_lives_under_app_root() {
        let root = Path::new("/opt/cron-scheduler");
        assert_eq!(
            default_config_file(root),
            PathBuf::from("/opt/cron-scheduler/conf/app.toml")
        );
        assert_eq!(
            default_lock_file(root),
            PathBuf::from("/opt/cron-scheduler/data/install.lock")
        );
        assert_eq!(default_log_folder(root), PathBuf::from("/opt/cron-scheduler/log"));
    }

    #[test]
    fn app_root_resolves_to_a_directory() {
        let root = resolve_app_root().expect("app root");
        assert!(root.is_dir(), "expected directory, got {:?}", root);
    }
}
