//! Persistent application config.
//!
//! The config is a two-level map (section -> key -> value) stored as TOML. The
//! installer owns the `db` section. Everything else in the file (top-level keys,
//! arrays, nested tables, typed values) is written back as it was read; only
//! `read()` flattens it into strings.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::models::requests::{DbEngine, InstallRequest};

pub type PersistedConfig = BTreeMap<String, BTreeMap<String, String>>;

pub const DB_SECTION: &str = "db";

/// Keys a complete `db` section must carry.
pub const DB_KEYS: [&str; 8] = [
    "engine", "host", "port", "user", "password", "database", "prefix", "charset",
];

/// The `db` section as typed values.
#[derive(Clone, PartialEq, Eq)]
pub struct DbSection {
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub prefix: String,
    pub charset: String,
}

impl std::fmt::Debug for DbSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSection")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("prefix", &self.prefix)
            .field("charset", &self.charset)
            .finish()
    }
}

impl DbSection {
    pub fn from_request(req: &InstallRequest, charset: &str) -> Self {
        Self {
            engine: req.db_type.as_str().to_string(),
            host: req.db_host.clone(),
            port: req.port(),
            user: req.db_username.clone(),
            password: req.db_password.clone(),
            database: req.db_name.clone(),
            prefix: req.db_table_prefix.clone(),
            charset: charset.to_string(),
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("engine".to_string(), self.engine.clone()),
            ("host".to_string(), self.host.clone()),
            ("port".to_string(), self.port.to_string()),
            ("user".to_string(), self.user.clone()),
            ("password".to_string(), self.password.clone()),
            ("database".to_string(), self.database.clone()),
            ("prefix".to_string(), self.prefix.clone()),
            ("charset".to_string(), self.charset.clone()),
        ])
    }

    /// Read the `db` section back; every key in `DB_KEYS` must be present.
    pub fn from_config(config: &PersistedConfig) -> Result<Self> {
        let section = config
            .get(DB_SECTION)
            .ok_or_else(|| anyhow::anyhow!("Config has no [{}] section", DB_SECTION))?;

        let missing: Vec<&str> = DB_KEYS
            .iter()
            .copied()
            .filter(|k| !section.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("[{}] section is missing keys: {}", DB_SECTION, missing.join(", "));
        }

        let get = |k: &str| section.get(k).cloned().unwrap_or_default();
        let port: u16 = get("port")
            .parse()
            .with_context(|| format!("[{}] port is not a valid port number", DB_SECTION))?;
        let engine = DbEngine::parse(&get("engine"))
            .ok_or_else(|| anyhow::anyhow!("[{}] engine {:?} is not supported", DB_SECTION, get("engine")))?;

        Ok(Self {
            engine: engine.as_str().to_string(),
            host: get("host"),
            port,
            user: get("user"),
            password: get("password"),
            database: get("database"),
            prefix: get("prefix"),
            charset: get("charset"),
        })
    }
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Atomically replace the `db` section.
    async fn write_db_section(&self, db: &DbSection) -> Result<()>;

    /// Read the whole config. A missing store reads as empty.
    async fn read(&self) -> Result<PersistedConfig>;
}

/// TOML file store. Writes go to a sibling temp file which is then renamed over
/// the target, so readers see the old file or the new one and nothing between.
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }

    /// The file as a TOML table, untouched. A missing file is an empty table.
    async fn read_table(&self) -> Result<toml::Table> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!(
                "[PHASE: install] [STEP: config] no existing config (path={:?})",
                self.path
            );
            return Ok(toml::Table::new());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", self.path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", self.path))
    }

    async fn write_table(&self, table: &toml::Table) -> Result<()> {
        let body = toml::to_string(table).context("Failed to serialize config as TOML")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let tmp = self.temp_path();
        let written = async {
            let mut file = tokio::fs::File::create(&tmp)
                .await
                .with_context(|| format!("Failed to create temp config file: {:?}", tmp))?;
            file.write_all(body.as_bytes()).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path)
                .await
                .with_context(|| format!("Failed to move config into place: {:?}", self.path))
        }
        .await;

        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        written
    }
}

#[async_trait]
impl ConfigStore for TomlConfigStore {
    async fn write_db_section(&self, db: &DbSection) -> Result<()> {
        let mut table = self.read_table().await?;
        let section: toml::Table = db
            .to_map()
            .into_iter()
            .map(|(k, v)| (k, toml::Value::String(v)))
            .collect();
        table.insert(DB_SECTION.to_string(), toml::Value::Table(section));
        self.write_table(&table).await?;

        info!(
            "[PHASE: install] [STEP: config] wrote [{}] section (path={:?}, top_level_keys={})",
            DB_SECTION,
            self.path,
            table.len()
        );
        Ok(())
    }

    async fn read(&self) -> Result<PersistedConfig> {
        let value = self.read_table().await?;

        // Scalars are stringified so hand-edited files (port = 3306) still load.
        let mut config = PersistedConfig::new();
        for (section, entries) in value {
            let toml::Value::Table(entries) = entries else {
                continue;
            };
            let mut out = BTreeMap::new();
            for (k, v) in entries {
                let s = match v {
                    toml::Value::String(s) => s,
                    toml::Value::Table(_) | toml::Value::Array(_) => continue,
                    other => other.to_string(),
                };
                out.insert(k, s);
            }
            config.insert(section, out);
        }
        Ok(config)
    }
}
