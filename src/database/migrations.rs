// Baseline schema migrator
// Applies the scheduler's tables to the target database and records each applied
// statement with its checksum, so re-running an install skips what is already there.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::database::connection::DatabaseHandle;
use crate::security::crypto::sha256_hex;
use crate::utils::validation::quote_mysql_ident;

/// Ledger of applied baseline statements (name -> checksum).
pub const LEDGER_TABLE: &str = "migration";

/// Baseline schema: `(migration name, table, DDL template)`.
/// `{table}` is replaced with the database-qualified, prefixed table name.
const BASELINE: &[(&str, &str, &str)] = &[
    (
        "001_create_user",
        "user",
        r#"CREATE TABLE IF NOT EXISTS {table} (
    `id` INT UNSIGNED NOT NULL AUTO_INCREMENT,
    `name` VARCHAR(32) NOT NULL,
    `password` VARCHAR(255) NOT NULL,
    `email` VARCHAR(64) NOT NULL DEFAULT '',
    `is_admin` TINYINT NOT NULL DEFAULT 0,
    `status` TINYINT NOT NULL DEFAULT 1,
    `created` DATETIME NOT NULL,
    `updated` DATETIME NULL,
    PRIMARY KEY (`id`),
    UNIQUE KEY `uk_user_name` (`name`),
    UNIQUE KEY `uk_user_email` (`email`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8"#,
    ),
    (
        "002_create_host",
        "host",
        r#"CREATE TABLE IF NOT EXISTS {table} (
    `id` SMALLINT UNSIGNED NOT NULL AUTO_INCREMENT,
    `name` VARCHAR(64) NOT NULL,
    `alias` VARCHAR(32) NOT NULL DEFAULT '',
    `port` INT NOT NULL DEFAULT 5921,
    `remark` VARCHAR(100) NOT NULL DEFAULT '',
    PRIMARY KEY (`id`),
    UNIQUE KEY `uk_host_name` (`name`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8"#,
    ),
    (
        "003_create_task",
        "task",
        r#"CREATE TABLE IF NOT EXISTS {table} (
    `id` INT UNSIGNED NOT NULL AUTO_INCREMENT,
    `name` VARCHAR(64) NOT NULL,
    `spec` VARCHAR(64) NOT NULL,
    `protocol` TINYINT NOT NULL,
    `command` VARCHAR(512) NOT NULL,
    `timeout` MEDIUMINT NOT NULL DEFAULT 0,
    `multi` TINYINT NOT NULL DEFAULT 1,
    `retry_times` TINYINT NOT NULL DEFAULT 0,
    `host_id` SMALLINT UNSIGNED NOT NULL DEFAULT 0,
    `notify_status` TINYINT NOT NULL DEFAULT 1,
    `notify_type` TINYINT NOT NULL DEFAULT 0,
    `notify_receiver_id` VARCHAR(256) NOT NULL DEFAULT '',
    `status` TINYINT NOT NULL DEFAULT 0,
    `remark` VARCHAR(100) NOT NULL DEFAULT '',
    `created` DATETIME NOT NULL,
    `deleted` DATETIME NULL,
    PRIMARY KEY (`id`),
    KEY `idx_task_host` (`host_id`),
    KEY `idx_task_status` (`status`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8"#,
    ),
    (
        "004_create_task_log",
        "task_log",
        r#"CREATE TABLE IF NOT EXISTS {table} (
    `id` BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
    `task_id` INT UNSIGNED NOT NULL DEFAULT 0,
    `name` VARCHAR(64) NOT NULL,
    `spec` VARCHAR(64) NOT NULL,
    `protocol` TINYINT NOT NULL,
    `command` VARCHAR(512) NOT NULL,
    `timeout` MEDIUMINT NOT NULL DEFAULT 0,
    `retry_times` TINYINT NOT NULL DEFAULT 0,
    `hostname` VARCHAR(128) NOT NULL DEFAULT '',
    `start_time` DATETIME NULL,
    `end_time` DATETIME NULL,
    `status` TINYINT NOT NULL DEFAULT 1,
    `result` MEDIUMTEXT NOT NULL,
    PRIMARY KEY (`id`),
    KEY `idx_task_log_task` (`task_id`),
    KEY `idx_task_log_status` (`status`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8"#,
    ),
    (
        "005_create_setting",
        "setting",
        r#"CREATE TABLE IF NOT EXISTS {table} (
    `id` INT UNSIGNED NOT NULL AUTO_INCREMENT,
    `code` VARCHAR(32) NOT NULL,
    `key` VARCHAR(64) NOT NULL,
    `value` VARCHAR(4096) NOT NULL DEFAULT '',
    PRIMARY KEY (`id`),
    KEY `idx_setting_code` (`code`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8"#,
    ),
];

const LEDGER_DDL: &str = r#"CREATE TABLE IF NOT EXISTS {table} (
    `name` VARCHAR(128) NOT NULL,
    `checksum` CHAR(64) NOT NULL,
    `applied_at` DATETIME NOT NULL,
    PRIMARY KEY (`name`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8"#;

/// A baseline statement rendered for one database/prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMigration {
    pub name: String,
    pub table: String,
    pub sql: String,
    /// SHA-256 of `sql`.
    pub checksum: String,
}

/// `` `database`.`prefix+table` ``
pub fn qualified_table(database: &str, prefix: &str, table: &str) -> Result<String> {
    Ok(format!(
        "{}.{}",
        quote_mysql_ident(database)?,
        quote_mysql_ident(&format!("{}{}", prefix, table))?
    ))
}

/// Render the baseline schema in execution order.
pub fn baseline_statements(database: &str, prefix: &str) -> Result<Vec<RenderedMigration>> {
    BASELINE
        .iter()
        .map(|(name, table, template)| {
            let sql = template.replace("{table}", &qualified_table(database, prefix, table)?);
            Ok(RenderedMigration {
                name: name.to_string(),
                table: format!("{}{}", prefix, table),
                checksum: sha256_hex(sql.as_bytes()),
                sql,
            })
        })
        .collect()
}

/// Applies the baseline schema to a named database.
#[async_trait]
pub trait SchemaMigrator: Send + Sync {
    /// Returns the names of statements applied by this call.
    async fn migrate(&self, database: &str) -> Result<Vec<String>>;
}

/// Migration runner on the live connection.
pub struct MigrationRunner {
    db: Arc<DatabaseHandle>,
}

impl MigrationRunner {
    pub fn new(db: Arc<DatabaseHandle>) -> Self {
        Self { db }
    }

    async fn ensure_ledger(&self, pool: &MySqlPool, ledger: &str) -> Result<()> {
        sqlx::raw_sql(&LEDGER_DDL.replace("{table}", ledger))
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create migration ledger {}", ledger))?;
        Ok(())
    }

    async fn applied_checksums(&self, pool: &MySqlPool, ledger: &str) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as(&format!("SELECT `name`, `checksum` FROM {}", ledger))
                .fetch_all(pool)
                .await
                .with_context(|| format!("Failed to read migration ledger {}", ledger))?;
        Ok(rows.into_iter().collect())
    }

    async fn apply_one(&self, pool: &MySqlPool, ledger: &str, m: &RenderedMigration) -> Result<()> {
        let started = Instant::now();

        sqlx::raw_sql(&m.sql)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute migration {}", m.name))?;

        sqlx::query(&format!(
            "INSERT INTO {} (`name`, `checksum`, `applied_at`) VALUES (?, ?, ?)",
            ledger
        ))
        .bind(&m.name)
        .bind(&m.checksum)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await
        .with_context(|| format!("Failed to record migration {}", m.name))?;

        info!(
            "[PHASE: install] [STEP: schema] applied migration (name={}, table={}, duration_ms={})",
            m.name,
            m.table,
            started.elapsed().as_millis()
        );
        Ok(())
    }
}

#[async_trait]
impl SchemaMigrator for MigrationRunner {
    async fn migrate(&self, database: &str) -> Result<Vec<String>> {
        let (pool, section) = self.db.current().await?;
        if section.database != database {
            warn!(
                "[PHASE: install] [STEP: schema] target database differs from live connection (target={}, live={})",
                database, section.database
            );
        }

        let ledger = qualified_table(database, &section.prefix, LEDGER_TABLE)?;
        let statements = baseline_statements(database, &section.prefix)?;

        self.ensure_ledger(&pool, &ledger).await?;
        let applied = self.applied_checksums(&pool, &ledger).await?;

        let mut newly_applied = Vec::new();
        for m in &statements {
            match applied.get(&m.name) {
                Some(existing) if *existing == m.checksum => continue,
                Some(existing) => anyhow::bail!(
                    "Checksum mismatch for migration {}: recorded {}, expected {}",
                    m.name,
                    existing,
                    m.checksum
                ),
                None => {
                    self.apply_one(&pool, &ledger, m).await?;
                    newly_applied.push(m.name.clone());
                }
            }
        }

        info!(
            "[PHASE: install] [STEP: schema] baseline schema ready (database={}, applied={}, skipped={})",
            database,
            newly_applied.len(),
            statements.len() - newly_applied.len()
        );
        Ok(newly_applied)
    }
}
