//! Account persistence.
//!
//! Admin accounts are written through the live pool. The password is hashed
//! before it leaves this module. A second install that names the same
//! username updates that row instead of adding another one. The match is on
//! `name` only; rows with other names are never touched, and an email already
//! held by another name fails the insert.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use std::fmt;
use std::sync::Arc;

use crate::database::connection::DatabaseHandle;
use crate::database::migrations::qualified_table;
use crate::security::password::hash_password_blocking;

pub const USER_TABLE: &str = "user";

/// Width of the `name` column.
pub const MAX_NAME_CHARS: usize = 32;
/// Width of the `email` column.
pub const MAX_EMAIL_CHARS: usize = 64;

/// An account to persist, with its plaintext password.
#[derive(Clone)]
pub struct NewAccount {
    pub name: String,
    pub password: String,
    pub email: String,
    pub is_admin: bool,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("name", &self.name)
            .field("password", &"***")
            .field("email", &self.email)
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

impl NewAccount {
    pub fn admin(name: &str, password: &str, email: &str) -> Self {
        Self {
            name: name.to_string(),
            password: password.to_string(),
            email: email.to_string(),
            is_admin: true,
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Persist the account and return its id.
    async fn create(&self, account: &NewAccount) -> Result<u64>;
}

/// Locks the row holding `name`, if any, for the rest of the transaction.
pub fn select_by_name_statement(table: &str) -> String {
    format!("SELECT `id` FROM {} WHERE `name` = ? FOR UPDATE", table)
}

pub fn update_by_id_statement(table: &str) -> String {
    format!(
        "UPDATE {} SET `password` = ?, `email` = ?, `is_admin` = ?, `updated` = ? WHERE `id` = ?",
        table
    )
}

pub fn insert_statement(table: &str) -> String {
    format!(
        "INSERT INTO {} (`name`, `password`, `email`, `is_admin`, `status`, `created`) \
         VALUES (?, ?, ?, ?, 1, ?)",
        table
    )
}

pub struct MySqlAccountStore {
    db: Arc<DatabaseHandle>,
    cost: u32,
}

impl MySqlAccountStore {
    pub fn new(db: Arc<DatabaseHandle>, cost: u32) -> Self {
        Self { db, cost }
    }
}

#[async_trait]
impl AccountStore for MySqlAccountStore {
    async fn create(&self, account: &NewAccount) -> Result<u64> {
        let (pool, section) = self.db.current().await?;
        let table = qualified_table(&section.database, &section.prefix, USER_TABLE)?;

        let hash = hash_password_blocking(account.password.clone(), self.cost).await?;

        let now = Utc::now().naive_utc();

        let mut tx = pool
            .begin()
            .await
            .context("Failed to start account transaction")?;

        let existing: Option<(u64,)> = sqlx::query_as(&select_by_name_statement(&table))
            .bind(&account.name)
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("Failed to look up account {}", account.name))?;

        let (id, updated) = match existing {
            Some((id,)) => {
                sqlx::query(&update_by_id_statement(&table))
                    .bind(&hash)
                    .bind(&account.email)
                    .bind(i8::from(account.is_admin))
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to update account {}", account.name))?;
                (id, true)
            }
            None => {
                let result = sqlx::query(&insert_statement(&table))
                    .bind(&account.name)
                    .bind(&hash)
                    .bind(&account.email)
                    .bind(i8::from(account.is_admin))
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to save account {}", account.name))?;
                (result.last_insert_id(), false)
            }
        };

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit account {}", account.name))?;

        info!(
            "[PHASE: install] [STEP: admin] account saved (name={}, id={}, admin={}, updated={})",
            account.name, id, account.is_admin, updated
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn debug_hides_plaintext_password() {
        let account = NewAccount::admin("admin", "changeme1", "admin@example.com");
        let dbg = format!("{:?}", account);
        assert!(!dbg.contains("changeme1"), "{}", dbg);
        assert!(dbg.contains("admin@example.com"));
        assert!(account.is_admin);
    }

    #[test]
    fn existing_row_is_found_by_name_alone() {
        let sql = select_by_name_statement("`app`.`user`");
        assert_eq!(sql, "SELECT `id` FROM `app`.`user` WHERE `name` = ? FOR UPDATE");
        assert!(!sql.contains("email"));
    }

    #[test]
    fn refresh_targets_the_locked_id() {
        let sql = update_by_id_statement("`app`.`user`");
        assert!(sql.starts_with("UPDATE `app`.`user` SET"));
        assert!(sql.ends_with("WHERE `id` = ?"));
        assert!(!sql.contains("`name` ="));
        assert_eq!(sql.matches('?').count(), 5);
    }

    #[test]
    fn insert_never_folds_into_another_row() {
        let sql = insert_statement("`app`.`user`");
        assert!(sql.starts_with("INSERT INTO `app`.`user` ("));
        assert_eq!(sql.matches('?').count(), 5);
        for stmt in [
            sql,
            select_by_name_statement("`app`.`user`"),
            update_by_id_statement("`app`.`user`"),
        ] {
            assert!(!stmt.contains("ON DUPLICATE KEY"), "{}", stmt);
            assert!(!stmt.contains("REPLACE"), "{}", stmt);
        }
    }

    #[tokio::test]
    async fn create_without_live_connection_fails() {
        let handle = Arc::new(DatabaseHandle::new(1, Duration::from_secs(1)));
        let store = MySqlAccountStore::new(handle, 4);
        let account = NewAccount::admin("admin", "changeme1", "admin@example.com");
        assert!(store.create(&account).await.is_err());
    }
}
