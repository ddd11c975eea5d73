//! Install failure taxonomy.
//!
//! Every kind is terminal for the attempt. `kind()` is the stable code put in the
//! response envelope; `user_message()` is the text shown to whoever submitted the
//! form. Neither ever carries credentials.

use thiserror::Error;

use crate::database::connection::ConnectError;
use crate::installation::lock::LockError;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("the system is already installed")]
    AlreadyInstalled,

    #[error("database connectivity check failed: {}", .0.internal_details)]
    Connectivity(#[source] ConnectError),

    #[error("failed to persist database config: {0:#}")]
    ConfigPersist(anyhow::Error),

    #[error("failed to apply database schema: {0:#}")]
    Schema(anyhow::Error),

    #[error("failed to create admin account: {0:#}")]
    AdminCreation(anyhow::Error),

    #[error("failed to create install lock: {0}")]
    LockCreation(#[source] LockError),
}

impl InstallError {
    pub fn kind(&self) -> &'static str {
        match self {
            InstallError::AlreadyInstalled => "already_installed",
            InstallError::Connectivity(_) => "connectivity_failure",
            InstallError::ConfigPersist(_) => "config_persist_failure",
            InstallError::Schema(_) => "schema_failure",
            InstallError::AdminCreation(_) => "admin_creation_failure",
            InstallError::LockCreation(_) => "lock_creation_failure",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            InstallError::AlreadyInstalled => "The system is already installed.".to_string(),
            InstallError::Connectivity(e) => {
                format!("Database connection failed. {}", e.user_message)
            }
            InstallError::ConfigPersist(_) => {
                "Failed to write the database configuration file.".to_string()
            }
            InstallError::Schema(_) => "Failed to create database tables.".to_string(),
            InstallError::AdminCreation(_) => {
                "Failed to create the administrator account.".to_string()
            }
            InstallError::LockCreation(_) => "Failed to create the install lock file.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn every_kind_has_a_distinct_code() {
        let errors = vec![
            InstallError::AlreadyInstalled,
            InstallError::Connectivity(ConnectError {
                user_message: "Connection timed out.".to_string(),
                internal_details: "timed out after 20000ms".to_string(),
            }),
            InstallError::ConfigPersist(anyhow::anyhow!("permission denied")),
            InstallError::Schema(anyhow::anyhow!("syntax error")),
            InstallError::AdminCreation(anyhow::anyhow!("duplicate entry")),
            InstallError::LockCreation(LockError::AlreadyExists(PathBuf::from("install.lock"))),
        ];
        let mut codes: Vec<&str> = errors.iter().map(InstallError::kind).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn connectivity_message_uses_only_the_user_safe_part() {
        let err = InstallError::Connectivity(ConnectError {
            user_message: "Verify username and password.".to_string(),
            internal_details: "Access denied for user 'root'@'10.0.0.7'".to_string(),
        });
        let msg = err.user_message();
        assert!(msg.starts_with("Database connection failed."), "{}", msg);
        assert!(!msg.contains("10.0.0.7"), "{}", msg);
        assert!(err.to_string().contains("Access denied"));
    }

    #[test]
    fn display_keeps_the_context_chain() {
        let inner = anyhow::anyhow!("disk full").context("Failed to create temp config file");
        let err = InstallError::ConfigPersist(inner);
        let text = err.to_string();
        assert!(text.contains("Failed to create temp config file"), "{}", text);
        assert!(text.contains("disk full"), "{}", text);
    }
}
