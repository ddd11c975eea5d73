// API request models
// Shape of the install form submitted by the first-run page

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::database::users::{MAX_EMAIL_CHARS, MAX_NAME_CHARS};
use crate::utils::validation::{validate_email, validate_mysql_database_name, validate_table_prefix};

/// Database engines the installer can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbEngine {
    Mysql,
}

impl DbEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbEngine::Mysql => "mysql",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mysql" => Some(DbEngine::Mysql),
            _ => None,
        }
    }
}

impl fmt::Display for DbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install form. Passwords are redacted from `Debug` output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub db_type: DbEngine,
    pub db_host: String,
    pub db_port: u32,
    pub db_username: String,
    pub db_password: String,
    pub db_name: String,
    #[serde(default)]
    pub db_table_prefix: String,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_email: String,
}

impl fmt::Debug for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallRequest")
            .field("db_type", &self.db_type)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_username", &self.db_username)
            .field("db_password", &"***")
            .field("db_name", &self.db_name)
            .field("db_table_prefix", &self.db_table_prefix)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"***")
            .field("admin_email", &self.admin_email)
            .finish()
    }
}

impl InstallRequest {
    /// Apply the install form's binding rules.
    ///
    /// Runs before the orchestrator; the orchestrator itself trusts its input.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors: Vec<String> = Vec::new();

        if self.db_host.trim().is_empty() {
            errors.push("DbHost is required".to_string());
        }
        if !(1..=65535).contains(&self.db_port) {
            errors.push("DbPort must be between 1 and 65535".to_string());
        }
        if self.db_username.trim().is_empty() {
            errors.push("DbUsername is required".to_string());
        }
        if self.db_password.is_empty() {
            errors.push("DbPassword is required".to_string());
        }
        if let Err(e) = validate_mysql_database_name(&self.db_name) {
            errors.push(format!("DbName is invalid: {}", e));
        }
        if let Err(e) = validate_table_prefix(&self.db_table_prefix) {
            errors.push(format!("DbTablePrefix is invalid: {}", e));
        }
        let name_chars = self.admin_username.trim().chars().count();
        if name_chars < 3 {
            errors.push("AdminUsername must be at least 3 characters".to_string());
        } else if self.admin_username.chars().count() > MAX_NAME_CHARS {
            errors.push(format!(
                "AdminUsername must be at most {} characters",
                MAX_NAME_CHARS
            ));
        }
        if self.admin_password.chars().count() < 6 {
            errors.push("AdminPassword must be at least 6 characters".to_string());
        }
        if self.admin_email.chars().count() > MAX_EMAIL_CHARS {
            errors.push(format!(
                "AdminEmail must be at most {} characters",
                MAX_EMAIL_CHARS
            ));
        } else if validate_email(&self.admin_email).is_err() {
            errors.push("AdminEmail must be a valid email address".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Port as `u16`. Only meaningful after `validate` passed.
    pub fn port(&self) -> u16 {
        u16::try_from(self.db_port).unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) fn sample_request() -> InstallRequest {
    InstallRequest {
        db_type: DbEngine::Mysql,
        db_host: "localhost".to_string(),
        db_port: 3306,
        db_username: "root".to_string(),
        db_password: "secret".to_string(),
        db_name: "app".to_string(),
        db_table_prefix: String::new(),
        admin_username: "admin".to_string(),
        admin_password: "changeme1".to_string(),
        admin_email: "admin@example.com".to_string(),
    }
}
