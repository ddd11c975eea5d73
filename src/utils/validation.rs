// Input validation utilities

use anyhow::Result;
use regex::Regex;

const MYSQL_IDENT_MAX: usize = 64;

const IDENT_PATTERN: &str = r"^[A-Za-z0-9_$]+$";
const EMAIL_PATTERN: &str = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";

fn is_plain_ident(s: &str) -> Result<bool> {
    let re = Regex::new(IDENT_PATTERN).map_err(|e| {
        anyhow::anyhow!("Internal error: failed to compile identifier regex: {}", e)
    })?;
    Ok(re.is_match(s))
}

/// Validate database name (MySQL)
///
/// Only unquoted-identifier characters are accepted so the name can be safely
/// backtick-quoted into DDL.
pub fn validate_mysql_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("Database name cannot be empty"));
    }

    if name.len() > MYSQL_IDENT_MAX {
        return Err(anyhow::anyhow!("Database name cannot exceed 64 characters"));
    }

    if !is_plain_ident(name)? {
        return Err(anyhow::anyhow!("Database name contains invalid characters"));
    }

    Ok(())
}

/// Validate a table-name prefix. The empty prefix is allowed.
pub fn validate_table_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Ok(());
    }

    // Leave room for the longest baseline table name.
    if prefix.len() > 48 {
        return Err(anyhow::anyhow!("Table prefix cannot exceed 48 characters"));
    }

    if !is_plain_ident(prefix)? {
        return Err(anyhow::anyhow!("Table prefix contains invalid characters"));
    }

    Ok(())
}

/// Backtick-quote a MySQL identifier after validating it.
pub fn quote_mysql_ident(ident: &str) -> Result<String> {
    if ident.is_empty() || ident.len() > MYSQL_IDENT_MAX || !is_plain_ident(ident)? {
        return Err(anyhow::anyhow!("Invalid MySQL identifier: '{}'", ident));
    }
    Ok(format!("`{}`", ident))
}

/// Basic email syntax check (local@domain.tld).
pub fn validate_email(email: &str) -> Result<()> {
    let re = Regex::new(EMAIL_PATTERN)
        .map_err(|e| anyhow::anyhow!("Internal error: failed to compile email regex: {}", e))?;
    if email.len() > 254 || !re.is_match(email) {
        return Err(anyhow::anyhow!("Email address is not valid"));
    }
    Ok(())
}
