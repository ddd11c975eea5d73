// Password hashing for persisted accounts
//
// Plaintext passwords never reach the database: the account store only ever
// sees the bcrypt hash produced here.

use anyhow::{Context, Result};

/// bcrypt cost used when nothing else is configured.
pub const DEFAULT_COST: u32 = 10;

/// Hash a password with bcrypt at the given cost (4..=31).
pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password.as_bytes(), cost).context("Failed to hash password")
}

/// Hash on the blocking pool; bcrypt is CPU-bound.
pub async fn hash_password_blocking(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .context("Password hashing task panicked")?
}

/// Compare a plaintext password against a stored hash.
#[cfg(test)]
pub(crate) fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password.as_bytes(), hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_not_plaintext_and_verifies() {
        let hash = hash_password("changeme1", 4).expect("hash");
        assert_ne!(hash, "changeme1");
        assert!(!hash.contains("changeme1"));
        assert!(hash.starts_with("$2"));
        assert!(verify_password("changeme1", &hash));
        assert!(!verify_password("changeme2", &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("changeme1", 4).expect("hash");
        let b = hash_password("changeme1", 4).expect("hash");
        assert_ne!(a, b, "salt should differ per hash");
    }

    #[test]
    fn invalid_cost_is_an_error() {
        assert!(hash_password("changeme1", 2).is_err());
    }

    #[tokio::test]
    async fn blocking_hash_matches_sync_verify() {
        let hash = hash_password_blocking("s3cret-pass".to_string(), 4)
            .await
            .expect("hash");
        assert!(verify_password("s3cret-pass", &hash));
    }
}
