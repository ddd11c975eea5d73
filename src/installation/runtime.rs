//! Post-install activation of dependent subsystems.
//!
//! Activation is best effort: a subsystem that fails to start is logged and the
//! remaining ones still start. Installed state is never rolled back from here.

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;
use std::time::Instant;

use crate::installation::config_store::{ConfigStore, DbSection};

#[async_trait]
pub trait RuntimeInitializer: Send + Sync {
    async fn activate(&self);
}

/// A subsystem that needs the finished configuration before it can start.
#[async_trait]
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &str;
    async fn start(&self) -> Result<()>;
}

#[derive(Default)]
pub struct ResourceInitializer {
    subsystems: Vec<Arc<dyn Subsystem>>,
}

impl ResourceInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, subsystem: Arc<dyn Subsystem>) -> Self {
        self.subsystems.push(subsystem);
        self
    }
}

#[async_trait]
impl RuntimeInitializer for ResourceInitializer {
    async fn activate(&self) {
        let started = Instant::now();
        let mut failed = 0usize;
        for subsystem in &self.subsystems {
            match subsystem.start().await {
                Ok(()) => info!(
                    "[PHASE: install] [STEP: runtime] subsystem started (name={})",
                    subsystem.name()
                ),
                Err(e) => {
                    failed += 1;
                    error!(
                        "[PHASE: install] [STEP: runtime] subsystem failed to start (name={}, error={:#})",
                        subsystem.name(),
                        e
                    );
                }
            }
        }
        info!(
            "[PHASE: install] [STEP: runtime] activation finished (subsystems={}, failed={}, duration_ms={})",
            self.subsystems.len(),
            failed,
            started.elapsed().as_millis()
        );
    }
}

/// Re-reads the persisted config and confirms the `db` section is complete,
/// so whatever loads the config next will find it usable.
pub struct ConfigVerifier {
    store: Arc<dyn ConfigStore>,
}

impl ConfigVerifier {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Subsystem for ConfigVerifier {
    fn name(&self) -> &str {
        "config_verifier"
    }

    async fn start(&self) -> Result<()> {
        let config = self.store.read().await?;
        let db = DbSection::from_config(&config)?;
        info!(
            "[PHASE: install] [STEP: runtime] persisted config verified (engine={}, database={})",
            db.engine, db.database
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::config_store::TomlConfigStore;
    use crate::models::requests::sample_request;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingSubsystem {
        name: &'static str,
        fail: bool,
        starts: AtomicU32,
    }

    impl CountingSubsystem {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail,
                starts: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Subsystem for CountingSubsystem {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("{} refused to start", self.name);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_subsystem_does_not_stop_the_rest() {
        let first = CountingSubsystem::new("scheduler", true);
        let second = CountingSubsystem::new("log_cleaner", false);
        let init = ResourceInitializer::new()
            .with(first.clone())
            .with(second.clone());

        init.activate().await;

        assert_eq!(first.starts.load(Ordering::SeqCst), 1);
        assert_eq!(second.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn config_verifier_accepts_written_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(TomlConfigStore::new(dir.path().join("app.toml")));
        store
            .write_db_section(&DbSection::from_request(&sample_request(), "utf8"))
            .await
            .expect("write");

        let verifier = ConfigVerifier::new(store);
        verifier.start().await.expect("verified");
    }

    #[tokio::test]
    async fn config_verifier_rejects_missing_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(TomlConfigStore::new(dir.path().join("app.toml")));

        let verifier = ConfigVerifier::new(store);
        assert!(verifier.start().await.is_err());
    }
}
