// Install orchestration
//
// One install attempt runs these steps strictly in order, stopping at the first failure:
// - probe the database credentials on a throwaway connection
// - write the [db] config section
// - reopen the live database from that section
// - apply the baseline schema
// - create the admin account
// - create the install lock
// - set the installed flag, then activate runtime subsystems
//
// Nothing is rolled back on failure. Attempts are serialized by the AppState guard,
// and the flag and lock are re-checked once the guard is held.

use crate::api::error::InstallError;
use crate::database::connection::{ConnectError, ConnectionParams, DbConnector, LiveDatabase};
use crate::database::migrations::SchemaMigrator;
use crate::database::users::{AccountStore, NewAccount};
use crate::installation::config_store::{ConfigStore, DbSection};
use crate::installation::lock::{InstallLock, LockError};
use crate::installation::runtime::RuntimeInitializer;
use crate::models::requests::InstallRequest;
use crate::models::responses::{
    ApiResponse, InstallResponse, InstallStatusResponse, ValidationFailure,
};
use crate::models::state::AppState;
use crate::utils::logging::redact_secrets;

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const INSTALL_SUCCEEDED: &str = "Installation succeeded";

/// Collaborators for each install step.
#[derive(Clone)]
pub struct InstallSteps {
    pub connector: Arc<dyn DbConnector>,
    pub config_store: Arc<dyn ConfigStore>,
    pub database: Arc<dyn LiveDatabase>,
    pub migrator: Arc<dyn SchemaMigrator>,
    pub accounts: Arc<dyn AccountStore>,
    pub lock: Arc<dyn InstallLock>,
    pub runtime: Arc<dyn RuntimeInitializer>,
}

pub struct Installer {
    state: Arc<AppState>,
    steps: InstallSteps,
    charset: String,
}

impl Installer {
    pub fn new(state: Arc<AppState>, steps: InstallSteps, charset: impl Into<String>) -> Self {
        Self {
            state,
            steps,
            charset: charset.into(),
        }
    }

    /// Run one install attempt. Expects a request that already passed `validate()`.
    pub async fn install(&self, req: &InstallRequest) -> Result<InstallResponse, InstallError> {
        let correlation_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        if self.state.is_installed() {
            warn!(
                "[PHASE: install] [STEP: guard] install requested but system is already installed (correlation_id={})",
                correlation_id
            );
            return Err(InstallError::AlreadyInstalled);
        }

        let _guard = self.state.begin_install().await;

        // Another attempt may have finished while we waited for the guard.
        if self.state.is_installed() {
            warn!(
                "[PHASE: install] [STEP: guard] concurrent install already completed (correlation_id={})",
                correlation_id
            );
            return Err(InstallError::AlreadyInstalled);
        }
        if self.steps.lock.exists().await {
            self.state.mark_installed();
            warn!(
                "[PHASE: install] [STEP: guard] install lock present, flag synced (correlation_id={})",
                correlation_id
            );
            return Err(InstallError::AlreadyInstalled);
        }

        info!(
            "[PHASE: install] [STEP: start] install attempt started (correlation_id={}, engine={}, host={}, port={}, database={}, prefix={:?}, admin={})",
            correlation_id,
            req.db_type,
            req.db_host,
            req.db_port,
            req.db_name,
            req.db_table_prefix,
            req.admin_username
        );

        let secrets = [req.db_password.as_str(), req.admin_password.as_str()];
        let mut completed: Vec<&'static str> = Vec::new();

        match self.run_steps(req, &secrets, &mut completed).await {
            Ok((admin_account_id, migrations_applied)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    "[PHASE: install] [STEP: complete] install succeeded (correlation_id={}, admin_id={}, migrations_applied={}, duration_ms={})",
                    correlation_id,
                    admin_account_id,
                    migrations_applied.len(),
                    duration_ms
                );
                Ok(InstallResponse {
                    correlation_id,
                    admin_account_id,
                    migrations_applied,
                    duration_ms,
                })
            }
            Err(e) => {
                if matches!(e, InstallError::AlreadyInstalled) {
                    warn!(
                        "[PHASE: install] [STEP: lock] install lock appeared during install (correlation_id={})",
                        correlation_id
                    );
                } else {
                    error!(
                        "[PHASE: install] [STEP: failed] install failed (correlation_id={}, kind={}, completed=[{}], duration_ms={}, error={})",
                        correlation_id,
                        e.kind(),
                        completed.join(", "),
                        started.elapsed().as_millis(),
                        redact_secrets(&e.to_string(), &secrets)
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        req: &InstallRequest,
        secrets: &[&str],
        completed: &mut Vec<&'static str>,
    ) -> Result<(u64, Vec<String>), InstallError> {
        let scrub = |e: anyhow::Error| anyhow::anyhow!(redact_secrets(&format!("{:#}", e), secrets));

        let params = ConnectionParams::from_request(req, &self.charset);
        self.steps
            .connector
            .probe(&params)
            .await
            .map_err(|e| {
                InstallError::Connectivity(ConnectError {
                    user_message: e.user_message,
                    internal_details: redact_secrets(&e.internal_details, secrets),
                })
            })?;
        completed.push("connectivity");
        info!(
            "[PHASE: install] [STEP: connectivity] database reachable (target={})",
            params.describe()
        );

        let section = DbSection::from_request(req, &self.charset);
        self.steps
            .config_store
            .write_db_section(&section)
            .await
            .map_err(|e| InstallError::ConfigPersist(scrub(e)))?;
        completed.push("config");

        // A live database that cannot be opened leaves nothing to migrate.
        self.steps
            .database
            .reconnect(&section)
            .await
            .map_err(|e| InstallError::Schema(scrub(e.context("Failed to reopen the live database"))))?;
        completed.push("db_reconnect");

        let migrations_applied = self
            .steps
            .migrator
            .migrate(&req.db_name)
            .await
            .map_err(|e| InstallError::Schema(scrub(e)))?;
        completed.push("schema");

        let admin = NewAccount::admin(&req.admin_username, &req.admin_password, &req.admin_email);
        let admin_account_id = self
            .steps
            .accounts
            .create(&admin)
            .await
            .map_err(|e| InstallError::AdminCreation(scrub(e)))?;
        completed.push("admin");

        match self.steps.lock.create().await {
            Ok(()) => {}
            Err(LockError::AlreadyExists(_)) => {
                self.state.mark_installed();
                return Err(InstallError::AlreadyInstalled);
            }
            Err(e) => return Err(InstallError::LockCreation(e)),
        }
        completed.push("lock");

        self.state.mark_installed();
        completed.push("flag");

        self.steps.runtime.activate().await;
        completed.push("runtime");

        Ok((admin_account_id, migrations_applied))
    }
}

/// Response envelope for an install attempt.
pub fn install_response(
    result: Result<InstallResponse, InstallError>,
) -> ApiResponse<InstallResponse> {
    match result {
        Ok(resp) => ApiResponse::ok_with_message(resp, INSTALL_SUCCEEDED),
        Err(e) => ApiResponse::fail(e.kind(), e.user_message()),
    }
}

/// Response envelope for a request rejected by `InstallRequest::validate`.
pub fn validation_response(errors: Vec<String>) -> ApiResponse<ValidationFailure> {
    warn!(
        "[PHASE: install] [STEP: validate] install request rejected (errors={})",
        errors.join("; ")
    );
    ApiResponse::fail_with_data(
        "validation_failure",
        "The install form is invalid.",
        ValidationFailure { errors },
    )
}

/// Whether the install page should still be offered.
pub fn install_status(state: &AppState) -> ApiResponse<InstallStatusResponse> {
    ApiResponse::ok(InstallStatusResponse {
        installed: state.is_installed(),
    })
}
