// Database connection management
//
// Two distinct uses:
// - DbConnector: a throwaway connection that only proves the credentials work
// - DatabaseHandle: the live pool the rest of the install runs on, opened from the
//   config that was just written

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::Connection;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::installation::config_store::DbSection;
use crate::models::requests::InstallRequest;
use crate::utils::logging::{describe_db_target, redact_secrets};

// =============================================================================
// Connectivity probe
// =============================================================================

/// Error returned by connection attempts.
/// Keeps user-friendly messages separate from internal details.
#[derive(Debug, Clone)]
pub struct ConnectError {
    /// User-friendly message (safe to show in UI)
    pub user_message: String,
    /// Internal details for logging (password already scrubbed)
    pub internal_details: String,
}

impl ConnectError {
    fn from_driver(err: &sqlx::Error, password: &str) -> Self {
        let user_message = match err {
            sqlx::Error::Io(_) => "Unable to reach the database server. Check host, port, and firewall.",
            sqlx::Error::Database(_) => "The database server rejected the connection. Verify username and password.",
            sqlx::Error::Tls(_) => "TLS negotiation with the database server failed.",
            _ => "Unable to connect. Verify host, credentials, and network access.",
        };
        Self {
            user_message: user_message.to_string(),
            internal_details: redact_secrets(&format!("Connection error: {}", err), &[password]),
        }
    }

    fn timed_out(after: Duration) -> Self {
        Self {
            user_message: "Connection timed out. Check network connectivity and firewall."
                .to_string(),
            internal_details: format!("Connection attempt timed out after {}ms", after.as_millis()),
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message)
    }
}

impl std::error::Error for ConnectError {}

/// Everything needed to open one connection. `database` is optional: the probe
/// connects to the server without selecting a schema.
#[derive(Clone)]
pub struct ConnectionParams {
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub charset: String,
    pub database: Option<String>,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("charset", &self.charset)
            .field("database", &self.database)
            .finish()
    }
}

impl ConnectionParams {
    /// Probe parameters straight from the install form.
    pub fn from_request(req: &InstallRequest, charset: &str) -> Self {
        Self {
            engine: req.db_type.as_str().to_string(),
            host: req.db_host.clone(),
            port: req.port(),
            user: req.db_username.clone(),
            password: req.db_password.clone(),
            charset: charset.to_string(),
            database: None,
        }
    }

    /// Live-connection parameters from the persisted `db` section.
    pub fn from_db_section(db: &DbSection) -> Self {
        Self {
            engine: db.engine.clone(),
            host: db.host.clone(),
            port: db.port,
            user: db.user.clone(),
            password: db.password.clone(),
            charset: db.charset.clone(),
            database: Some(db.database.clone()),
        }
    }

    pub fn describe(&self) -> String {
        describe_db_target(
            &self.engine,
            &self.host,
            self.port,
            &self.user,
            self.database.as_deref(),
        )
    }

    pub fn to_connect_options(&self) -> MySqlConnectOptions {
        let opts = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .charset(&self.charset);
        match self.database.as_deref().filter(|d| !d.is_empty()) {
            Some(db) => opts.database(db),
            None => opts,
        }
    }
}

/// Trait for the connectivity probe.
/// Production code uses MySqlConnector; tests use stubs.
#[async_trait]
pub trait DbConnector: Send + Sync {
    /// Open a connection, ping it, release it. Nothing is persisted.
    async fn probe(&self, params: &ConnectionParams) -> Result<(), ConnectError>;

    /// Get the timeout duration for connection attempts.
    fn timeout_duration(&self) -> Duration {
        Duration::from_secs(20)
    }
}

/// Production connector backed by sqlx.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    timeout: Duration,
}

impl MySqlConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

/// The two calls made on an open connectivity-check connection.
#[async_trait]
trait PingConnection: Send + Sized {
    async fn ping(&mut self) -> Result<(), sqlx::Error>;
    async fn close(self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl PingConnection for MySqlConnection {
    async fn ping(&mut self) -> Result<(), sqlx::Error> {
        Connection::ping(self).await
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        Connection::close(self).await
    }
}

/// Ping, then release the connection whatever the ping did. Both calls are
/// bounded by `budget`.
async fn ping_and_release<C: PingConnection>(
    mut conn: C,
    budget: Duration,
    password: &str,
    target: &str,
) -> Result<(), ConnectError> {
    let ping = timeout(budget, conn.ping()).await;

    match timeout(budget, conn.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            "[PHASE: install] [STEP: db_probe] check connection did not close cleanly (target={}, error={})",
            target,
            redact_secrets(&e.to_string(), &[password])
        ),
        Err(_) => warn!(
            "[PHASE: install] [STEP: db_probe] check connection close timed out (target={}, after_ms={})",
            target,
            budget.as_millis()
        ),
    }

    match ping {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectError::from_driver(&e, password)),
        Err(_) => Err(ConnectError::timed_out(budget)),
    }
}

#[async_trait]
impl DbConnector for MySqlConnector {
    async fn probe(&self, params: &ConnectionParams) -> Result<(), ConnectError> {
        let started = Instant::now();
        let target = params.describe();
        debug!(
            "[PHASE: install] [STEP: db_probe] opening probe connection (target={})",
            target
        );

        let opts = params.to_connect_options();
        let conn = match timeout(self.timeout_duration(), MySqlConnection::connect_with(&opts)).await {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => return Err(ConnectError::from_driver(&e, &params.password)),
            Err(_) => return Err(ConnectError::timed_out(self.timeout_duration())),
        };

        let result = ping_and_release(conn, self.timeout_duration(), &params.password, &target).await;
        if result.is_ok() {
            debug!(
                "[PHASE: install] [STEP: db_probe] probe ok (target={}, duration_ms={})",
                target,
                started.elapsed().as_millis()
            );
        }
        result
    }

    fn timeout_duration(&self) -> Duration {
        self.timeout
    }
}

// =============================================================================
// Live connection
// =============================================================================

/// Re-opens the application's live connection from persisted config.
#[async_trait]
pub trait LiveDatabase: Send + Sync {
    async fn reconnect(&self, db: &DbSection) -> Result<()>;
}

struct LiveConnection {
    pool: MySqlPool,
    section: DbSection,
}

/// Live pool shared by the schema migrator and the account store.
pub struct DatabaseHandle {
    max_connections: u32,
    acquire_timeout: Duration,
    live: RwLock<Option<LiveConnection>>,
}

impl DatabaseHandle {
    pub fn new(max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            max_connections,
            acquire_timeout,
            live: RwLock::new(None),
        }
    }

    /// Current pool and the section it was opened from.
    pub async fn current(&self) -> Result<(MySqlPool, DbSection)> {
        let live = self.live.read().await;
        let conn = live
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Database connection has not been initialized"))?;
        Ok((conn.pool.clone(), conn.section.clone()))
    }

    pub async fn close(&self) {
        if let Some(old) = self.live.write().await.take() {
            old.pool.close().await;
        }
    }
}

#[async_trait]
impl LiveDatabase for DatabaseHandle {
    async fn reconnect(&self, db: &DbSection) -> Result<()> {
        let params = ConnectionParams::from_db_section(db);
        let target = params.describe();

        let pool = MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_with(params.to_connect_options())
            .await
            .map_err(|e| anyhow::anyhow!(redact_secrets(&e.to_string(), &[db.password.as_str()])))
            .with_context(|| format!("Failed to open database pool (target={})", target))?;

        let previous = self.live.write().await.replace(LiveConnection {
            pool,
            section: db.clone(),
        });
        if let Some(old) = previous {
            old.pool.close().await;
        }

        info!(
            "[PHASE: install] [STEP: db_reconnect] live database connection ready (target={})",
            target
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
