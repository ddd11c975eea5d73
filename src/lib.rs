// Scheduler first-run installer
// Main library entry point

pub mod api;
pub mod database;
pub mod installation;
pub mod models;
pub mod security;
pub mod utils;

use anyhow::Context;
use log::{error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use api::installer::{install_response, install_status, validation_response, InstallSteps, Installer};
use database::connection::{DatabaseHandle, MySqlConnector};
use database::migrations::MigrationRunner;
use database::users::MySqlAccountStore;
use installation::config_store::TomlConfigStore;
use installation::lock::FileInstallLock;
use installation::runtime::{ConfigVerifier, ResourceInitializer};
use models::requests::InstallRequest;
use models::settings::InstallerSettings;
use models::state::AppState;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

const USAGE: &str = "Usage: scheduler-installer [--settings <installer.toml>] [--quiet] (--status | --install <request.json>)";

/// Initialize logging system with dual format (JSON + human-readable)
fn init_logging(log_dir: &Path, with_console: bool) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d-%H%M%S");

    // JSON log file for structured parsing
    let json_log_file = log_dir.join(format!("installer-{}.log", timestamp));

    // Human-readable log file (.txt)
    let txt_log_file = log_dir.join(format!("installer-{}.txt", timestamp));

    let mut dispatch = fern::Dispatch::new().level(log::LevelFilter::Debug);

    if with_console {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Info)
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}", txt_line));
                })
                .chain(std::io::stderr()),
        );
    }

    dispatch = dispatch
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_utc = chrono::Utc::now().to_rfc3339();
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let json_line = utils::logging::format_json_log(
                        &timestamp_utc,
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", json_line));
                })
                .chain(fern::log_file(json_log_file)?),
        )
        .chain(
            fern::Dispatch::new()
                .format(move |out, message, record| {
                    let timestamp_local = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
                    let message_str = format!("{}", message);
                    let (phase, step, cleaned_message) =
                        utils::logging::parse_log_metadata(&message_str);
                    let txt_line = utils::logging::format_human_readable_log(
                        &timestamp_local.to_string(),
                        record.level(),
                        record.target(),
                        &cleaned_message,
                        phase.as_deref(),
                        step.as_deref(),
                    );
                    out.finish(format_args!("{}\n", txt_line));
                })
                .chain(fern::log_file(txt_log_file)?),
        );

    dispatch.apply()?;

    log::info!(
        "[PHASE: initialization] Logging initialized, log directory: {:?}",
        log_dir
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Install(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub command: Command,
    pub settings_file: Option<PathBuf>,
    pub quiet: bool,
}

/// Parse arguments (without the program name).
pub fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut command: Option<Command> = None;
    let mut settings_file: Option<PathBuf> = None;
    let mut quiet = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let next = match arg.as_str() {
            "--status" => Some(Command::Status),
            "--install" => {
                let path = iter
                    .next()
                    .ok_or_else(|| "--install requires a request file".to_string())?;
                Some(Command::Install(PathBuf::from(path)))
            }
            "--settings" => {
                let path = iter
                    .next()
                    .ok_or_else(|| "--settings requires a file".to_string())?;
                settings_file = Some(PathBuf::from(path));
                None
            }
            "--quiet" => {
                quiet = true;
                None
            }
            other => return Err(format!("Unknown argument: {}", other)),
        };
        if let Some(next) = next {
            if command.is_some() {
                return Err("--status and --install are mutually exclusive".to_string());
            }
            command = Some(next);
        }
    }

    let command = command.ok_or_else(|| "Nothing to do".to_string())?;
    Ok(CliOptions {
        command,
        settings_file,
        quiet,
    })
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize response: {}", e),
    }
}

/// Run the installer CLI and return the process exit code.
pub fn run_cli(args: Vec<String>) -> i32 {
    let opts = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            return EXIT_USAGE;
        }
    };

    let app_root = match utils::path_resolver::resolve_app_root() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to resolve application root: {}", e);
            return EXIT_FAILURE;
        }
    };

    let settings = match InstallerSettings::load(&app_root, opts.settings_file.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Installer settings error: {:#}", e);
            return EXIT_FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings.log_dir, !opts.quiet) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!(
        "[PHASE: initialization] Installer starting at {} (app_root={:?}, config={:?}, lock={:?})",
        chrono::Utc::now(),
        app_root,
        settings.config_file,
        settings.lock_file
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build();
    match rt {
        Ok(rt) => rt.block_on(run_command(opts.command, settings)),
        Err(e) => {
            error!(
                "[PHASE: initialization] Failed to create async runtime: {}",
                e
            );
            eprintln!("Failed to create async runtime: {}", e);
            EXIT_FAILURE
        }
    }
}

async fn run_command(command: Command, settings: InstallerSettings) -> i32 {
    let lock = Arc::new(FileInstallLock::new(settings.lock_file.clone()));
    let state = Arc::new(AppState::from_lock(lock.as_ref()).await);

    let request_path = match command {
        Command::Status => {
            print_json(&install_status(&state));
            return EXIT_OK;
        }
        Command::Install(path) => path,
    };

    let req = match load_request(&request_path).await {
        Ok(r) => r,
        Err(e) => {
            error!(
                "[PHASE: install] [STEP: request] could not load install request: {:#}",
                e
            );
            eprintln!("{:#}", e);
            return EXIT_USAGE;
        }
    };

    if let Err(errors) = req.validate() {
        print_json(&validation_response(errors));
        return EXIT_FAILURE;
    }

    let config_store = Arc::new(TomlConfigStore::new(settings.config_file.clone()));
    let db = Arc::new(DatabaseHandle::new(
        settings.max_connections,
        settings.connect_timeout(),
    ));
    let runtime =
        ResourceInitializer::new().with(Arc::new(ConfigVerifier::new(config_store.clone())));

    let steps = InstallSteps {
        connector: Arc::new(MySqlConnector::new(settings.connect_timeout())),
        config_store,
        database: db.clone(),
        migrator: Arc::new(MigrationRunner::new(db.clone())),
        accounts: Arc::new(MySqlAccountStore::new(db.clone(), settings.password_cost)),
        lock,
        runtime: Arc::new(runtime),
    };
    let installer = Installer::new(state, steps, settings.charset.clone());

    let response = install_response(installer.install(&req).await);
    db.close().await;

    print_json(&response);
    if response.success {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}

async fn load_request(path: &Path) -> anyhow::Result<InstallRequest> {
    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read install request: {:?}", path))?;
    serde_json::from_str(&body)
        .with_context(|| format!("Install request is not valid JSON: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_install_with_settings_and_quiet() {
        let opts = parse_args(&args(&[
            "--settings",
            "/etc/cron/installer.toml",
            "--install",
            "req.json",
            "--quiet",
        ]))
        .expect("parse");
        assert_eq!(opts.command, Command::Install(PathBuf::from("req.json")));
        assert_eq!(
            opts.settings_file,
            Some(PathBuf::from("/etc/cron/installer.toml"))
        );
        assert!(opts.quiet);
    }

    #[test]
    fn status_is_a_command_on_its_own() {
        let opts = parse_args(&args(&["--status"])).expect("parse");
        assert_eq!(opts.command, Command::Status);
        assert!(!opts.quiet);
    }

    #[test]
    fn usage_errors_are_reported() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["--install"])).is_err());
        assert!(parse_args(&args(&["--status", "--install", "req.json"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn run_cli_rejects_bad_usage_before_touching_anything() {
        assert_eq!(run_cli(args(&["--nope"])), EXIT_USAGE);
    }

    #[tokio::test]
    async fn request_file_is_loaded_from_camel_case_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"dbType":"mysql","dbHost":"localhost","dbPort":3306,"dbUsername":"root",
               "dbPassword":"secret","dbName":"app","adminUsername":"admin",
               "adminPassword":"changeme1","adminEmail":"admin@example.com"}"#,
        )
        .expect("write request");

        let req = load_request(&path).await.expect("load");
        assert_eq!(req.db_port, 3306);
        assert_eq!(req.db_table_prefix, "");
        assert!(req.validate().is_ok());
    }

    #[tokio::test]
    async fn unknown_engine_in_request_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("request.json");
        std::fs::write(
            &path,
            r#"{"dbType":"postgres","dbHost":"localhost","dbPort":5432,"dbUsername":"root",
               "dbPassword":"secret","dbName":"app","adminUsername":"admin",
               "adminPassword":"changeme1","adminEmail":"admin@example.com"}"#,
        )
        .expect("write request");

        assert!(load_request(&path).await.is_err());
    }

    #[tokio::test]
    async fn status_and_missing_request_exit_codes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = InstallerSettings::load(dir.path(), None).expect("settings");
        assert_eq!(run_command(Command::Status, settings.clone()).await, EXIT_OK);

        let missing = dir.path().join("missing.json");
        assert_eq!(
            run_command(Command::Install(missing), settings).await,
            EXIT_USAGE
        );
    }
}
