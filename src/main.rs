//! boxpanel - Entry Point
//!
//! Modes:
//! - Default: serve the panel API
//! - --sweep / -s: remove expired accounts once, print the report, exit

use boxpanel::accounts::{AccountRegistry, Sweeper, SystemAccounts, TokioCommandRunner};
use boxpanel::auth::{AuthService, CredentialStore, SessionIssuer};
use boxpanel::clock::{Clock, SystemClock};
use boxpanel::dashboard::{server::shutdown_signal, DashboardConfig, HealthState, PanelServer, PanelState};
use boxpanel::Config;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let sweep_mode = args.iter().any(|a| a == "--sweep" || a == "-s");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        print_help();
        return Ok(());
    }

    init_logging()?;

    let config = Config::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let runner = Arc::new(TokioCommandRunner::new(config.command_timeout));
    let accounts = Arc::new(SystemAccounts::new(config.passwd_file.clone(), runner));
    let registry = Arc::new(AccountRegistry::from_config(&config, accounts, clock.clone()));
    let sweeper = Arc::new(Sweeper::new(registry.clone()));

    if sweep_mode {
        let report = sweeper.sweep().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.failed.is_empty() {
            anyhow::bail!("{} expired account(s) could not be removed", report.failed.len());
        }
        return Ok(());
    }

    info!("boxpanel v{}", env!("CARGO_PKG_VERSION"));

    let credentials = CredentialStore::from_config(&config)?;
    let sessions = SessionIssuer::from_config(&config, clock);
    info!(
        key_fingerprint = sessions.key_fingerprint(),
        session_hours = config.session_hours,
        "Session signing key loaded"
    );
    if config.uses_default_bootstrap_password() {
        warn!("PANEL_BOOTSTRAP_PASSWORD is not set - a fresh operator file gets the well-known default password");
    }

    let shutdown = Arc::new(Notify::new());
    let sweep_task = config.sweep_interval.map(|interval| {
        tokio::spawn(sweeper.clone().run_periodic(interval, shutdown.clone()))
    });

    let state = PanelState {
        auth: Arc::new(AuthService::new(credentials, sessions)),
        registry,
        sweeper,
        health: Arc::new(HealthState::with_data_dir(config.data_dir.clone())),
    };
    let server = PanelServer::new(DashboardConfig::from_env(), state);
    let result = server.run_until(shutdown_signal()).await;

    shutdown.notify_one();
    if let Some(task) = sweep_task {
        if let Err(e) = task.await {
            warn!("Periodic sweep task ended abnormally: {}", e);
        }
    }

    result
}

/// Log level from `RUST_LOG`, JSON lines when `PANEL_LOG_JSON=1`
fn init_logging() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let json = std::env::var("PANEL_LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false);

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

fn print_help() {
    println!("boxpanel v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Usage: boxpanel [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --sweep, -s    Remove expired accounts once and exit");
    println!("  --help, -h     Show this help");
    println!();
    println!("Default: Serve the panel API");
    println!();
    println!("Environment variables:");
    println!("  PANEL_DATA_DIR             State directory (default: /etc/boxpanel)");
    println!("  PANEL_JWT_SECRET           Session signing key (random per process if unset)");
    println!("  PANEL_SESSION_HOURS        Token lifetime in hours (default: 24)");
    println!("  PANEL_BOOTSTRAP_PASSWORD   Initial operator password");
    println!("  PANEL_NOLOGIN_SHELL        Shell of managed accounts (default: /bin/false)");
    println!("  PANEL_SWEEP_INTERVAL_SECS  Periodic expiry sweep (disabled if unset)");
    println!("  PANEL_BIND_ADDR            Listen address (default: 0.0.0.0)");
    println!("  PANEL_PORT                 Listen port (default: 8080)");
    println!("  PANEL_CORS_ORIGINS         Comma-separated allowed origins (any if unset)");
    println!("  PANEL_LOG_REQUESTS         Trace HTTP requests (default: true)");
    println!("  PANEL_LOG_JSON             Log as JSON lines when 1");
}
