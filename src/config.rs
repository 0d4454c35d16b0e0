//! Configuration management

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Well-known bootstrap password, used when `PANEL_BOOTSTRAP_PASSWORD` is unset
pub const DEFAULT_BOOTSTRAP_PASSWORD: &str = "admin123";

/// Username of the bootstrapped operator account
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";

/// Longest session lifetime accepted from `PANEL_SESSION_HOURS` (one year)
pub const MAX_SESSION_HOURS: i64 = 8_760;

/// Login shell marking accounts without interactive access
pub const DEFAULT_NOLOGIN_SHELL: &str = "/bin/false";

/// Argon2 cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
        }
    }
}

impl HashingConfig {
    /// Minimal cost, for tests only
    pub fn fast() -> Self {
        Self {
            memory_kib: argon2::Params::MIN_M_COST,
            iterations: 1,
        }
    }
}

/// Panel configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the panel's own state files
    pub data_dir: PathBuf,

    /// Operator credential file (`username:hash` lines)
    pub admin_file: PathBuf,

    /// Membership ledger of panel-managed accounts
    pub ledger_file: PathBuf,

    /// File holding the server's public domain name
    pub domain_file: PathBuf,

    /// OS account database
    pub passwd_file: PathBuf,

    /// Shell assigned to managed accounts
    pub nologin_shell: String,

    /// HMAC key for session tokens
    pub jwt_secret: String,

    /// Session token lifetime in hours
    pub session_hours: i64,

    /// Password written into a freshly bootstrapped credential file
    pub bootstrap_password: String,

    /// Upper bound for each OS tool invocation
    pub command_timeout: Duration,

    /// Password hashing cost
    pub hashing: HashingConfig,

    /// Public IP override (skips the network probe)
    pub public_ip: Option<String>,

    /// Run the expiry sweep on this interval (disabled when `None`)
    pub sweep_interval: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let data_dir = std::env::var("PANEL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/etc/boxpanel"));

        let mut config = Self::for_data_dir(&data_dir);

        if let Ok(path) = std::env::var("PANEL_ADMIN_FILE") {
            config.admin_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PANEL_LEDGER_FILE") {
            config.ledger_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PANEL_DOMAIN_FILE") {
            config.domain_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PANEL_PASSWD_FILE") {
            config.passwd_file = PathBuf::from(path);
        }
        if let Ok(shell) = std::env::var("PANEL_NOLOGIN_SHELL") {
            config.nologin_shell = shell;
        }

        config.jwt_secret = match std::env::var("PANEL_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => {
                if secret.len() < 32 {
                    tracing::warn!("PANEL_JWT_SECRET is shorter than 32 bytes");
                }
                secret
            }
            _ => {
                tracing::warn!(
                    "No PANEL_JWT_SECRET configured - using a random per-process key, sessions will not survive a restart"
                );
                random_secret()
            }
        };

        if let Some(hours) = env_parse::<i64>("PANEL_SESSION_HOURS") {
            config.session_hours = check_session_hours(hours)?;
        }

        if let Ok(password) = std::env::var("PANEL_BOOTSTRAP_PASSWORD") {
            if password.len() < 6 {
                bail!("PANEL_BOOTSTRAP_PASSWORD must be at least 6 characters");
            }
            config.bootstrap_password = password;
        }

        if let Some(secs) = env_parse::<u64>("PANEL_COMMAND_TIMEOUT_SECS") {
            config.command_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(kib) = env_parse("PANEL_ARGON2_MEMORY_KIB") {
            config.hashing.memory_kib = kib;
        }
        if let Some(iterations) = env_parse("PANEL_ARGON2_ITERATIONS") {
            config.hashing.iterations = iterations;
        }

        config.public_ip = std::env::var("PANEL_PUBLIC_IP").ok().filter(|s| !s.is_empty());

        config.sweep_interval = env_parse::<u64>("PANEL_SWEEP_INTERVAL_SECS")
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(config)
    }

    /// Defaults with every state file placed under `data_dir`
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            admin_file: data_dir.join("webpanel_admin.conf"),
            ledger_file: data_dir.join("users"),
            domain_file: data_dir.join("domain"),
            passwd_file: PathBuf::from("/etc/passwd"),
            nologin_shell: DEFAULT_NOLOGIN_SHELL.to_string(),
            jwt_secret: random_secret(),
            session_hours: 24,
            bootstrap_password: DEFAULT_BOOTSTRAP_PASSWORD.to_string(),
            command_timeout: Duration::from_secs(30),
            hashing: HashingConfig::default(),
            public_ip: None,
            sweep_interval: None,
        }
    }

    /// Whether the operator file will be seeded with the public default
    pub fn uses_default_bootstrap_password(&self) -> bool {
        self.bootstrap_password == DEFAULT_BOOTSTRAP_PASSWORD
    }
}

fn check_session_hours(hours: i64) -> Result<i64> {
    if !(1..=MAX_SESSION_HOURS).contains(&hours) {
        bail!("PANEL_SESSION_HOURS must be between 1 and {}, got {}", MAX_SESSION_HOURS, hours);
    }
    Ok(hours)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// 64 random alphanumeric characters
fn random_secret() -> String {
    use rand::Rng;

    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..64)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}
