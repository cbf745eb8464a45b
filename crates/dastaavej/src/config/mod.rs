use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_DRAFT_TTL_MINUTES: i64 = 24 * 60;
const DEFAULT_VERIFICATION_TTL_HOURS: i64 = 72;
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Top-level configuration for the portal.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub portal: PortalConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let max_upload_bytes = parse_var(
            "DASTAAVEJ_MAX_UPLOAD_BYTES",
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;
        if max_upload_bytes == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "DASTAAVEJ_MAX_UPLOAD_BYTES",
            });
        }

        let session_ttl_hours =
            parse_var("DASTAAVEJ_SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS)?;
        if session_ttl_hours <= 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "DASTAAVEJ_SESSION_TTL_HOURS",
            });
        }

        let portal = PortalConfig {
            data_path: non_empty_var("DASTAAVEJ_DATA_PATH").map(PathBuf::from),
            max_upload_bytes,
            draft_ttl_minutes: parse_var("DASTAAVEJ_DRAFT_TTL_MINUTES", DEFAULT_DRAFT_TTL_MINUTES)?,
            verification_ttl_hours: parse_var(
                "DASTAAVEJ_VERIFICATION_TTL_HOURS",
                DEFAULT_VERIFICATION_TTL_HOURS,
            )?,
            session_ttl_hours,
            admin_email: non_empty_var("DASTAAVEJ_ADMIN_EMAIL")
                .unwrap_or_else(|| "admin@dastaavej.local".to_string()),
            public_url: non_empty_var("DASTAAVEJ_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://{host}:{port}")),
        };

        let storage = StorageConfig {
            drive_credentials: non_empty_var("GOOGLE_DRIVE_CREDENTIALS").map(PathBuf::from),
            drive_folder_id: non_empty_var("GOOGLE_DRIVE_FOLDER_ID"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
            portal,
            storage,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable: name }),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Log filter and output controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

/// Workflow limits and addresses used by the application and account services.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// SQLite database file, created on first start; `None` uses a private in-memory
    /// database.
    pub data_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub draft_ttl_minutes: i64,
    pub verification_ttl_hours: i64,
    /// Lifetime of a login session.
    pub session_ttl_hours: i64,
    pub admin_email: String,
    pub public_url: String,
}

/// Google Drive credentials for the storage collaborator.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub drive_credentials: Option<PathBuf>,
    pub drive_folder_id: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    MissingDataPath,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a positive number")
            }
            ConfigError::MissingDataPath => {
                write!(f, "DASTAAVEJ_DATA_PATH must point at the portal database")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::MissingDataPath => None,
        }
    }
}
