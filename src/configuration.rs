use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use sqlx::postgres::PgConnectOptions;
use sqlx::postgres::PgSslMode;
use sqlx::ConnectOptions;

use crate::domain::EmailAddress;

/// Top-level process configuration. Loaded once at startup and cloned into
/// whichever of `Application` / `Producer` / worker pool needs it.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub broker: BrokerSettings,
    pub mail: MailSettings,
    pub producer: ProducerSettings,
    pub worker: WorkerSettings,
    pub shutdown: ShutdownSettings,
}

#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    /// Port for the postgres database. This will be different from that of the
    /// server.
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default)]
    pub require_ssl: bool,
}

impl DatabaseSettings {
    /// Full connection options, including the target database.
    pub fn connection(&self) -> PgConnectOptions {
        self.connection_without_db()
            .database(&self.database_name)
            .log_statements(tracing::log::LevelFilter::Trace)
    }

    /// Connection options to the server only (no target database); used to
    /// create a fresh per-test database.
    pub fn connection_without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .ssl_mode(ssl_mode)
    }
}

/// Redis-compatible broker address. The broker client only needs enough to
/// open a connection and namespace its keys.
#[derive(Deserialize, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<Secret<String>>,
}

impl BrokerSettings {
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}",
                password.expose_secret(),
                self.host,
                self.port
            ),
            None => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct MailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: Secret<String>,
    pub sender: String,
}

impl MailSettings {
    pub fn sender(&self) -> Result<EmailAddress, String> { EmailAddress::parse(self.sender.clone()) }
}

/// P, B, R from the design doc.
#[derive(Deserialize, Clone)]
pub struct ProducerSettings {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
}

fn default_tick_interval_ms() -> u64 { 1_000 }
fn default_batch_size() -> i64 { 10 }
fn default_retention_secs() -> i64 { 600 }

/// W, T_exec, and the critical:default:low priority ratio.
#[derive(Deserialize, Clone)]
pub struct WorkerSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
    #[serde(default = "default_queue_weights")]
    pub queue_weights: QueueWeights,
}

#[derive(Deserialize, Clone, Copy)]
pub struct QueueWeights {
    pub critical: u32,
    pub default: u32,
    pub low: u32,
}

fn default_concurrency() -> usize { 12 }
fn default_exec_timeout_secs() -> u64 { 60 }
fn default_queue_weights() -> QueueWeights {
    QueueWeights {
        critical: 3,
        default: 2,
        low: 1,
    }
}

#[derive(Deserialize, Clone)]
pub struct ShutdownSettings {
    #[serde(default = "default_graceful_timeout_secs")]
    pub graceful_timeout_secs: u64,
}

fn default_graceful_timeout_secs() -> u64 { 10 }

/// Loads `configuration.yaml` if present (relative to the working directory),
/// then layers environment variable overrides on top using the `APP__SECTION__FIELD`
/// naming convention (e.g. `APP__DATABASE__PASSWORD`). All fields must resolve
/// from one of these two sources, otherwise initialisation fails immediately
/// and the server does not start.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = Config::builder()
        .add_source(File::new("configuration.yaml", FileFormat::Yaml).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize()
}
