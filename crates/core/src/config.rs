use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "quotedesk.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub directory: DirectoryConfig,
    pub settlement: SettlementConfig,
    pub mail: MailConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// The customer directory lives in its own database in most deployments. When `url` is unset
/// the `customer` table is read from the main database.
#[derive(Clone, Debug, Default)]
pub struct DirectoryConfig {
    pub url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SettlementConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub enabled: bool,
    pub relay_url: Option<String>,
    pub from_address: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub directory_url: Option<String>,
    pub log_level: Option<String>,
    pub settlement_endpoint: Option<String>,
    pub mail_enabled: Option<bool>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://quotedesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            directory: DirectoryConfig::default(),
            settlement: SettlementConfig {
                endpoint: "http://127.0.0.1:9090/PurchaseOrder/".to_string(),
                timeout_secs: 15,
            },
            mail: MailConfig {
                enabled: false,
                relay_url: None,
                from_address: "quotes@quotedesk.local".to_string(),
                api_key: None,
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(invalid(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    /// Defaults, then the config file, then `QUOTEDESK_*` variables, then `options.overrides`.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match resolve_config_path(options.config_path.as_deref()) {
            Some(path) => config.apply_file(read_file(&path)?),
            None if options.require_file => {
                return Err(ConfigError::MissingConfigFile(
                    options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
                ));
            }
            None => {}
        }

        config.apply_env()?;
        config.apply_overrides(options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(database) = file.database {
            assign(&mut self.database.url, database.url);
            assign(&mut self.database.max_connections, database.max_connections);
            assign(&mut self.database.timeout_secs, database.timeout_secs);
        }
        if let Some(directory) = file.directory {
            assign_some(&mut self.directory.url, directory.url);
        }
        if let Some(settlement) = file.settlement {
            assign(&mut self.settlement.endpoint, settlement.endpoint);
            assign(&mut self.settlement.timeout_secs, settlement.timeout_secs);
        }
        if let Some(mail) = file.mail {
            assign(&mut self.mail.enabled, mail.enabled);
            assign_some(&mut self.mail.relay_url, mail.relay_url);
            assign(&mut self.mail.from_address, mail.from_address);
            assign_some(&mut self.mail.api_key, mail.api_key.map(SecretString::from));
            assign(&mut self.mail.timeout_secs, mail.timeout_secs);
        }
        if let Some(server) = file.server {
            assign(&mut self.server.bind_address, server.bind_address);
            assign(&mut self.server.port, server.port);
            assign(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }
        if let Some(logging) = file.logging {
            assign(&mut self.logging.level, logging.level);
            assign(&mut self.logging.format, logging.format);
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        assign(&mut self.database.url, env_value("QUOTEDESK_DATABASE_URL"));
        assign(
            &mut self.database.max_connections,
            env_parsed("QUOTEDESK_DATABASE_MAX_CONNECTIONS")?,
        );
        assign(&mut self.database.timeout_secs, env_parsed("QUOTEDESK_DATABASE_TIMEOUT_SECS")?);

        assign_some(&mut self.directory.url, env_value("QUOTEDESK_DIRECTORY_URL"));

        assign(&mut self.settlement.endpoint, env_value("QUOTEDESK_SETTLEMENT_ENDPOINT"));
        assign(
            &mut self.settlement.timeout_secs,
            env_parsed("QUOTEDESK_SETTLEMENT_TIMEOUT_SECS")?,
        );

        assign(&mut self.mail.enabled, env_parsed("QUOTEDESK_MAIL_ENABLED")?);
        assign_some(&mut self.mail.relay_url, env_value("QUOTEDESK_MAIL_RELAY_URL"));
        assign(&mut self.mail.from_address, env_value("QUOTEDESK_MAIL_FROM_ADDRESS"));
        assign_some(
            &mut self.mail.api_key,
            env_value("QUOTEDESK_MAIL_API_KEY").map(SecretString::from),
        );
        assign(&mut self.mail.timeout_secs, env_parsed("QUOTEDESK_MAIL_TIMEOUT_SECS")?);

        assign(&mut self.server.bind_address, env_value("QUOTEDESK_SERVER_BIND_ADDRESS"));
        assign(&mut self.server.port, env_parsed("QUOTEDESK_SERVER_PORT")?);
        assign(
            &mut self.server.graceful_shutdown_secs,
            env_parsed("QUOTEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        // The short `LOG_*` spellings are accepted as aliases.
        assign(
            &mut self.logging.level,
            env_value("QUOTEDESK_LOGGING_LEVEL").or_else(|| env_value("QUOTEDESK_LOG_LEVEL")),
        );
        if let Some(format) =
            env_value("QUOTEDESK_LOGGING_FORMAT").or_else(|| env_value("QUOTEDESK_LOG_FORMAT"))
        {
            self.logging.format = format.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        assign(&mut self.database.url, overrides.database_url);
        assign_some(&mut self.directory.url, overrides.directory_url);
        assign(&mut self.logging.level, overrides.log_level);
        assign(&mut self.settlement.endpoint, overrides.settlement_endpoint);
        assign(&mut self.mail.enabled, overrides.mail_enabled);
        assign(&mut self.server.port, overrides.server_port);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let database = &self.database;
        if !is_sqlite_url(&database.url) {
            return Err(invalid(
                "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
            ));
        }
        if database.max_connections == 0 {
            return Err(invalid("database.max_connections must be greater than zero"));
        }
        within_limit("database.timeout_secs", database.timeout_secs)?;

        if self.directory.url.as_deref().is_some_and(|url| !is_sqlite_url(url)) {
            return Err(invalid("directory.url must be a sqlite URL when set"));
        }

        if !is_http_url(&self.settlement.endpoint) {
            return Err(invalid("settlement.endpoint must start with http:// or https://"));
        }
        within_limit("settlement.timeout_secs", self.settlement.timeout_secs)?;

        self.validate_mail()?;

        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than zero"));
        }
        if self.server.graceful_shutdown_secs == 0 {
            return Err(invalid("server.graceful_shutdown_secs must be greater than zero"));
        }

        if !matches!(
            self.logging.level.trim().to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(invalid("logging.level must be one of trace|debug|info|warn|error"));
        }

        Ok(())
    }

    fn validate_mail(&self) -> Result<(), ConfigError> {
        let mail = &self.mail;
        within_limit("mail.timeout_secs", mail.timeout_secs)?;
        if !mail.from_address.contains('@') {
            return Err(invalid("mail.from_address must be an email address"));
        }
        if !mail.enabled {
            return Ok(());
        }

        if !mail.relay_url.as_deref().is_some_and(is_http_url) {
            return Err(invalid(
                "mail.enabled is true but mail.relay_url is missing or not an http(s) URL",
            ));
        }
        let has_key =
            mail.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty());
        if !has_key {
            return Err(invalid("mail.api_key is required when mail.enabled is true"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

/// Timeouts are capped at five minutes.
fn within_limit(field: &str, secs: u64) -> Result<(), ConfigError> {
    if (1..=300).contains(&secs) {
        Ok(())
    } else {
        Err(invalid(format!("{field} must be in range 1..=300")))
    }
}

fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn assign_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let expanded = expand_env_references(&raw)?;
    toml::from_str(&expanded)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Replaces every `${NAME}` with the value of the environment variable `NAME`.
fn expand_env_references(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let name = &after[..end];
        let value = env::var(name)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: name.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn is_sqlite_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:"
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("http://") || url.starts_with("https://")
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    env_value(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value })
        })
        .transpose()
}

/// On-disk shape of `quotedesk.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database: Option<DatabaseFile>,
    directory: Option<DirectoryFile>,
    settlement: Option<SettlementFile>,
    mail: Option<MailFile>,
    server: Option<ServerFile>,
    logging: Option<LoggingFile>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseFile {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DirectoryFile {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SettlementFile {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MailFile {
    enabled: Option<bool>,
    relay_url: Option<String>,
    from_address: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerFile {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingFile {
    level: Option<String>,
    format: Option<LogFormat>,
}
