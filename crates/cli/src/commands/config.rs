use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use quotedesk_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: EXIT_CONFIG,
                output: format!("config validation failed: {error}"),
            }
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in effective_values(&config) {
        let source =
            field_source(key, &env_key(key), config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn effective_values(config: &AppConfig) -> Vec<(&'static str, String)> {
    vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        (
            "directory.url",
            config.directory.url.clone().unwrap_or_else(|| "<same as database.url>".to_string()),
        ),
        ("settlement.endpoint", config.settlement.endpoint.clone()),
        ("settlement.timeout_secs", config.settlement.timeout_secs.to_string()),
        ("mail.enabled", config.mail.enabled.to_string()),
        ("mail.relay_url", config.mail.relay_url.clone().unwrap_or_else(|| "<unset>".to_string())),
        ("mail.from_address", config.mail.from_address.clone()),
        ("mail.api_key", redact_secret(config.mail.api_key.as_ref())),
        ("mail.timeout_secs", config.mail.timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ]
}

/// `mail.api_key` -> `QUOTEDESK_MAIL_API_KEY`.
fn env_key(key_path: &str) -> String {
    format!("QUOTEDESK_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        None => "<unset>".to_string(),
        Some(secret) if secret.expose_secret().trim().is_empty() => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, env_key, field_source, redact_secret};

    #[test]
    fn env_key_follows_the_quotedesk_prefix() {
        assert_eq!(env_key("mail.api_key"), "QUOTEDESK_MAIL_API_KEY");
        assert_eq!(env_key("server.graceful_shutdown_secs"), "QUOTEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS");
    }

    #[test]
    fn secrets_are_never_rendered() {
        let key = SecretString::from("relay-secret-value".to_string());
        assert_eq!(redact_secret(Some(&key)), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
        assert_eq!(redact_secret(Some(&SecretString::from(" ".to_string()))), "<empty>");
    }

    #[test]
    fn file_source_is_reported_for_keys_present_in_the_document() {
        let doc: Value = "[settlement]\nendpoint = \"http://orders.internal/PurchaseOrder/\"\n"
            .parse()
            .expect("toml");

        assert!(contains_path(&doc, "settlement.endpoint"));
        assert!(!contains_path(&doc, "settlement.timeout_secs"));
        assert_eq!(
            field_source(
                "settlement.endpoint",
                "QUOTEDESK_TEST_NEVER_SET_ENDPOINT",
                Some(&doc),
                Some(std::path::Path::new("quotedesk.toml")),
            ),
            "file (quotedesk.toml)"
        );
        assert_eq!(
            field_source("settlement.timeout_secs", "QUOTEDESK_TEST_NEVER_SET_TIMEOUT", Some(&doc), None),
            "default"
        );
    }
}
