use std::env;
use std::sync::{Mutex, OnceLock};

use quotedesk_cli::commands::{config, doctor, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_default_config() {
    with_env(&[("QUOTEDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("QUOTEDESK_DATABASE_URL", "postgres://localhost/quotes")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_one_quote_per_lifecycle_state() {
    with_env(&[("QUOTEDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("quote 1 [draft]"));
        assert!(message.contains("quote 2 [submitted]"));
        assert!(message.contains("quote 7 [sanctioned]"));
        assert!(message.contains("quote 8 [ordered]"));
    });
}

#[test]
fn seed_is_idempotent_against_the_same_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("quotedesk.db").display());

    with_env(&[("QUOTEDESK_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "first seed failed: {}", first.output);

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "second seed failed: {}", second.output);

        assert_eq!(parse_payload(&first.output)["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn config_redacts_the_mail_api_key() {
    with_env(
        &[
            ("QUOTEDESK_MAIL_ENABLED", "true"),
            ("QUOTEDESK_MAIL_RELAY_URL", "https://relay.example/send"),
            ("QUOTEDESK_MAIL_API_KEY", "relay-secret-value"),
        ],
        || {
            let result = config::run();
            assert_eq!(result.exit_code, 0, "config failed: {}", result.output);
            assert!(!result.output.contains("relay-secret-value"));
            assert!(result
                .output
                .contains("- mail.api_key = <redacted> (source: env (QUOTEDESK_MAIL_API_KEY))"));
            assert!(result.output.contains("- server.port = 8080 (source: default)"));
        },
    );
}

#[test]
fn doctor_passes_once_the_database_is_migrated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("quotedesk.db").display());

    with_env(&[("QUOTEDESK_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = doctor::run(true);
        let report = parse_payload(&result.output);
        assert_eq!(result.exit_code, 0, "doctor failed: {}", result.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(report["checks"].as_array().map(Vec::len), Some(5));
    });
}

#[test]
fn doctor_flags_a_database_without_schema() {
    with_env(&[("QUOTEDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "fail");
        let directory = report["checks"]
            .as_array()
            .and_then(|checks| checks.iter().find(|check| check["name"] == "customer_directory"))
            .cloned()
            .expect("customer_directory check");
        assert_eq!(directory["status"], "fail");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_is_invalid() {
    with_env(&[("QUOTEDESK_SERVER_PORT", "eighty")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] database_connectivity:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "QUOTEDESK_DATABASE_URL",
        "QUOTEDESK_DATABASE_MAX_CONNECTIONS",
        "QUOTEDESK_DATABASE_TIMEOUT_SECS",
        "QUOTEDESK_DIRECTORY_URL",
        "QUOTEDESK_SETTLEMENT_ENDPOINT",
        "QUOTEDESK_SETTLEMENT_TIMEOUT_SECS",
        "QUOTEDESK_MAIL_ENABLED",
        "QUOTEDESK_MAIL_RELAY_URL",
        "QUOTEDESK_MAIL_FROM_ADDRESS",
        "QUOTEDESK_MAIL_API_KEY",
        "QUOTEDESK_MAIL_TIMEOUT_SECS",
        "QUOTEDESK_SERVER_BIND_ADDRESS",
        "QUOTEDESK_SERVER_PORT",
        "QUOTEDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "QUOTEDESK_LOGGING_LEVEL",
        "QUOTEDESK_LOGGING_FORMAT",
        "QUOTEDESK_LOG_LEVEL",
        "QUOTEDESK_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
