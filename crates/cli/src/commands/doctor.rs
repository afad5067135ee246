use quotedesk_core::config::{AppConfig, LoadOptions};
use quotedesk_db::{connect_read_only, connect_with_settings, DbPool};
use serde::Serialize;

use crate::commands::CommandResult;

const EXIT_NOT_READY: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_NOT_READY };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_settlement_endpoint(&config));
            checks.push(check_mail_delivery(&config));
            checks.extend(check_storage(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in
                ["settlement_endpoint", "mail_delivery", "database_connectivity", "customer_directory"]
            {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_settlement_endpoint(config: &AppConfig) -> DoctorCheck {
    // The URL shape is validated while loading; reachability is only known per order.
    DoctorCheck::pass(
        "settlement_endpoint",
        format!(
            "orders post to `{}` with a {}s timeout",
            config.settlement.endpoint, config.settlement.timeout_secs
        ),
    )
}

fn check_mail_delivery(config: &AppConfig) -> DoctorCheck {
    // Relay URL and key presence are enforced by config validation when mail is enabled.
    match (config.mail.enabled, config.mail.relay_url.as_deref()) {
        (true, Some(relay_url)) => DoctorCheck::pass(
            "mail_delivery",
            format!("notifications relay through `{relay_url}` as {}", config.mail.from_address),
        ),
        (true, None) => DoctorCheck::fail("mail_delivery", "mail.enabled is set without a relay"),
        (false, _) => {
            DoctorCheck::pass("mail_delivery", "mail disabled; notifications are logged only")
        }
    }
}

fn check_storage(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck::fail("database_connectivity", details),
                DoctorCheck::skipped("customer_directory", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("customer_directory", "the database is unreachable"),
                ];
            }
        };

        let database = match probe(&pool, "SELECT 1").await {
            Ok(()) => DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            Err(error) => DoctorCheck::fail("database_connectivity", error),
        };
        let directory = check_directory(config, &pool).await;

        pool.close().await;
        vec![database, directory]
    })
}

async fn check_directory(config: &AppConfig, main_pool: &DbPool) -> DoctorCheck {
    const QUERY: &str = "SELECT COUNT(1) FROM customer";

    let Some(url) = config.directory.url.as_deref() else {
        return match probe(main_pool, QUERY).await {
            Ok(()) => DoctorCheck::pass("customer_directory", "customer table readable in the main database"),
            Err(error) => DoctorCheck::fail(
                "customer_directory",
                format!("{error} (run `quotedesk migrate` first)"),
            ),
        };
    };

    let pool = match connect_read_only(url, 1, config.database.timeout_secs).await {
        Ok(pool) => pool,
        Err(error) => {
            return DoctorCheck::fail(
                "customer_directory",
                format!("failed to open directory `{url}`: {error}"),
            )
        }
    };
    let check = match probe(&pool, QUERY).await {
        Ok(()) => DoctorCheck::pass("customer_directory", format!("customer table readable at `{url}`")),
        Err(error) => DoctorCheck::fail("customer_directory", error),
    };
    pool.close().await;
    check
}

async fn probe(pool: &DbPool, query: &str) -> Result<(), String> {
    quotedesk_db::probe(pool, query).await.map_err(|error| format!("`{query}` failed: {error}"))
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
