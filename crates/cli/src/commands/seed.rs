use quotedesk_db::{DemoSeedDataset, QuoteSeedInfo};

use crate::commands::{open_migrated, prepare, CommandResult, StepFailure, EXIT_SEED};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated(&config).await?;
        let outcome = load_and_verify(&pool).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(quotes) => CommandResult::success("seed", render_summary(&quotes)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn load_and_verify(pool: &quotedesk_db::DbPool) -> Result<Vec<QuoteSeedInfo>, StepFailure> {
    let seeded = DemoSeedDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), EXIT_SEED))?;

    let verification = DemoSeedDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED))?;

    if !verification.all_present {
        let failed = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
            .collect::<Vec<_>>();
        return Err(("seed_verification", verification_message(&failed), EXIT_SEED));
    }

    Ok(seeded.quotes_seeded)
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "some demo data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

fn render_summary(quotes: &[QuoteSeedInfo]) -> String {
    let lines = quotes
        .iter()
        .map(|quote| format!("  - quote {} [{}]: {}", quote.quote_id, quote.status, quote.description))
        .collect::<Vec<_>>();
    format!("demo dataset loaded (associates log in with `quotedesk-demo`):\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use quotedesk_db::QuoteSeedInfo;

    use super::{render_summary, verification_message};

    #[test]
    fn verification_message_names_failed_checks() {
        assert_eq!(
            verification_message(&["quote-7-sanctioned", "customers"]),
            "seed verification failed for checks: quote-7-sanctioned, customers"
        );
    }

    #[test]
    fn verification_message_falls_back_without_labels() {
        assert_eq!(verification_message(&[]), "some demo data failed to load");
    }

    #[test]
    fn summary_lists_each_quote_with_its_status() {
        let summary = render_summary(&[QuoteSeedInfo {
            quote_id: 7,
            status: "sanctioned",
            description: "Sanctioned and ready for order processing",
        }]);

        assert!(summary.contains("  - quote 7 [sanctioned]: Sanctioned and ready for order processing"));
    }
}
