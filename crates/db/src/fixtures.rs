use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// What the demo dataset promises about each seeded quote.
const SEED_QUOTES: &[SeedQuoteContract] = &[
    SeedQuoteContract {
        quote_id: 1,
        status: "draft",
        associate_login: "dreyes",
        expected_line_count: 2,
        total_amount: "500.00",
        description: "Draft still editable by its associate",
    },
    SeedQuoteContract {
        quote_id: 2,
        status: "submitted",
        associate_login: "dreyes",
        expected_line_count: 2,
        total_amount: "180.00",
        description: "Submitted with a 10% discount, waiting for review",
    },
    SeedQuoteContract {
        quote_id: 7,
        status: "sanctioned",
        associate_login: "lpark",
        expected_line_count: 2,
        total_amount: "500.00",
        description: "Sanctioned and ready for order processing",
    },
    SeedQuoteContract {
        quote_id: 8,
        status: "ordered",
        associate_login: "lpark",
        expected_line_count: 1,
        total_amount: "1000.00",
        description: "Ordered at 900.00 with an 8% commission",
    },
];

const SEED_QUOTE_IDS: &[i64] = &[1, 2, 7, 8];
const SEED_ASSOCIATE_IDS: &[i64] = &[1, 2];
const SEED_CUSTOMER_IDS: &[i64] = &[41, 42, 43];

/// Demo associates, customers and one quote per interesting lifecycle state.
///
/// Both associates log in with the credential `quotedesk-demo`.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Loads the dataset. Rows that already exist are left alone, so reloading is harmless.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let quotes_seeded = SEED_QUOTES
            .iter()
            .map(|quote| QuoteSeedInfo {
                quote_id: quote.quote_id,
                status: quote.status,
                description: quote.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { quotes_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let associates: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM associate WHERE id IN {}",
            sql_list(SEED_ASSOCIATE_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("associates".to_string(), associates == SEED_ASSOCIATE_IDS.len() as i64));

        let customers: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM customer WHERE id IN {}",
            sql_list(SEED_CUSTOMER_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("customers".to_string(), customers == SEED_CUSTOMER_IDS.len() as i64));

        for quote in SEED_QUOTES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM quote q JOIN associate a ON a.id = q.associate_id
                     WHERE q.id = ?1 AND q.status = ?2 AND a.login = ?3 AND q.total_amount = ?4
                 )",
            )
            .bind(quote.quote_id)
            .bind(quote.status)
            .bind(quote.associate_login)
            .bind(quote.total_amount)
            .fetch_one(pool)
            .await?;
            checks.push((format!("quote-{}-{}", quote.quote_id, quote.status), present == 1));

            let line_count: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM line_item WHERE quote_id = ?1")
                    .bind(quote.quote_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((
                format!("quote-{}-line-count", quote.quote_id),
                line_count == quote.expected_line_count,
            ));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        let quotes = sql_list(SEED_QUOTE_IDS);

        sqlx::query(&format!("DELETE FROM line_item WHERE quote_id IN {quotes}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM quote WHERE id IN {quotes}")).execute(&mut *tx).await?;
        sqlx::query(&format!("DELETE FROM customer WHERE id IN {}", sql_list(SEED_CUSTOMER_IDS)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM associate WHERE id IN {}",
            sql_list(SEED_ASSOCIATE_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedQuoteContract {
    quote_id: i64,
    status: &'static str,
    associate_login: &'static str,
    expected_line_count: i64,
    total_amount: &'static str,
    description: &'static str,
}

fn sql_list(ids: &[i64]) -> String {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub quotes_seeded: Vec<QuoteSeedInfo>,
}

#[derive(Debug)]
pub struct QuoteSeedInfo {
    pub quote_id: i64,
    pub status: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(String, bool)>,
}
