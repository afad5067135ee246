use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use quotedesk_core::domain::customer::{Customer, CustomerId};
use quotedesk_core::ports::{CustomerDirectory, StoreError};

use super::RepositoryError;
use crate::DbPool;

/// Read-only lookups against the customer directory, which may live in its own database.
pub struct SqlCustomerDirectory {
    pool: DbPool,
}

impl SqlCustomerDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, city, street, contact FROM customer WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_customer).transpose()
    }
}

fn row_to_customer(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        city: row.try_get("city")?,
        street: row.try_get("street")?,
        contact: row.try_get("contact")?,
    })
}

#[async_trait]
impl CustomerDirectory for SqlCustomerDirectory {
    async fn find(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.find_by_id(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use quotedesk_core::domain::customer::CustomerId;
    use quotedesk_core::ports::CustomerDirectory;

    use super::SqlCustomerDirectory;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn finds_known_customers_only() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        sqlx::query(
            "INSERT INTO customer (id, name, city, street, contact)
             VALUES (41, 'Harbor Supply', 'Portland', NULL, 'ops@harbor.example')",
        )
        .execute(&pool)
        .await
        .expect("customer");

        let directory = SqlCustomerDirectory::new(pool);
        let customer = directory.find(CustomerId(41)).await.expect("find").expect("exists");
        assert_eq!(customer.name, "Harbor Supply");
        assert_eq!(customer.street, None);
        assert!(directory.find(CustomerId(42)).await.expect("find").is_none());
    }
}
