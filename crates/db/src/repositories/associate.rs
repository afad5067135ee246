use async_trait::async_trait;
use chrono::Utc;
use secrecy::SecretString;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use quotedesk_core::domain::associate::{
    Associate, AssociateId, AssociateProfile, CredentialDigest, NewAssociate,
};
use quotedesk_core::ports::{AssociateRepository, StoreError};

use super::{
    format_timestamp, is_foreign_key_violation, is_unique_violation, parse_decimal,
    parse_timestamp, RepositoryError,
};
use crate::DbPool;

const ASSOCIATE_COLUMNS: &str =
    "id, name, login, address, accumulated_commission, created_at, credential_digest";

pub struct SqlAssociateRepository {
    pool: DbPool,
}

impl SqlAssociateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: AssociateId) -> Result<Option<Associate>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ASSOCIATE_COLUMNS} FROM associate WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_associate).transpose()
    }

    async fn insert(&self, associate: NewAssociate) -> Result<Associate, RepositoryError> {
        let digest = CredentialDigest::derive(&associate.credential);
        let result = sqlx::query(
            "INSERT INTO associate (name, login, credential_digest, address,
                                    accumulated_commission, created_at)
             VALUES (?, ?, ?, ?, '0', ?)",
        )
        .bind(&associate.name)
        .bind(&associate.login)
        .bind(digest.as_str())
        .bind(&associate.address)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(error) if is_unique_violation(&error) => {
                return Err(RepositoryError::DuplicateLogin(associate.login));
            }
            Err(error) => return Err(error.into()),
        };

        let id = AssociateId(result.last_insert_rowid());
        self.fetch(id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("associate {id} vanished after insert"))
        })
    }

    async fn change_profile(
        &self,
        id: AssociateId,
        profile: AssociateProfile,
    ) -> Result<Option<Associate>, RepositoryError> {
        let digest = profile.credential.as_ref().map(CredentialDigest::derive);
        let result = sqlx::query(
            "UPDATE associate SET
                 name = COALESCE(?, name),
                 address = COALESCE(?, address),
                 credential_digest = COALESCE(?, credential_digest)
             WHERE id = ?",
        )
        .bind(profile.name)
        .bind(profile.address)
        .bind(digest.as_ref().map(CredentialDigest::as_str))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch(id).await
    }

    async fn remove(&self, id: AssociateId) -> Result<bool, RepositoryError> {
        match sqlx::query("DELETE FROM associate WHERE id = ?").bind(id.0).execute(&self.pool).await
        {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(error) if is_foreign_key_violation(&error) => {
                Err(RepositoryError::AssociateHasQuotes(id))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn verify(
        &self,
        login: &str,
        credential: &SecretString,
    ) -> Result<Option<Associate>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {ASSOCIATE_COLUMNS} FROM associate WHERE login = ?"))
                .bind(login)
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let digest = CredentialDigest::from_stored(row.try_get::<String, _>("credential_digest")?);
        if !digest.verify(credential) {
            return Ok(None);
        }
        row_to_associate(&row).map(Some)
    }
}

#[async_trait]
impl AssociateRepository for SqlAssociateRepository {
    async fn find(&self, id: AssociateId) -> Result<Option<Associate>, StoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn list(&self) -> Result<Vec<Associate>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {ASSOCIATE_COLUMNS} FROM associate ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.iter().map(row_to_associate).collect::<Result<Vec<_>, _>>()?)
    }

    async fn create(&self, associate: NewAssociate) -> Result<Associate, StoreError> {
        Ok(self.insert(associate).await?)
    }

    async fn update(
        &self,
        id: AssociateId,
        profile: AssociateProfile,
    ) -> Result<Option<Associate>, StoreError> {
        Ok(self.change_profile(id, profile).await?)
    }

    async fn delete(&self, id: AssociateId) -> Result<bool, StoreError> {
        Ok(self.remove(id).await?)
    }

    async fn authenticate(
        &self,
        login: &str,
        credential: &SecretString,
    ) -> Result<Option<Associate>, StoreError> {
        Ok(self.verify(login, credential).await?)
    }
}

fn row_to_associate(row: &SqliteRow) -> Result<Associate, RepositoryError> {
    let commission: String = row.try_get("accumulated_commission")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(Associate {
        id: AssociateId(row.try_get("id")?),
        name: row.try_get("name")?,
        login: row.try_get("login")?,
        address: row.try_get("address")?,
        accumulated_commission: parse_decimal("accumulated_commission", &commission)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use quotedesk_core::domain::associate::{AssociateId, AssociateProfile, NewAssociate};
    use quotedesk_core::domain::customer::CustomerId;
    use quotedesk_core::domain::quote::{Discount, NewLineItem, NewQuote};
    use quotedesk_core::ports::{AssociateRepository, QuoteStore, StoreError};

    use super::SqlAssociateRepository;
    use crate::repositories::SqlQuoteStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn new_associate(login: &str) -> NewAssociate {
        NewAssociate {
            name: "Lee Park".to_string(),
            login: login.to_string(),
            credential: secret("tide pool"),
            address: Some("9 Quay St".to_string()),
        }
    }

    #[tokio::test]
    async fn credentials_are_stored_as_digests() {
        let pool = setup_pool().await;
        let repo = SqlAssociateRepository::new(pool.clone());
        let created = repo.create(new_associate("lpark")).await.expect("create");
        assert_eq!(created.accumulated_commission, Decimal::ZERO);

        let stored: String = sqlx::query_scalar("SELECT credential_digest FROM associate")
            .fetch_one(&pool)
            .await
            .expect("digest");
        assert!(!stored.contains("tide pool"));

        assert!(repo.authenticate("lpark", &secret("tide pool")).await.expect("auth").is_some());
        assert!(repo.authenticate("lpark", &secret("low tide")).await.expect("auth").is_none());
        assert!(repo.authenticate("nobody", &secret("tide pool")).await.expect("auth").is_none());
    }

    #[tokio::test]
    async fn duplicate_login_is_reported() {
        let repo = SqlAssociateRepository::new(setup_pool().await);
        repo.create(new_associate("lpark")).await.expect("first");
        assert_eq!(
            repo.create(new_associate("lpark")).await,
            Err(StoreError::DuplicateLogin("lpark".to_string()))
        );
    }

    #[tokio::test]
    async fn update_only_touches_given_fields() {
        let repo = SqlAssociateRepository::new(setup_pool().await);
        let created = repo.create(new_associate("lpark")).await.expect("create");

        let updated = repo
            .update(
                created.id,
                AssociateProfile { name: Some("Lee Park-Ito".to_string()), ..Default::default() },
            )
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.name, "Lee Park-Ito");
        assert_eq!(updated.address.as_deref(), Some("9 Quay St"));
        assert!(repo.authenticate("lpark", &secret("tide pool")).await.expect("auth").is_some());

        let missing = repo
            .update(AssociateId(999), AssociateProfile::default())
            .await
            .expect("update");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn delete_is_refused_while_quotes_reference_the_associate() {
        let pool = setup_pool().await;
        let repo = SqlAssociateRepository::new(pool.clone());
        let busy = repo.create(new_associate("busy")).await.expect("busy");
        let idle = repo.create(new_associate("idle")).await.expect("idle");
        SqlQuoteStore::new(pool)
            .insert_new(NewQuote {
                customer_id: CustomerId(1),
                associate_id: busy.id,
                email: "buyer@example.com".to_string(),
                secret_notes: None,
                discount: Discount::default(),
                total_amount: Decimal::TEN,
                items: vec![NewLineItem { description: "Valve".to_string(), price: Decimal::TEN }],
                created_at: Utc::now(),
            })
            .await
            .expect("quote");

        assert_eq!(repo.delete(busy.id).await, Err(StoreError::AssociateHasQuotes(busy.id)));
        assert_eq!(repo.delete(idle.id).await, Ok(true));
        assert_eq!(repo.delete(idle.id).await, Ok(false));
        assert_eq!(repo.list().await.expect("list").len(), 1);
    }
}
