use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use crate::domain::associate::{Associate, AssociateId, AssociateProfile, NewAssociate};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::AssociateRepository;

/// Associate administration and login.
pub struct AssociateService {
    repository: Arc<dyn AssociateRepository>,
}

impl AssociateService {
    pub fn new(repository: Arc<dyn AssociateRepository>) -> Self {
        Self { repository }
    }

    /// Unknown login and wrong credential are indistinguishable to the caller.
    pub async fn login(
        &self,
        login: &str,
        credential: &SecretString,
    ) -> Result<Associate, ApplicationError> {
        match self.repository.authenticate(login.trim(), credential).await? {
            Some(associate) => {
                info!(
                    event_name = "associate.login_succeeded",
                    associate_id = associate.id.0,
                    "associate logged in"
                );
                Ok(associate)
            }
            None => {
                warn!(event_name = "associate.login_failed", login = %login, "login rejected");
                Err(ApplicationError::Unauthorized)
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<Associate>, ApplicationError> {
        Ok(self.repository.list().await?)
    }

    pub async fn find(&self, id: AssociateId) -> Result<Associate, ApplicationError> {
        self.repository.find(id).await?.ok_or_else(|| ApplicationError::not_found("associate", id))
    }

    pub async fn create(&self, associate: NewAssociate) -> Result<Associate, ApplicationError> {
        associate.validate().map_err(DomainError::Validation)?;
        let associate = NewAssociate {
            name: associate.name.trim().to_string(),
            login: associate.login.trim().to_string(),
            address: associate.address.filter(|address| !address.trim().is_empty()),
            ..associate
        };
        let created = self.repository.create(associate).await?;
        info!(
            event_name = "associate.created",
            associate_id = created.id.0,
            login = %created.login,
            "associate created"
        );
        Ok(created)
    }

    pub async fn update(
        &self,
        id: AssociateId,
        profile: AssociateProfile,
    ) -> Result<Associate, ApplicationError> {
        if profile.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(DomainError::Validation("associate name must not be empty".to_string()).into());
        }
        let updated = self
            .repository
            .update(id, profile)
            .await?
            .ok_or_else(|| ApplicationError::not_found("associate", id))?;
        info!(event_name = "associate.updated", associate_id = id.0, "associate profile updated");
        Ok(updated)
    }

    /// Refused while the associate still owns quotes.
    pub async fn delete(&self, id: AssociateId) -> Result<(), ApplicationError> {
        if !self.repository.delete(id).await? {
            return Err(ApplicationError::not_found("associate", id));
        }
        info!(event_name = "associate.deleted", associate_id = id.0, "associate deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::AssociateService;
    use crate::domain::associate::{AssociateProfile, NewAssociate};
    use crate::domain::customer::CustomerId;
    use crate::domain::quote::{Discount, NewLineItem, NewQuote};
    use crate::errors::ErrorKind;
    use crate::ports::memory::InMemoryQuoteStore;
    use crate::ports::QuoteStore;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn new_associate(login: &str) -> NewAssociate {
        NewAssociate {
            name: " Priya Natarajan ".to_string(),
            login: login.to_string(),
            credential: secret("correct horse"),
            address: Some("12 Dock Rd".to_string()),
        }
    }

    fn service(store: &InMemoryQuoteStore) -> AssociateService {
        AssociateService::new(Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn login_accepts_only_matching_credentials() {
        let store = InMemoryQuoteStore::default();
        let service = service(&store);
        let created = service.create(new_associate("priya")).await.expect("create");
        assert_eq!(created.name, "Priya Natarajan");

        let logged_in = service.login("priya", &secret("correct horse")).await.expect("login");
        assert_eq!(logged_in.id, created.id);

        let wrong = service.login("priya", &secret("battery")).await.expect_err("wrong credential");
        assert_eq!(wrong.kind(), ErrorKind::Unauthorized);
        let unknown = service.login("nobody", &secret("correct horse")).await.expect_err("unknown");
        assert_eq!(unknown.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicate_logins() {
        let store = InMemoryQuoteStore::default();
        let service = service(&store);

        let mut blank = new_associate("blank");
        blank.credential = secret("");
        assert_eq!(service.create(blank).await.expect_err("blank").kind(), ErrorKind::Validation);

        service.create(new_associate("priya")).await.expect("first");
        assert_eq!(
            service.create(new_associate("priya")).await.expect_err("duplicate").kind(),
            ErrorKind::Conflict
        );
    }

    #[tokio::test]
    async fn update_changes_profile_and_credential() {
        let store = InMemoryQuoteStore::default();
        let service = service(&store);
        let created = service.create(new_associate("priya")).await.expect("create");

        let updated = service
            .update(
                created.id,
                AssociateProfile {
                    name: None,
                    address: Some("4 Pier St".to_string()),
                    credential: Some(secret("new secret")),
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.name, "Priya Natarajan");
        assert_eq!(updated.address.as_deref(), Some("4 Pier St"));
        assert!(service.login("priya", &secret("new secret")).await.is_ok());
        assert!(service.login("priya", &secret("correct horse")).await.is_err());
    }

    #[tokio::test]
    async fn delete_is_refused_while_quotes_exist() {
        let store = InMemoryQuoteStore::default();
        let service = service(&store);
        let busy = service.create(new_associate("busy")).await.expect("busy");
        let idle = service.create(new_associate("idle")).await.expect("idle");
        store
            .insert_new(NewQuote {
                customer_id: CustomerId(3),
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

        assert_eq!(service.delete(busy.id).await.expect_err("owns quotes").kind(), ErrorKind::Conflict);
        service.delete(idle.id).await.expect("idle deleted");
        assert_eq!(service.find(idle.id).await.expect_err("gone").kind(), ErrorKind::NotFound);
        assert_eq!(service.delete(idle.id).await.expect_err("twice").kind(), ErrorKind::NotFound);
    }
}
