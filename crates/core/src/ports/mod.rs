//! Boundaries the services talk through. Adapters live in `quotedesk-db`, `quotedesk-server`
//! and, for tests and local runs, [`memory`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::associate::{Associate, AssociateId, AssociateProfile, NewAssociate};
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::quote::{NewQuote, Quote, QuoteId, QuoteStatus};
use crate::domain::settlement::{OrderRequest, SettlementReceipt, SettlementReply};
use crate::lifecycle::QuoteMutation;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("quote {0} changed since it was loaded")]
    Conflict(QuoteId),
    #[error("associate {0} still owns quotes")]
    AssociateHasQuotes(AssociateId),
    #[error("login `{0}` is already taken")]
    DuplicateLogin(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteFilter {
    #[serde(default)]
    pub statuses: Vec<QuoteStatus>,
    pub associate_id: Option<AssociateId>,
    pub customer_id: Option<CustomerId>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl QuoteFilter {
    pub fn with_statuses(statuses: &[QuoteStatus]) -> Self {
        Self { statuses: statuses.to_vec(), ..Self::default() }
    }

    pub fn for_associate(associate_id: AssociateId) -> Self {
        Self { associate_id: Some(associate_id), ..Self::default() }
    }

    pub fn matches(&self, quote: &Quote) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&quote.status))
            && self.associate_id.map_or(true, |id| quote.associate_id == id)
            && self.customer_id.map_or(true, |id| quote.customer_id == id)
            && self.created_from.map_or(true, |from| quote.created_at >= from)
            && self.created_to.map_or(true, |to| quote.created_at <= to)
    }
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn find(&self, id: QuoteId) -> Result<Option<Quote>, StoreError>;

    async fn insert_new(&self, quote: NewQuote) -> Result<Quote, StoreError>;

    /// Applies every effect in one transaction, bumping the quote version. Returns the quote as
    /// persisted afterwards, or `None` when the mutation removed it. A failed version or status
    /// guard aborts the whole transaction with [`StoreError::Conflict`].
    async fn commit(&self, mutation: QuoteMutation) -> Result<Option<Quote>, StoreError>;

    /// Matching quotes ordered by id.
    async fn search(&self, filter: &QuoteFilter) -> Result<Vec<Quote>, StoreError>;
}

#[async_trait]
pub trait AssociateRepository: Send + Sync {
    async fn find(&self, id: AssociateId) -> Result<Option<Associate>, StoreError>;

    async fn list(&self) -> Result<Vec<Associate>, StoreError>;

    async fn create(&self, associate: NewAssociate) -> Result<Associate, StoreError>;

    /// Profile fields only. Commission balances are written by quote commits.
    async fn update(
        &self,
        id: AssociateId,
        profile: AssociateProfile,
    ) -> Result<Option<Associate>, StoreError>;

    /// `Ok(false)` when the associate does not exist.
    async fn delete(&self, id: AssociateId) -> Result<bool, StoreError>;

    async fn authenticate(
        &self,
        login: &str,
        credential: &SecretString,
    ) -> Result<Option<Associate>, StoreError>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("settlement system unreachable: {0}")]
    Transport(String),
    #[error("settlement system returned HTTP {status}")]
    Status { status: u16 },
    #[error("settlement reply could not be decoded: {0}")]
    Decode(String),
    #[error("settlement system did not answer within {0}s")]
    Timeout(u64),
}

#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn submit(&self, request: &OrderRequest) -> Result<SettlementReply, GatewayError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("could not render `{template}`: {message}")]
    Render { template: String, message: String },
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Never includes the quote's secret notes.
    async fn send_sanction_notice(&self, quote: &Quote) -> Result<(), NotificationError>;

    async fn send_order_confirmation(
        &self,
        quote: &Quote,
        receipt: &SettlementReceipt,
    ) -> Result<(), NotificationError>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
