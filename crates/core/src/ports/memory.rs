//! In-process adapters used by tests and by local runs without a database.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::domain::associate::{
    Associate, AssociateId, AssociateProfile, CredentialDigest, NewAssociate,
};
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::quote::{LineItem, LineItemId, NewQuote, Quote, QuoteId, QuoteStatus};
use crate::domain::settlement::{OrderRequest, SettlementReceipt, SettlementReply};
use crate::lifecycle::{PersistenceEffect, QuoteMutation};
use crate::ports::{
    AssociateRepository, Clock, CustomerDirectory, GatewayError, NotificationError, Notifier,
    QuoteFilter, QuoteStore, SettlementGateway, StoreError,
};

#[derive(Clone, Debug)]
struct StoredAssociate {
    associate: Associate,
    digest: CredentialDigest,
}

#[derive(Clone, Debug, Default)]
struct StoreState {
    quotes: BTreeMap<QuoteId, Quote>,
    associates: BTreeMap<AssociateId, StoredAssociate>,
    next_quote_id: i64,
    next_item_id: i64,
    next_associate_id: i64,
}

impl StoreState {
    fn quote_mut(&mut self, id: QuoteId) -> Result<&mut Quote, StoreError> {
        self.quotes.get_mut(&id).ok_or(StoreError::Conflict(id))
    }

    fn apply(&mut self, mutation: &QuoteMutation) -> Result<(), StoreError> {
        let id = mutation.quote.id;
        for effect in &mutation.effects {
            match effect {
                PersistenceEffect::UpdateQuote { expected_version, expected_status } => {
                    let current = self.quote_mut(id)?;
                    if current.version != *expected_version || current.status != *expected_status {
                        return Err(StoreError::Conflict(id));
                    }
                    let next = &mutation.quote;
                    current.email = next.email.clone();
                    current.secret_notes = next.secret_notes.clone();
                    current.status = next.status;
                    current.discount = next.discount;
                    current.total_amount = next.total_amount;
                    current.settlement = next.settlement.clone();
                    current.updated_at = next.updated_at;
                    current.version += 1;
                }
                PersistenceEffect::InsertLineItem(item) => {
                    self.next_item_id += 1;
                    let item_id = LineItemId(self.next_item_id);
                    self.quote_mut(id)?.items.push(LineItem {
                        id: item_id,
                        description: item.description.clone(),
                        price: item.price,
                    });
                }
                PersistenceEffect::UpdateLineItem(item) => {
                    let existing = self
                        .quote_mut(id)?
                        .items
                        .iter_mut()
                        .find(|existing| existing.id == item.id)
                        .ok_or(StoreError::Conflict(id))?;
                    *existing = item.clone();
                }
                PersistenceEffect::DeleteLineItem(item_id) => {
                    self.quote_mut(id)?.items.retain(|item| item.id != *item_id);
                }
                PersistenceEffect::DeleteQuote { expected_version } => {
                    if self.quote_mut(id)?.version != *expected_version {
                        return Err(StoreError::Conflict(id));
                    }
                    self.quotes.remove(&id);
                }
                PersistenceEffect::CreditCommission { associate_id, amount } => {
                    let stored = self.associates.get_mut(associate_id).ok_or_else(|| {
                        StoreError::Backend(format!("associate {associate_id} does not exist"))
                    })?;
                    stored.associate.accumulated_commission += *amount;
                }
            }
        }
        Ok(())
    }
}

/// Quote store and associate repository sharing one lock, so a commit that credits commission
/// is as atomic as the SQL transaction it stands in for.
#[derive(Clone, Default)]
pub struct InMemoryQuoteStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryQuoteStore {
    pub async fn quote_count(&self) -> usize {
        self.state.read().await.quotes.len()
    }

    pub async fn commission_of(&self, id: AssociateId) -> Option<Decimal> {
        let state = self.state.read().await;
        state.associates.get(&id).map(|stored| stored.associate.accumulated_commission)
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn find(&self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        let state = self.state.read().await;
        Ok(state.quotes.get(&id).cloned())
    }

    async fn insert_new(&self, quote: NewQuote) -> Result<Quote, StoreError> {
        let mut state = self.state.write().await;
        if !state.associates.contains_key(&quote.associate_id) {
            return Err(StoreError::Backend(format!(
                "associate {} does not exist",
                quote.associate_id
            )));
        }

        state.next_quote_id += 1;
        let id = QuoteId(state.next_quote_id);
        let mut items = Vec::with_capacity(quote.items.len());
        for item in quote.items {
            state.next_item_id += 1;
            items.push(LineItem {
                id: LineItemId(state.next_item_id),
                description: item.description,
                price: item.price,
            });
        }

        let stored = Quote {
            id,
            customer_id: quote.customer_id,
            associate_id: quote.associate_id,
            email: quote.email,
            secret_notes: quote.secret_notes,
            status: QuoteStatus::Draft,
            discount: quote.discount,
            total_amount: quote.total_amount,
            settlement: None,
            items,
            version: 1,
            created_at: quote.created_at,
            updated_at: quote.created_at,
        };
        state.quotes.insert(id, stored.clone());
        Ok(stored)
    }

    async fn commit(&self, mutation: QuoteMutation) -> Result<Option<Quote>, StoreError> {
        let mut state = self.state.write().await;
        let mut working = state.clone();
        working.apply(&mutation)?;
        *state = working;
        Ok(state.quotes.get(&mutation.quote.id).cloned())
    }

    async fn search(&self, filter: &QuoteFilter) -> Result<Vec<Quote>, StoreError> {
        let state = self.state.read().await;
        Ok(state.quotes.values().filter(|quote| filter.matches(quote)).cloned().collect())
    }
}

#[async_trait]
impl AssociateRepository for InMemoryQuoteStore {
    async fn find(&self, id: AssociateId) -> Result<Option<Associate>, StoreError> {
        let state = self.state.read().await;
        Ok(state.associates.get(&id).map(|stored| stored.associate.clone()))
    }

    async fn list(&self) -> Result<Vec<Associate>, StoreError> {
        let state = self.state.read().await;
        Ok(state.associates.values().map(|stored| stored.associate.clone()).collect())
    }

    async fn create(&self, associate: NewAssociate) -> Result<Associate, StoreError> {
        let mut state = self.state.write().await;
        if state.associates.values().any(|stored| stored.associate.login == associate.login) {
            return Err(StoreError::DuplicateLogin(associate.login));
        }

        state.next_associate_id += 1;
        let created = Associate {
            id: AssociateId(state.next_associate_id),
            name: associate.name,
            login: associate.login,
            address: associate.address,
            accumulated_commission: Decimal::ZERO,
            created_at: Utc::now(),
        };
        state.associates.insert(
            created.id,
            StoredAssociate {
                associate: created.clone(),
                digest: CredentialDigest::derive(&associate.credential),
            },
        );
        Ok(created)
    }

    async fn update(
        &self,
        id: AssociateId,
        profile: AssociateProfile,
    ) -> Result<Option<Associate>, StoreError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.associates.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = profile.name {
            stored.associate.name = name;
        }
        if let Some(address) = profile.address {
            stored.associate.address = Some(address);
        }
        if let Some(credential) = profile.credential {
            stored.digest = CredentialDigest::derive(&credential);
        }
        Ok(Some(stored.associate.clone()))
    }

    async fn delete(&self, id: AssociateId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state.quotes.values().any(|quote| quote.associate_id == id) {
            return Err(StoreError::AssociateHasQuotes(id));
        }
        Ok(state.associates.remove(&id).is_some())
    }

    async fn authenticate(
        &self,
        login: &str,
        credential: &SecretString,
    ) -> Result<Option<Associate>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .associates
            .values()
            .find(|stored| stored.associate.login == login && stored.digest.verify(credential))
            .map(|stored| stored.associate.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashMap<CustomerId, Customer>>,
}

impl InMemoryCustomerDirectory {
    pub fn with_customers(customers: impl IntoIterator<Item = Customer>) -> Self {
        Self {
            customers: RwLock::new(
                customers.into_iter().map(|customer| (customer.id, customer)).collect(),
            ),
        }
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn find(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let customers = self.customers.read().await;
        Ok(customers.get(&id).cloned())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentNotice {
    Sanction { quote_id: QuoteId, to: String },
    OrderConfirmation { quote_id: QuoteId, to: String, order_reference: String },
}

/// Records every notice; can be switched to fail delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotice>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { sent: Mutex::default(), failing: AtomicBool::new(true) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentNotice> {
        match self.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, notice: SentNotice) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Delivery("mail relay refused the message".to_string()));
        }
        match self.sent.lock() {
            Ok(mut sent) => sent.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_sanction_notice(&self, quote: &Quote) -> Result<(), NotificationError> {
        self.record(SentNotice::Sanction { quote_id: quote.id, to: quote.email.clone() })
    }

    async fn send_order_confirmation(
        &self,
        quote: &Quote,
        receipt: &SettlementReceipt,
    ) -> Result<(), NotificationError> {
        self.record(SentNotice::OrderConfirmation {
            quote_id: quote.id,
            to: quote.email.clone(),
            order_reference: receipt.order_reference.clone(),
        })
    }
}

/// Replays queued replies in order and records every request it saw.
#[derive(Default)]
pub struct ScriptedSettlementGateway {
    replies: Mutex<VecDeque<Result<SettlementReply, GatewayError>>>,
    requests: Mutex<Vec<OrderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedSettlementGateway {
    pub fn with_replies(
        replies: impl IntoIterator<Item = Result<SettlementReply, GatewayError>>,
    ) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()), ..Self::default() }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<OrderRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SettlementGateway for ScriptedSettlementGateway {
    async fn submit(&self, request: &OrderRequest) -> Result<SettlementReply, GatewayError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Err(GatewayError::Transport("no scripted reply left".to_string())))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
