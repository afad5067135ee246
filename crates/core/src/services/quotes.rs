use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::associate::AssociateId;
use crate::domain::customer::{Customer, CustomerId};
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::{self, QuoteDraft, QuoteEdit, QuoteMutation};
use crate::ports::{
    AssociateRepository, Clock, CustomerDirectory, Notifier, QuoteFilter, QuoteStore,
};
use crate::services::{NotificationStatus, Notified};

/// Associate and reviewer operations on quotes, everything short of booking an order.
pub struct QuoteService {
    store: Arc<dyn QuoteStore>,
    associates: Arc<dyn AssociateRepository>,
    directory: Arc<dyn CustomerDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl QuoteService {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        associates: Arc<dyn AssociateRepository>,
        directory: Arc<dyn CustomerDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { store, associates, directory, notifier, clock, audit }
    }

    pub async fn create(
        &self,
        ctx: &AuditContext,
        associate_id: AssociateId,
        draft: QuoteDraft,
    ) -> Result<Quote, ApplicationError> {
        if self.associates.find(associate_id).await?.is_none() {
            return Err(ApplicationError::not_found("associate", associate_id));
        }
        let customer_id = draft.customer_id;
        if self.directory.find(customer_id).await?.is_none() {
            self.audit.emit(
                AuditEvent::new(
                    ctx,
                    "quote.create_rejected",
                    AuditCategory::Lifecycle,
                    AuditOutcome::Rejected,
                )
                .with_metadata("customer_id", customer_id.to_string()),
            );
            return Err(DomainError::UnknownCustomer(customer_id).into());
        }

        let new_quote = lifecycle::create_quote(associate_id, draft, self.clock.now())?;
        let quote = self.store.insert_new(new_quote).await?;

        self.audit.emit(
            AuditEvent::new(
                &ctx.for_quote(quote.id),
                "quote.created",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
            )
            .with_metadata("total_amount", quote.total_amount.to_string())
            .with_metadata("line_items", quote.items.len().to_string()),
        );
        info!(
            event_name = "quote.created",
            correlation_id = %ctx.correlation_id,
            quote_id = quote.id.0,
            associate_id = associate_id.0,
            customer_id = customer_id.0,
            "quote created in draft"
        );
        Ok(quote)
    }

    pub async fn find(&self, quote_id: QuoteId) -> Result<Quote, ApplicationError> {
        self.store.find(quote_id).await?.ok_or_else(|| ApplicationError::not_found("quote", quote_id))
    }

    pub async fn find_for_associate(
        &self,
        associate_id: AssociateId,
        quote_id: QuoteId,
    ) -> Result<Quote, ApplicationError> {
        let quote = self.find(quote_id).await?;
        if !quote.is_owned_by(associate_id) {
            return Err(DomainError::NotOwner { actor: associate_id, quote_id }.into());
        }
        Ok(quote)
    }

    pub async fn list_for_associate(
        &self,
        associate_id: AssociateId,
    ) -> Result<Vec<Quote>, ApplicationError> {
        Ok(self.store.search(&QuoteFilter::for_associate(associate_id)).await?)
    }

    pub async fn edit_draft(
        &self,
        ctx: &AuditContext,
        associate_id: AssociateId,
        quote_id: QuoteId,
        edit: QuoteEdit,
    ) -> Result<Quote, ApplicationError> {
        let quote = self.find(quote_id).await?;
        let mutation = lifecycle::edit_draft(&quote, associate_id, edit, self.clock.now());
        self.commit_kept(ctx, quote_id, mutation).await
    }

    pub async fn submit(
        &self,
        ctx: &AuditContext,
        associate_id: AssociateId,
        quote_id: QuoteId,
    ) -> Result<Quote, ApplicationError> {
        let quote = self.find(quote_id).await?;
        let mutation = lifecycle::submit(&quote, associate_id, self.clock.now());
        self.commit_kept(ctx, quote_id, mutation).await
    }

    pub async fn delete(
        &self,
        ctx: &AuditContext,
        associate_id: AssociateId,
        quote_id: QuoteId,
    ) -> Result<(), ApplicationError> {
        let quote = self.find(quote_id).await?;
        let mutation = lifecycle::delete(&quote, associate_id);
        self.commit(ctx, quote_id, mutation).await.map(|_| ())
    }

    /// Quotes waiting on a reviewer.
    pub async fn review_queue(&self) -> Result<Vec<Quote>, ApplicationError> {
        let filter = QuoteFilter::with_statuses(&[QuoteStatus::Submitted, QuoteStatus::Unresolved]);
        Ok(self.store.search(&filter).await?)
    }

    pub async fn edit_under_review(
        &self,
        ctx: &AuditContext,
        quote_id: QuoteId,
        edit: QuoteEdit,
    ) -> Result<Quote, ApplicationError> {
        let quote = self.find(quote_id).await?;
        let mutation = lifecycle::edit_under_review(&quote, edit, self.clock.now());
        self.commit_kept(ctx, quote_id, mutation).await
    }

    /// Commits the sanction first; the notice goes out afterwards and cannot undo it.
    pub async fn sanction(
        &self,
        ctx: &AuditContext,
        quote_id: QuoteId,
    ) -> Result<Notified<Quote>, ApplicationError> {
        let quote = self.find(quote_id).await?;
        let mutation = lifecycle::sanction(&quote, self.clock.now());
        let sanctioned = self.commit_kept(ctx, quote_id, mutation).await?;

        let notification =
            NotificationStatus::from_result(self.notifier.send_sanction_notice(&sanctioned).await);
        self.record_notification(ctx, quote_id, "sanction_notice", &notification);
        Ok(Notified { value: sanctioned, notification })
    }

    pub async fn search(&self, filter: &QuoteFilter) -> Result<Vec<Quote>, ApplicationError> {
        Ok(self.store.search(filter).await?)
    }

    pub async fn customer(&self, customer_id: CustomerId) -> Result<Customer, ApplicationError> {
        self.directory
            .find(customer_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("customer", customer_id))
    }

    async fn commit_kept(
        &self,
        ctx: &AuditContext,
        quote_id: QuoteId,
        mutation: Result<QuoteMutation, DomainError>,
    ) -> Result<Quote, ApplicationError> {
        self.commit(ctx, quote_id, mutation).await?.ok_or_else(|| {
            ApplicationError::Persistence(format!("quote {quote_id} vanished during commit"))
        })
    }

    async fn commit(
        &self,
        ctx: &AuditContext,
        quote_id: QuoteId,
        mutation: Result<QuoteMutation, DomainError>,
    ) -> Result<Option<Quote>, ApplicationError> {
        let ctx = ctx.for_quote(quote_id);
        let mutation = match mutation {
            Ok(mutation) => mutation,
            Err(error) => {
                if let DomainError::FlowTransition(transition) = &error {
                    self.audit.emit(transition.audit_event(&ctx));
                }
                warn!(
                    event_name = "quote.mutation_rejected",
                    correlation_id = %ctx.correlation_id,
                    quote_id = quote_id.0,
                    error = %error,
                    "quote mutation rejected"
                );
                return Err(error.into());
            }
        };

        let transition = mutation.transition.clone();
        let committed = self.store.commit(mutation).await?;
        self.audit.emit(transition.audit_event(&ctx));
        info!(
            event_name = "quote.transition_committed",
            correlation_id = %ctx.correlation_id,
            quote_id = quote_id.0,
            event = transition.event.as_str(),
            from = transition.from.as_str(),
            to = transition.to.map_or("removed", |to| to.as_str()),
            "quote transition committed"
        );
        Ok(committed)
    }

    fn record_notification(
        &self,
        ctx: &AuditContext,
        quote_id: QuoteId,
        notice: &str,
        status: &NotificationStatus,
    ) {
        let ctx = ctx.for_quote(quote_id);
        let event = match status {
            NotificationStatus::Sent => AuditEvent::new(
                &ctx,
                "notification.sent",
                AuditCategory::Notification,
                AuditOutcome::Success,
            ),
            NotificationStatus::Failed { reason } => {
                warn!(
                    event_name = "notification.failed",
                    correlation_id = %ctx.correlation_id,
                    quote_id = quote_id.0,
                    notice,
                    reason = %reason,
                    "notification failed after commit"
                );
                AuditEvent::new(
                    &ctx,
                    "notification.failed",
                    AuditCategory::Notification,
                    AuditOutcome::Failed,
                )
                .with_metadata("reason", reason.clone())
            }
        };
        self.audit.emit(event.with_metadata("notice", notice));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::associate::{AssociateId, NewAssociate};
    use crate::domain::customer::{Customer, CustomerId};
    use crate::domain::quote::{Discount, LineItemInput, NewLineItem, QuoteId, QuoteStatus};
    use crate::errors::{ApplicationError, DomainError, ErrorKind};
    use crate::lifecycle::{QuoteDraft, QuoteEdit};
    use crate::ports::memory::{
        FixedClock, InMemoryCustomerDirectory, InMemoryQuoteStore, RecordingNotifier, SentNotice,
    };
    use crate::ports::AssociateRepository;
    use crate::services::{NotificationStatus, QuoteService};

    struct Harness {
        service: QuoteService,
        store: InMemoryQuoteStore,
        notifier: Arc<RecordingNotifier>,
        audit: InMemoryAuditSink,
        owner: AssociateId,
    }

    async fn harness() -> Harness {
        let store = InMemoryQuoteStore::default();
        let owner = store
            .create(NewAssociate {
                name: "Dana Reyes".to_string(),
                login: "dreyes".to_string(),
                credential: SecretString::from("s3cret".to_string()),
                address: None,
            })
            .await
            .expect("associate")
            .id;
        let notifier = Arc::new(RecordingNotifier::default());
        let audit = InMemoryAuditSink::default();
        let directory = InMemoryCustomerDirectory::with_customers([Customer {
            id: CustomerId(41),
            name: "Harbor Supply".to_string(),
            city: Some("Portland".to_string()),
            street: None,
            contact: None,
        }]);
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).single().expect("date"));

        let service = QuoteService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(directory),
            notifier.clone(),
            Arc::new(clock),
            Arc::new(audit.clone()),
        );
        Harness { service, store, notifier, audit, owner }
    }

    fn ctx() -> AuditContext {
        AuditContext::new(None, "req-test", "test")
    }

    fn draft(customer: i64) -> QuoteDraft {
        QuoteDraft {
            customer_id: CustomerId(customer),
            email: "buyer@example.com".to_string(),
            secret_notes: Some("can go to 10% off".to_string()),
            discount: Discount::amount(Decimal::new(50, 0)),
            items: vec![
                NewLineItem { description: "Pump".to_string(), price: Decimal::new(300, 0) },
                NewLineItem { description: "Hose".to_string(), price: Decimal::new(200, 0) },
            ],
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_customer_without_writing() {
        let h = harness().await;
        let error = h.service.create(&ctx(), h.owner, draft(999)).await.expect_err("unknown customer");

        assert_eq!(error, ApplicationError::Domain(DomainError::UnknownCustomer(CustomerId(999))));
        assert_eq!(error.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(h.store.quote_count().await, 0);
    }

    #[tokio::test]
    async fn full_review_cycle_reaches_sanctioned_and_notifies() {
        let h = harness().await;
        let quote = h.service.create(&ctx(), h.owner, draft(41)).await.expect("created");
        assert_eq!(quote.status, QuoteStatus::Draft);
        assert_eq!(quote.total_amount, Decimal::new(450, 0));

        h.service.submit(&ctx(), h.owner, quote.id).await.expect("submitted");
        let queue = h.service.review_queue().await.expect("queue");
        assert_eq!(queue.len(), 1);

        let keep_first = QuoteEdit {
            email: "buyer@example.com".to_string(),
            secret_notes: None,
            discount: Discount::percentage(Decimal::new(10, 0)),
            items: vec![LineItemInput {
                id: Some(quote.items[0].id),
                description: "Pump".to_string(),
                price: Decimal::new(300, 0),
            }],
        };
        let edited =
            h.service.edit_under_review(&ctx(), quote.id, keep_first).await.expect("review edit");
        assert_eq!(edited.status, QuoteStatus::Unresolved);
        assert_eq!(edited.items.len(), 1);
        assert_eq!(edited.total_amount, Decimal::new(270, 0));

        let sanctioned = h.service.sanction(&ctx(), quote.id).await.expect("sanctioned");
        assert_eq!(sanctioned.value.status, QuoteStatus::Sanctioned);
        assert!(sanctioned.notification.is_sent());
        assert_eq!(
            h.notifier.sent(),
            vec![SentNotice::Sanction { quote_id: quote.id, to: "buyer@example.com".to_string() }]
        );
        assert!(h.audit.event_types().contains(&"notification.sent".to_string()));
    }

    #[tokio::test]
    async fn failed_sanction_notice_keeps_the_commit() {
        let h = harness().await;
        let quote = h.service.create(&ctx(), h.owner, draft(41)).await.expect("created");
        h.service.submit(&ctx(), h.owner, quote.id).await.expect("submitted");
        h.notifier.set_failing(true);

        let sanctioned = h.service.sanction(&ctx(), quote.id).await.expect("committed anyway");

        assert!(matches!(sanctioned.notification, NotificationStatus::Failed { .. }));
        assert!(sanctioned.notification.warning().is_some());
        assert_eq!(
            h.service.find(quote.id).await.expect("reload").status,
            QuoteStatus::Sanctioned
        );
    }

    #[tokio::test]
    async fn other_associates_are_forbidden() {
        let h = harness().await;
        let quote = h.service.create(&ctx(), h.owner, draft(41)).await.expect("created");

        let error = h
            .service
            .find_for_associate(AssociateId(77), quote.id)
            .await
            .expect_err("not the owner");
        assert_eq!(error.kind(), ErrorKind::Forbidden);
        assert!(h.service.delete(&ctx(), AssociateId(77), quote.id).await.is_err());
        assert_eq!(h.store.quote_count().await, 1);
    }

    #[tokio::test]
    async fn draft_delete_cascades_and_later_delete_is_refused() {
        let h = harness().await;
        let first = h.service.create(&ctx(), h.owner, draft(41)).await.expect("created");
        let second = h.service.create(&ctx(), h.owner, draft(41)).await.expect("created");

        h.service.delete(&ctx(), h.owner, first.id).await.expect("draft delete");
        assert_eq!(
            h.service.find(first.id).await.expect_err("gone").kind(),
            ErrorKind::NotFound
        );

        h.service.submit(&ctx(), h.owner, second.id).await.expect("submitted");
        let error = h.service.delete(&ctx(), h.owner, second.id).await.expect_err("submitted");
        assert_eq!(error.kind(), ErrorKind::InvalidStateTransition);
        assert!(h.audit.event_types().contains(&"lifecycle.transition_rejected".to_string()));
    }

    #[tokio::test]
    async fn associate_cannot_edit_after_submit() {
        let h = harness().await;
        let quote = h.service.create(&ctx(), h.owner, draft(41)).await.expect("created");
        h.service.submit(&ctx(), h.owner, quote.id).await.expect("submitted");

        let edit = QuoteEdit {
            email: "buyer@example.com".to_string(),
            secret_notes: None,
            discount: Discount::default(),
            items: vec![LineItemInput {
                id: None,
                description: "Extra".to_string(),
                price: Decimal::ONE,
            }],
        };
        let error =
            h.service.edit_draft(&ctx(), h.owner, quote.id, edit).await.expect_err("not draft");
        assert_eq!(error.kind(), ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn missing_quote_is_not_found() {
        let h = harness().await;
        let error = h.service.sanction(&ctx(), QuoteId(404)).await.expect_err("missing");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
