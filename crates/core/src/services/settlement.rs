use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::quote::QuoteId;
use crate::domain::settlement::{order_reference, SettlementReceipt};
use crate::errors::ApplicationError;
use crate::lifecycle::{self, commission_for, StagedOrder};
use crate::ports::{Clock, GatewayError, Notifier, QuoteStore, SettlementGateway};
use crate::services::{NotificationStatus, Notified, PurchaseOrder};

/// Hands out strictly increasing millisecond stamps so two orders for the same quote never
/// share a reference, even inside one millisecond.
#[derive(Debug, Default)]
pub struct OrderReferences {
    last: AtomicI64,
}

impl OrderReferences {
    pub fn next(&self, quote_id: QuoteId, now_millis: i64) -> String {
        let mut current = self.last.load(Ordering::SeqCst);
        loop {
            let candidate = now_millis.max(current + 1);
            match self.last.compare_exchange(current, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return order_reference(quote_id, candidate),
                Err(observed) => current = observed,
            }
        }
    }
}

/// Books a sanctioned quote with the settlement system and records the result locally.
///
/// No lock or transaction is held across the external call. The quote is staged against the
/// version that was read, the order is booked, and a short guarded commit moves the quote to
/// `ordered` and credits the associate. If the guard fails after the booking succeeded the
/// order reference is logged so it can be reconciled by hand.
pub struct SettlementOrchestrator {
    store: Arc<dyn QuoteStore>,
    gateway: Arc<dyn SettlementGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
    references: OrderReferences,
}

impl SettlementOrchestrator {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        gateway: Arc<dyn SettlementGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
            audit,
            timeout,
            references: OrderReferences::default(),
        }
    }

    pub async fn process_order(
        &self,
        ctx: &AuditContext,
        quote_id: QuoteId,
        final_discount: Decimal,
    ) -> Result<Notified<PurchaseOrder>, ApplicationError> {
        let ctx = ctx.for_quote(quote_id);
        let quote = self
            .store
            .find(quote_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("quote", quote_id))?;

        let reference = self.references.next(quote_id, self.clock.now().timestamp_millis());
        let staged = match lifecycle::stage_order(&quote, final_discount, &reference) {
            Ok(staged) => staged,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::new(
                        &ctx,
                        "settlement.rejected",
                        AuditCategory::Settlement,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        info!(
            event_name = "settlement.booking_started",
            correlation_id = %ctx.correlation_id,
            quote_id = quote_id.0,
            order_reference = %reference,
            amount = %staged.request.amount,
            "booking order with settlement system"
        );

        let receipt = match self.book(&staged).await {
            Ok(receipt) => receipt,
            Err(error) => {
                warn!(
                    event_name = "settlement.booking_failed",
                    correlation_id = %ctx.correlation_id,
                    quote_id = quote_id.0,
                    order_reference = %reference,
                    error = %error,
                    "settlement booking failed; quote left sanctioned"
                );
                self.audit.emit(
                    AuditEvent::new(
                        &ctx,
                        "settlement.booking_failed",
                        AuditCategory::Settlement,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("order_reference", reference.clone())
                    .with_metadata("error", error.to_string()),
                );
                return Err(error);
            }
        };

        let settled = commission_for(staged.final_amount, receipt.commission_rate).and_then(
            |commission| {
                lifecycle::settle(&quote, &staged, &receipt, self.clock.now())
                    .map(|mutation| (commission, mutation))
            },
        );
        let (commission, mutation) = match settled {
            Ok(settled) => settled,
            Err(error) => {
                return Err(self.unrecorded_booking(&ctx, &receipt.order_reference, error.into()))
            }
        };
        let transition = mutation.transition.clone();
        let committed = match self.store.commit(mutation).await {
            Ok(Some(committed)) => committed,
            Ok(None) => {
                return Err(self.unrecorded_booking(
                    &ctx,
                    &receipt.order_reference,
                    ApplicationError::Persistence(format!("quote {quote_id} vanished during commit")),
                ))
            }
            Err(store_error) => {
                return Err(self.unrecorded_booking(
                    &ctx,
                    &receipt.order_reference,
                    ApplicationError::from(store_error),
                ))
            }
        };

        self.audit.emit(transition.audit_event(&ctx));
        self.audit.emit(
            AuditEvent::new(&ctx, "settlement.booked", AuditCategory::Settlement, AuditOutcome::Success)
                .with_metadata("order_reference", receipt.order_reference.clone())
                .with_metadata("final_amount", staged.final_amount.to_string())
                .with_metadata("commission_rate", receipt.commission_rate.to_string())
                .with_metadata("commission", commission.to_string()),
        );
        info!(
            event_name = "settlement.order_recorded",
            correlation_id = %ctx.correlation_id,
            quote_id = quote_id.0,
            order_reference = %receipt.order_reference,
            commission = %commission,
            "quote ordered and commission credited"
        );

        let notification = NotificationStatus::from_result(
            self.notifier.send_order_confirmation(&committed, &receipt).await,
        );
        if let NotificationStatus::Failed { reason } = &notification {
            warn!(
                event_name = "notification.failed",
                correlation_id = %ctx.correlation_id,
                quote_id = quote_id.0,
                notice = "order_confirmation",
                reason = %reason,
                "order confirmation failed after commit"
            );
        }
        self.audit.emit(
            AuditEvent::new(
                &ctx,
                if notification.is_sent() { "notification.sent" } else { "notification.failed" },
                AuditCategory::Notification,
                if notification.is_sent() { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("notice", "order_confirmation"),
        );

        Ok(Notified { value: PurchaseOrder { quote: committed, receipt, commission }, notification })
    }

    async fn book(
        &self,
        staged: &StagedOrder,
    ) -> Result<SettlementReceipt, ApplicationError> {
        let reply = tokio::time::timeout(self.timeout, self.gateway.submit(&staged.request))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout.as_secs()))??;
        Ok(reply.interpret(&staged.request.order)?)
    }

    fn unrecorded_booking(
        &self,
        ctx: &AuditContext,
        order_reference: &str,
        cause: ApplicationError,
    ) -> ApplicationError {
        error!(
            event_name = "settlement.unrecorded_booking",
            correlation_id = %ctx.correlation_id,
            quote_id = ?ctx.quote_id.map(|id| id.0),
            order_reference = %order_reference,
            error = %cause,
            "order booked with settlement system but local commit failed; reconcile manually"
        );
        self.audit.emit(
            AuditEvent::new(
                ctx,
                "settlement.unrecorded_booking",
                AuditCategory::Persistence,
                AuditOutcome::Failed,
            )
            .with_metadata("order_reference", order_reference)
            .with_metadata("error", cause.to_string()),
        );
        cause
    }
}
