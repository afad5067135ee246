use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use quotedesk_core::audit::{AuditContext, InMemoryAuditSink};
use quotedesk_core::domain::associate::AssociateId;
use quotedesk_core::domain::customer::CustomerId;
use quotedesk_core::domain::quote::{Discount, NewLineItem, QuoteId, QuoteStatus};
use quotedesk_core::domain::settlement::SettlementReply;
use quotedesk_core::errors::ErrorKind;
use quotedesk_core::lifecycle::QuoteDraft;
use quotedesk_core::ports::memory::{RecordingNotifier, ScriptedSettlementGateway};
use quotedesk_core::ports::{AssociateRepository, QuoteStore, SystemClock};
use quotedesk_core::services::{QuoteService, SettlementOrchestrator};
use quotedesk_db::{
    connect_with_settings, migrations, DbPool, DemoSeedDataset, SqlAssociateRepository,
    SqlCustomerDirectory, SqlQuoteStore,
};

async fn seeded_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    DemoSeedDataset::load(&pool).await.expect("seed");
    pool
}

fn orchestrator(pool: &DbPool, gateway: ScriptedSettlementGateway) -> SettlementOrchestrator {
    SettlementOrchestrator::new(
        Arc::new(SqlQuoteStore::new(pool.clone())),
        Arc::new(gateway),
        Arc::new(RecordingNotifier::default()),
        Arc::new(SystemClock),
        Arc::new(InMemoryAuditSink::default()),
        Duration::from_secs(2),
    )
}

async fn commission_of(pool: &DbPool, id: AssociateId) -> Decimal {
    SqlAssociateRepository::new(pool.clone())
        .find(id)
        .await
        .expect("find associate")
        .expect("associate exists")
        .accumulated_commission
}

fn ctx() -> AuditContext {
    AuditContext::new(None, "it-settlement", "orders-desk")
}

#[tokio::test]
async fn processing_sanctioned_quote_books_order_and_credits_commission() {
    let pool = seeded_pool().await;
    let lpark = AssociateId(2);
    assert_eq!(commission_of(&pool, lpark).await, Decimal::new(72, 0));

    let gateway = ScriptedSettlementGateway::with_replies([Ok(SettlementReply::booked(
        "10%",
        "2024-01-01T00:00:00Z",
    ))]);
    let order = orchestrator(&pool, gateway)
        .process_order(&ctx(), QuoteId(7), Decimal::new(50, 0))
        .await
        .expect("order processed");

    assert_eq!(order.value.commission, Decimal::new(45, 0));

    let stored = SqlQuoteStore::new(pool.clone()).find(QuoteId(7)).await.expect("find").expect("q");
    assert_eq!(stored.status, QuoteStatus::Ordered);
    let settlement = stored.settlement.expect("settlement columns set");
    assert_eq!(settlement.final_amount, Decimal::new(450, 0));
    assert_eq!(settlement.final_discount, Decimal::new(50, 0));
    assert_eq!(settlement.commission_rate, Decimal::new(10, 0));
    assert!(settlement.order_reference.starts_with("PO-7-"));
    assert_eq!(commission_of(&pool, lpark).await, Decimal::new(117, 0));
}

#[tokio::test]
async fn rejected_order_leaves_quote_sanctioned_and_balance_unchanged() {
    let pool = seeded_pool().await;
    let gateway = ScriptedSettlementGateway::with_replies([Ok(SettlementReply::rejected(&[
        "credit limit exceeded",
    ]))]);

    let error = orchestrator(&pool, gateway)
        .process_order(&ctx(), QuoteId(7), Decimal::ZERO)
        .await
        .expect_err("rejected");
    assert_eq!(error.kind(), ErrorKind::ExternalSystem);

    let stored = SqlQuoteStore::new(pool.clone()).find(QuoteId(7)).await.expect("find").expect("q");
    assert_eq!(stored.status, QuoteStatus::Sanctioned);
    assert!(stored.settlement.is_none());
    assert_eq!(commission_of(&pool, AssociateId(2)).await, Decimal::new(72, 0));
}

#[tokio::test]
async fn concurrent_orders_for_one_quote_credit_commission_once() {
    let pool = seeded_pool().await;
    let gateway = ScriptedSettlementGateway::with_replies([
        Ok(SettlementReply::booked("10%", "2024-01-01T00:00:00Z")),
        Ok(SettlementReply::booked("10%", "2024-01-01T00:00:01Z")),
    ])
    .delayed(Duration::from_millis(50));
    let orchestrator = orchestrator(&pool, gateway);

    let (first_ctx, second_ctx) = (ctx(), ctx());
    let (first, second) = tokio::join!(
        orchestrator.process_order(&first_ctx, QuoteId(7), Decimal::ZERO),
        orchestrator.process_order(&second_ctx, QuoteId(7), Decimal::ZERO),
    );

    let outcomes = [first.is_ok(), second.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1, "exactly one order may commit");
    let loser = first.err().or(second.err()).expect("one failure");
    assert_eq!(loser.kind(), ErrorKind::ConcurrentModification);
    assert_eq!(commission_of(&pool, AssociateId(2)).await, Decimal::new(122, 0));
}

#[tokio::test]
async fn full_lifecycle_from_draft_to_order() {
    let pool = seeded_pool().await;
    let store = Arc::new(SqlQuoteStore::new(pool.clone()));
    let notifier = Arc::new(RecordingNotifier::default());
    let quotes = QuoteService::new(
        store.clone(),
        Arc::new(SqlAssociateRepository::new(pool.clone())),
        Arc::new(SqlCustomerDirectory::new(pool.clone())),
        notifier.clone(),
        Arc::new(SystemClock),
        Arc::new(InMemoryAuditSink::default()),
    );
    let dreyes = AssociateId(1);

    let draft = quotes
        .create(
            &ctx(),
            dreyes,
            QuoteDraft {
                customer_id: CustomerId(43),
                email: "orders@tidewater.example".to_string(),
                secret_notes: Some("seasonal buyer".to_string()),
                discount: Discount::amount(Decimal::new(20, 0)),
                items: vec![NewLineItem {
                    description: "Drip line, 100m".to_string(),
                    price: Decimal::new(22000, 2),
                }],
            },
        )
        .await
        .expect("create");
    assert_eq!(draft.total_amount, Decimal::new(200, 0));

    quotes.submit(&ctx(), dreyes, draft.id).await.expect("submit");
    let sanctioned = quotes.sanction(&ctx(), draft.id).await.expect("sanction");
    assert!(sanctioned.notification.is_sent());

    let gateway = ScriptedSettlementGateway::with_replies([Ok(SettlementReply::booked(
        "5%",
        "2024-03-01T10:00:00Z",
    ))]);
    let order = orchestrator(&pool, gateway)
        .process_order(&ctx(), draft.id, Decimal::ZERO)
        .await
        .expect("order");

    assert_eq!(order.value.quote.status, QuoteStatus::Ordered);
    assert_eq!(order.value.commission, Decimal::new(10, 0));
    assert_eq!(commission_of(&pool, dreyes).await, Decimal::new(10, 0));
}
