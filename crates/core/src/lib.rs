pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod lifecycle;
pub mod ports;
pub mod pricing;
pub mod reconcile;
pub mod services;

pub use audit::{AuditContext, AuditEvent, AuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigOverrides, LoadOptions};
pub use domain::associate::{Associate, AssociateId, AssociateProfile, NewAssociate};
pub use domain::customer::{Customer, CustomerId};
pub use domain::quote::{
    CustomerQuoteView, Discount, DiscountKind, LineItem, LineItemId, LineItemInput, NewLineItem,
    Quote, QuoteId, QuoteStatus,
};
pub use domain::settlement::{OrderRequest, SettlementReceipt, SettlementReply};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
pub use flows::{QuoteEvent, QuoteLifecycle};
pub use lifecycle::{QuoteDraft, QuoteEdit, QuoteMutation};
pub use ports::{
    AssociateRepository, Clock, CustomerDirectory, Notifier, QuoteFilter, QuoteStore,
    SettlementGateway, SystemClock,
};
pub use services::{
    AssociateService, NotificationStatus, Notified, PurchaseOrder, QuoteService,
    SettlementOrchestrator,
};
