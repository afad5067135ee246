use serde::{Deserialize, Serialize};

use crate::domain::quote::QuoteStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteEvent {
    AssociateEdit,
    Submit,
    ReviewEdit,
    Sanction,
    Delete,
    ProcessOrder,
}

impl QuoteEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AssociateEdit => "associate_edit",
            Self::Submit => "submit",
            Self::ReviewEdit => "review_edit",
            Self::Sanction => "sanction",
            Self::Delete => "delete",
            Self::ProcessOrder => "process_order",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub line_item_count: usize,
}

impl FlowContext {
    pub fn with_items(line_item_count: usize) -> Self {
        Self { line_item_count }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleAction {
    ReconcileItems,
    RecomputeTotal,
    SendSanctionNotice,
    BookOrder,
    CreditCommission,
    SendOrderConfirmation,
    CascadeDelete,
}

/// `to` is `None` when the transition removes the quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: QuoteStatus,
    pub to: Option<QuoteStatus>,
    pub event: QuoteEvent,
    pub actions: Vec<LifecycleAction>,
}
