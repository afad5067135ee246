pub mod associates;
pub mod quotes;
pub mod settlement;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::quote::Quote;
use crate::domain::settlement::SettlementReceipt;
use crate::ports::NotificationError;

pub use associates::AssociateService;
pub use quotes::QuoteService;
pub use settlement::{OrderReferences, SettlementOrchestrator};

/// Outcome of the post-commit notification. A failure never reverts the commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed { reason: String },
}

impl NotificationStatus {
    pub fn from_result(result: Result<(), NotificationError>) -> Self {
        match result {
            Ok(()) => Self::Sent,
            Err(error) => Self::Failed { reason: error.to_string() },
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    pub fn warning(&self) -> Option<String> {
        match self {
            Self::Sent => None,
            Self::Failed { reason } => Some(format!("committed, but notification failed: {reason}")),
        }
    }
}

/// A committed result plus how the follow-up notification went.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notified<T> {
    pub value: T,
    pub notification: NotificationStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PurchaseOrder {
    pub quote: Quote,
    pub receipt: SettlementReceipt,
    pub commission: Decimal,
}
