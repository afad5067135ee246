use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::associate::AssociateId;
use crate::domain::customer::CustomerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub i64);

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Submitted,
    Unresolved,
    Sanctioned,
    Ordered,
}

impl QuoteStatus {
    pub const ALL: [QuoteStatus; 5] =
        [Self::Draft, Self::Submitted, Self::Unresolved, Self::Sanctioned, Self::Ordered];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Unresolved => "unresolved",
            Self::Sanctioned => "sanctioned",
            Self::Ordered => "ordered",
        }
    }

    /// `finalized` shows up in older admin tooling but was never a real status, so it is
    /// rejected here like any other unknown value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "unresolved" => Some(Self::Unresolved),
            "sanctioned" => Some(Self::Sanctioned),
            "ordered" => Some(Self::Ordered),
            _ => None,
        }
    }

    /// Submitted and unresolved quotes are both "under review" and behave identically for
    /// every downstream transition.
    pub fn is_under_review(&self) -> bool {
        matches!(self, Self::Submitted | Self::Unresolved)
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    #[default]
    Amount,
    Percentage,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Percentage => "percentage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "amount" => Some(Self::Amount),
            "percentage" => Some(Self::Percentage),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub kind: DiscountKind,
    pub value: Decimal,
}

impl Discount {
    pub fn amount(value: Decimal) -> Self {
        Self { kind: DiscountKind::Amount, value }
    }

    pub fn percentage(value: Decimal) -> Self {
        Self { kind: DiscountKind::Percentage, value }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub description: String,
    pub price: Decimal,
}

/// A line item as submitted by a caller. `id` refers to a persisted item when present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    #[serde(default)]
    pub id: Option<LineItemId>,
    pub description: String,
    pub price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub description: String,
    pub price: Decimal,
}

/// Booking details written once, together with the move to `Ordered`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettlement {
    pub order_reference: String,
    pub final_discount: Decimal,
    pub final_amount: Decimal,
    pub commission_rate: Decimal,
    pub processing_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub customer_id: CustomerId,
    pub associate_id: AssociateId,
    pub email: String,
    pub secret_notes: Option<String>,
    pub status: QuoteStatus,
    pub discount: Discount,
    pub total_amount: Decimal,
    pub settlement: Option<OrderSettlement>,
    pub items: Vec<LineItem>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quote {
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(|item| item.price).sum()
    }

    pub fn is_owned_by(&self, associate_id: AssociateId) -> bool {
        self.associate_id == associate_id
    }
}

/// A quote that has not been persisted yet; ids are assigned by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuote {
    pub customer_id: CustomerId,
    pub associate_id: AssociateId,
    pub email: String,
    pub secret_notes: Option<String>,
    pub discount: Discount,
    pub total_amount: Decimal,
    pub items: Vec<NewLineItem>,
    pub created_at: DateTime<Utc>,
}

/// Customer-facing projection of a quote. Carries no secret notes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomerQuoteView {
    pub quote_id: QuoteId,
    pub associate_id: AssociateId,
    pub email: String,
    pub status: QuoteStatus,
    pub discount: Discount,
    pub items: Vec<LineItem>,
    pub total_amount: Decimal,
    pub settlement: Option<OrderSettlement>,
}

impl From<&Quote> for CustomerQuoteView {
    fn from(quote: &Quote) -> Self {
        Self {
            quote_id: quote.id,
            associate_id: quote.associate_id,
            email: quote.email.clone(),
            status: quote.status,
            discount: quote.discount,
            items: quote.items.clone(),
            total_amount: quote.total_amount,
            settlement: quote.settlement.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        CustomerQuoteView, Discount, LineItem, LineItemId, Quote, QuoteId, QuoteStatus,
    };
    use crate::domain::{associate::AssociateId, customer::CustomerId};

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in QuoteStatus::ALL {
            assert_eq!(QuoteStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn finalized_is_not_a_status() {
        assert_eq!(QuoteStatus::parse("finalized"), None);
    }

    #[test]
    fn customer_view_drops_secret_notes() {
        let now = Utc::now();
        let quote = Quote {
            id: QuoteId(3),
            customer_id: CustomerId(12),
            associate_id: AssociateId(1),
            email: "buyer@example.com".to_string(),
            secret_notes: Some("will accept 20% off".to_string()),
            status: QuoteStatus::Sanctioned,
            discount: Discount::percentage(Decimal::new(5, 0)),
            total_amount: Decimal::new(9500, 2),
            settlement: None,
            items: vec![LineItem {
                id: LineItemId(1),
                description: "Gear housing".to_string(),
                price: Decimal::new(10000, 2),
            }],
            version: 4,
            created_at: now,
            updated_at: now,
        };

        let view = CustomerQuoteView::from(&quote);
        let rendered = serde_json::to_string(&view).expect("serialize view");

        assert!(!rendered.contains("will accept 20% off"));
        assert_eq!(view.items.len(), 1);
        assert_eq!(quote.subtotal(), Decimal::new(10000, 2));
    }
}
