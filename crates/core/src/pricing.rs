use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::quote::{Discount, DiscountKind, LineItem, LineItemInput, NewLineItem};
use crate::errors::DomainError;

/// Anything that carries a price and a description and can sit on a quote.
pub trait Priced {
    fn price(&self) -> Decimal;
    fn description(&self) -> &str;
}

impl Priced for LineItem {
    fn price(&self) -> Decimal {
        self.price
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl Priced for LineItemInput {
    fn price(&self) -> Decimal {
        self.price
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl Priced for NewLineItem {
    fn price(&self) -> Decimal {
        self.price
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Largest price a single line item may carry (DECIMAL(10,2)).
pub fn max_line_price() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

pub fn subtotal<P: Priced>(items: &[P]) -> Result<Decimal, DomainError> {
    items.iter().try_fold(Decimal::ZERO, |sum, item| {
        sum.checked_add(item.price()).ok_or_else(|| overflow("subtotal"))
    })
}

pub fn discount_amount(subtotal: Decimal, discount: &Discount) -> Result<Decimal, DomainError> {
    match discount.kind {
        DiscountKind::Amount => Ok(discount.value),
        DiscountKind::Percentage => subtotal
            .checked_mul(discount.value)
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| overflow("discount")),
    }
}

/// Full precision internally; rounding happens once, on the way out.
pub fn price_items<P: Priced>(
    items: &[P],
    discount: &Discount,
) -> Result<PricingBreakdown, DomainError> {
    let subtotal = subtotal(items)?;
    let discount_amount = discount_amount(subtotal, discount)?;
    let total = subtotal.checked_sub(discount_amount).ok_or_else(|| overflow("total"))?;

    Ok(PricingBreakdown {
        subtotal: round_money(subtotal),
        discount_amount: round_money(discount_amount),
        total: round_money(total.max(Decimal::ZERO)),
    })
}

pub fn compute_total<P: Priced>(items: &[P], discount: &Discount) -> Result<Decimal, DomainError> {
    Ok(price_items(items, discount)?.total)
}

fn overflow(what: &str) -> DomainError {
    DomainError::Validation(format!("{what} is too large to price"))
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn format_money(value: Decimal) -> String {
    let mut rounded = round_money(value);
    rounded.rescale(2);
    rounded.to_string()
}

pub fn validate_line_items<P: Priced>(items: &[P]) -> Result<(), DomainError> {
    if items.is_empty() {
        return Err(DomainError::Validation("a quote needs at least one line item".to_string()));
    }

    for (index, item) in items.iter().enumerate() {
        if item.description().trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "line item {} has an empty description",
                index + 1
            )));
        }
        let price = item.price();
        if price < Decimal::ZERO || price > max_line_price() {
            return Err(DomainError::Validation(format!(
                "line item {} price {price} is outside 0..={}",
                index + 1,
                max_line_price()
            )));
        }
    }
    Ok(())
}

pub fn validate_discount(discount: &Discount) -> Result<(), DomainError> {
    if discount.value < Decimal::ZERO {
        return Err(DomainError::Validation(format!(
            "discount {} must not be negative",
            discount.value
        )));
    }
    if discount.kind == DiscountKind::Percentage && discount.value > Decimal::ONE_HUNDRED {
        return Err(DomainError::Validation(format!(
            "percentage discount {} must not exceed 100",
            discount.value
        )));
    }
    Ok(())
}
