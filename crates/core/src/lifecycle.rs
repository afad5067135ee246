//! Quote lifecycle operations as pure functions.
//!
//! Each operation checks the transition, validates its input and returns the next quote value
//! together with the row-level effects a [`QuoteStore`](crate::ports::QuoteStore) must apply in
//! one transaction. Nothing here performs I/O.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::associate::AssociateId;
use crate::domain::customer::CustomerId;
use crate::domain::quote::{
    Discount, LineItem, LineItemId, LineItemInput, NewLineItem, NewQuote, OrderSettlement, Quote,
    QuoteId, QuoteStatus,
};
use crate::domain::settlement::{OrderRequest, SettlementReceipt};
use crate::errors::DomainError;
use crate::flows::{FlowContext, QuoteEvent, QuoteLifecycle, TransitionOutcome};
use crate::pricing::{compute_total, round_money, validate_discount, validate_line_items};
use crate::reconcile::{reconcile, ReconciliationPlan};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDraft {
    pub customer_id: CustomerId,
    pub email: String,
    #[serde(default)]
    pub secret_notes: Option<String>,
    #[serde(default)]
    pub discount: Discount,
    pub items: Vec<NewLineItem>,
}

/// Full replacement of the editable part of a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteEdit {
    pub email: String,
    #[serde(default)]
    pub secret_notes: Option<String>,
    #[serde(default)]
    pub discount: Discount,
    pub items: Vec<LineItemInput>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistenceEffect {
    /// Write the quote header, guarded on the version and status that were loaded.
    UpdateQuote { expected_version: i64, expected_status: QuoteStatus },
    InsertLineItem(NewLineItem),
    UpdateLineItem(LineItem),
    DeleteLineItem(LineItemId),
    DeleteQuote { expected_version: i64 },
    CreditCommission { associate_id: AssociateId, amount: Decimal },
}

/// The next value of a quote plus the effects that produce it. `quote.items` lists the
/// surviving persisted rows; inserted rows only get ids once the store applies the effects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteMutation {
    pub quote: Quote,
    pub transition: TransitionOutcome,
    pub effects: Vec<PersistenceEffect>,
}

impl QuoteMutation {
    pub fn quote_id(&self) -> QuoteId {
        self.quote.id
    }

    pub fn removes_quote(&self) -> bool {
        self.transition.to.is_none()
    }
}

/// A validated process-order request, ready to be sent to the settlement system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedOrder {
    pub quote_id: QuoteId,
    pub expected_version: i64,
    pub final_discount: Decimal,
    pub final_amount: Decimal,
    pub request: OrderRequest,
}

pub fn create_quote(
    associate_id: AssociateId,
    draft: QuoteDraft,
    now: DateTime<Utc>,
) -> Result<NewQuote, DomainError> {
    validate_email(&draft.email)?;
    validate_line_items(&draft.items)?;
    validate_discount(&draft.discount)?;

    let total_amount = compute_total(&draft.items, &draft.discount)?;
    Ok(NewQuote {
        customer_id: draft.customer_id,
        associate_id,
        email: draft.email.trim().to_string(),
        secret_notes: normalize_notes(draft.secret_notes),
        discount: draft.discount,
        total_amount,
        items: draft
            .items
            .into_iter()
            .map(|item| NewLineItem { description: item.description.trim().to_string(), ..item })
            .collect(),
        created_at: now,
    })
}

pub fn edit_draft(
    quote: &Quote,
    actor: AssociateId,
    edit: QuoteEdit,
    now: DateTime<Utc>,
) -> Result<QuoteMutation, DomainError> {
    ensure_owner(quote, actor)?;
    let transition = QuoteLifecycle.apply(
        quote.status,
        QuoteEvent::AssociateEdit,
        &FlowContext::with_items(edit.items.len()),
    )?;
    apply_edit(quote, edit, transition, now)
}

pub fn edit_under_review(
    quote: &Quote,
    edit: QuoteEdit,
    now: DateTime<Utc>,
) -> Result<QuoteMutation, DomainError> {
    let transition = QuoteLifecycle.apply(
        quote.status,
        QuoteEvent::ReviewEdit,
        &FlowContext::with_items(edit.items.len()),
    )?;
    apply_edit(quote, edit, transition, now)
}

pub fn submit(
    quote: &Quote,
    actor: AssociateId,
    now: DateTime<Utc>,
) -> Result<QuoteMutation, DomainError> {
    ensure_owner(quote, actor)?;
    let transition = QuoteLifecycle.apply(
        quote.status,
        QuoteEvent::Submit,
        &FlowContext::with_items(quote.items.len()),
    )?;
    Ok(header_change(quote, transition, now, |_| {}))
}

pub fn sanction(quote: &Quote, now: DateTime<Utc>) -> Result<QuoteMutation, DomainError> {
    let transition = QuoteLifecycle.apply(
        quote.status,
        QuoteEvent::Sanction,
        &FlowContext::with_items(quote.items.len()),
    )?;
    Ok(header_change(quote, transition, now, |_| {}))
}

/// Line items go first so the quote row is never left without its children.
pub fn delete(quote: &Quote, actor: AssociateId) -> Result<QuoteMutation, DomainError> {
    ensure_owner(quote, actor)?;
    let transition = QuoteLifecycle.apply(
        quote.status,
        QuoteEvent::Delete,
        &FlowContext::with_items(quote.items.len()),
    )?;

    let mut effects: Vec<PersistenceEffect> =
        quote.items.iter().map(|item| PersistenceEffect::DeleteLineItem(item.id)).collect();
    effects.push(PersistenceEffect::DeleteQuote { expected_version: quote.version });

    Ok(QuoteMutation { quote: quote.clone(), transition, effects })
}

pub fn stage_order(
    quote: &Quote,
    final_discount: Decimal,
    order_reference: &str,
) -> Result<StagedOrder, DomainError> {
    QuoteLifecycle.apply(
        quote.status,
        QuoteEvent::ProcessOrder,
        &FlowContext::with_items(quote.items.len()),
    )?;

    if final_discount < Decimal::ZERO || final_discount > quote.total_amount {
        return Err(DomainError::Validation(format!(
            "final discount {final_discount} must be between 0 and the quote total {}",
            quote.total_amount
        )));
    }

    let final_amount = round_money(quote.total_amount - final_discount);
    Ok(StagedOrder {
        quote_id: quote.id,
        expected_version: quote.version,
        final_discount,
        final_amount,
        request: OrderRequest::new(
            order_reference,
            quote.associate_id,
            quote.customer_id,
            final_amount,
        ),
    })
}

/// Produces the single commit that marks the quote ordered and credits the associate.
pub fn settle(
    quote: &Quote,
    staged: &StagedOrder,
    receipt: &SettlementReceipt,
    now: DateTime<Utc>,
) -> Result<QuoteMutation, DomainError> {
    if quote.id != staged.quote_id || quote.version != staged.expected_version {
        return Err(DomainError::InvariantViolation(format!(
            "staged order for quote {} v{} does not match quote {} v{}",
            staged.quote_id, staged.expected_version, quote.id, quote.version
        )));
    }
    let transition = QuoteLifecycle.apply(
        quote.status,
        QuoteEvent::ProcessOrder,
        &FlowContext::with_items(quote.items.len()),
    )?;

    let commission = commission_for(staged.final_amount, receipt.commission_rate)?;
    let mut mutation = header_change(quote, transition, now, |next| {
        next.settlement = Some(OrderSettlement {
            order_reference: receipt.order_reference.clone(),
            final_discount: staged.final_discount,
            final_amount: staged.final_amount,
            commission_rate: receipt.commission_rate,
            processing_date: receipt.processing_date,
        });
    });
    mutation
        .effects
        .push(PersistenceEffect::CreditCommission { associate_id: quote.associate_id, amount: commission });
    Ok(mutation)
}

pub fn commission_for(final_amount: Decimal, rate: Decimal) -> Result<Decimal, DomainError> {
    final_amount
        .checked_mul(rate)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .map(round_money)
        .ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "commission at {rate}% of {final_amount} cannot be represented"
            ))
        })
}

fn apply_edit(
    quote: &Quote,
    edit: QuoteEdit,
    transition: TransitionOutcome,
    now: DateTime<Utc>,
) -> Result<QuoteMutation, DomainError> {
    validate_email(&edit.email)?;
    validate_line_items(&edit.items)?;
    validate_discount(&edit.discount)?;

    let items: Vec<LineItemInput> = edit
        .items
        .into_iter()
        .map(|item| LineItemInput { description: item.description.trim().to_string(), ..item })
        .collect();
    let total_amount = compute_total(&items, &edit.discount)?;
    let ReconciliationPlan { updates, inserts, deletes } = reconcile(&quote.items, &items);

    let mut mutation = header_change(quote, transition, now, |next| {
        next.email = edit.email.trim().to_string();
        next.secret_notes = normalize_notes(edit.secret_notes);
        next.discount = edit.discount;
        next.total_amount = total_amount;
        next.items = quote
            .items
            .iter()
            .filter(|item| !deletes.contains(&item.id))
            .map(|item| {
                updates.iter().find(|updated| updated.id == item.id).unwrap_or(item).clone()
            })
            .collect();
    });

    mutation.effects.extend(deletes.into_iter().map(PersistenceEffect::DeleteLineItem));
    mutation.effects.extend(updates.into_iter().map(PersistenceEffect::UpdateLineItem));
    mutation.effects.extend(inserts.into_iter().map(PersistenceEffect::InsertLineItem));
    Ok(mutation)
}

fn header_change(
    quote: &Quote,
    transition: TransitionOutcome,
    now: DateTime<Utc>,
    change: impl FnOnce(&mut Quote),
) -> QuoteMutation {
    let mut next = quote.clone();
    change(&mut next);
    if let Some(status) = transition.to {
        next.status = status;
    }
    next.updated_at = now;

    QuoteMutation {
        quote: next,
        effects: vec![PersistenceEffect::UpdateQuote {
            expected_version: quote.version,
            expected_status: quote.status,
        }],
        transition,
    }
}

fn ensure_owner(quote: &Quote, actor: AssociateId) -> Result<(), DomainError> {
    if quote.is_owned_by(actor) {
        Ok(())
    } else {
        Err(DomainError::NotOwner { actor, quote_id: quote.id })
    }
}

fn validate_email(email: &str) -> Result<(), DomainError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(DomainError::Validation(format!("`{email}` is not a usable email address")));
    }
    Ok(())
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.map(|notes| notes.trim().to_string()).filter(|notes| !notes.is_empty())
}
