use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use quotedesk_core::domain::associate::AssociateId;
use quotedesk_core::domain::customer::CustomerId;
use quotedesk_core::domain::quote::{
    Discount, DiscountKind, LineItem, LineItemId, NewLineItem, NewQuote, OrderSettlement, Quote,
    QuoteId, QuoteStatus,
};
use quotedesk_core::lifecycle::{PersistenceEffect, QuoteMutation};
use quotedesk_core::ports::{QuoteFilter, QuoteStore, StoreError};

use super::{
    format_timestamp, parse_decimal, parse_optional_decimal, parse_optional_timestamp,
    parse_timestamp, RepositoryError,
};
use crate::DbPool;

const QUOTE_COLUMNS: &str = "id, customer_id, associate_id, email, secret_notes, status, discount,
    discount_type, total_amount, order_reference, final_discount, final_amount, commission_rate,
    processing_date, version, created_at, updated_at";

pub struct SqlQuoteStore {
    pool: DbPool,
}

impl SqlQuoteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, quote: NewQuote) -> Result<Quote, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let created_at = format_timestamp(quote.created_at);
        let result = sqlx::query(
            "INSERT INTO quote (customer_id, associate_id, email, secret_notes, status, discount,
                                discount_type, total_amount, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(quote.customer_id.0)
        .bind(quote.associate_id.0)
        .bind(&quote.email)
        .bind(&quote.secret_notes)
        .bind(QuoteStatus::Draft.as_str())
        .bind(quote.discount.value.to_string())
        .bind(quote.discount.kind.as_str())
        .bind(quote.total_amount.to_string())
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        let id = QuoteId(result.last_insert_rowid());
        for item in &quote.items {
            insert_line_item(&mut tx, id, item).await?;
        }

        let stored = load_quote(&mut tx, id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("quote {id} vanished before its insert committed"))
        })?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn apply(&self, mutation: &QuoteMutation) -> Result<Option<Quote>, RepositoryError> {
        let id = mutation.quote.id;
        let mut tx = self.pool.begin().await?;

        for effect in &mutation.effects {
            match effect {
                PersistenceEffect::UpdateQuote { expected_version, expected_status } => {
                    update_header(&mut tx, &mutation.quote, *expected_version, *expected_status)
                        .await?;
                }
                PersistenceEffect::InsertLineItem(item) => {
                    insert_line_item(&mut tx, id, item).await?;
                }
                PersistenceEffect::UpdateLineItem(item) => {
                    let result = sqlx::query(
                        "UPDATE line_item SET description = ?, price = ?
                         WHERE id = ? AND quote_id = ?",
                    )
                    .bind(&item.description)
                    .bind(item.price.to_string())
                    .bind(item.id.0)
                    .bind(id.0)
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(RepositoryError::Conflict(id));
                    }
                }
                PersistenceEffect::DeleteLineItem(item_id) => {
                    sqlx::query("DELETE FROM line_item WHERE id = ? AND quote_id = ?")
                        .bind(item_id.0)
                        .bind(id.0)
                        .execute(&mut *tx)
                        .await?;
                }
                PersistenceEffect::DeleteQuote { expected_version } => {
                    let result = sqlx::query("DELETE FROM quote WHERE id = ? AND version = ?")
                        .bind(id.0)
                        .bind(expected_version)
                        .execute(&mut *tx)
                        .await?;
                    if result.rows_affected() == 0 {
                        return Err(RepositoryError::Conflict(id));
                    }
                }
                PersistenceEffect::CreditCommission { associate_id, amount } => {
                    credit_commission(&mut tx, *associate_id, *amount).await?;
                }
            }
        }

        let persisted = load_quote(&mut tx, id).await?;
        tx.commit().await?;
        Ok(persisted)
    }

    async fn select(&self, filter: &QuoteFilter) -> Result<Vec<Quote>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;

        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE 1 = 1"));
        if !filter.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut statuses = builder.separated(", ");
            for status in &filter.statuses {
                statuses.push_bind(status.as_str());
            }
            statuses.push_unseparated(")");
        }
        if let Some(associate_id) = filter.associate_id {
            builder.push(" AND associate_id = ").push_bind(associate_id.0);
        }
        if let Some(customer_id) = filter.customer_id {
            builder.push(" AND customer_id = ").push_bind(customer_id.0);
        }
        if let Some(from) = filter.created_from {
            builder.push(" AND created_at >= ").push_bind(format_timestamp(from));
        }
        if let Some(to) = filter.created_to {
            builder.push(" AND created_at <= ").push_bind(format_timestamp(to));
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&mut *conn).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut items_by_quote: HashMap<i64, Vec<LineItem>> = HashMap::new();
        let mut items_query = QueryBuilder::<Sqlite>::new(
            "SELECT id, quote_id, description, price FROM line_item WHERE quote_id IN (",
        );
        let mut ids = items_query.separated(", ");
        for row in &rows {
            ids.push_bind(row.try_get::<i64, _>("id")?);
        }
        ids.push_unseparated(") ORDER BY id");
        for row in items_query.build().fetch_all(&mut *conn).await? {
            let quote_id: i64 = row.try_get("quote_id")?;
            items_by_quote.entry(quote_id).or_default().push(row_to_line_item(&row)?);
        }

        rows.iter()
            .map(|row| {
                let id: i64 = row.try_get("id")?;
                row_to_quote(row, items_by_quote.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

#[async_trait]
impl QuoteStore for SqlQuoteStore {
    async fn find(&self, id: QuoteId) -> Result<Option<Quote>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(RepositoryError::from)?;
        Ok(load_quote(&mut conn, id).await?)
    }

    async fn insert_new(&self, quote: NewQuote) -> Result<Quote, StoreError> {
        Ok(self.insert(quote).await?)
    }

    async fn commit(&self, mutation: QuoteMutation) -> Result<Option<Quote>, StoreError> {
        Ok(self.apply(&mutation).await?)
    }

    async fn search(&self, filter: &QuoteFilter) -> Result<Vec<Quote>, StoreError> {
        Ok(self.select(filter).await?)
    }
}

async fn load_quote(
    conn: &mut SqliteConnection,
    id: QuoteId,
) -> Result<Option<Quote>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let items = sqlx::query(
        "SELECT id, quote_id, description, price FROM line_item WHERE quote_id = ? ORDER BY id",
    )
    .bind(id.0)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(row_to_line_item)
    .collect::<Result<Vec<_>, _>>()?;

    row_to_quote(&row, items).map(Some)
}

/// Only the header columns a lifecycle step may change are written. The version and status
/// guard turns a lost race into [`RepositoryError::Conflict`].
async fn update_header(
    conn: &mut SqliteConnection,
    quote: &Quote,
    expected_version: i64,
    expected_status: QuoteStatus,
) -> Result<(), RepositoryError> {
    let settlement = quote.settlement.as_ref();
    let result = sqlx::query(
        "UPDATE quote SET
             email = ?, secret_notes = ?, status = ?, discount = ?, discount_type = ?,
             total_amount = ?, order_reference = ?, final_discount = ?, final_amount = ?,
             commission_rate = ?, processing_date = ?, updated_at = ?, version = version + 1
         WHERE id = ? AND version = ? AND status = ?",
    )
    .bind(&quote.email)
    .bind(&quote.secret_notes)
    .bind(quote.status.as_str())
    .bind(quote.discount.value.to_string())
    .bind(quote.discount.kind.as_str())
    .bind(quote.total_amount.to_string())
    .bind(settlement.map(|s| s.order_reference.clone()))
    .bind(settlement.map(|s| s.final_discount.to_string()))
    .bind(settlement.map(|s| s.final_amount.to_string()))
    .bind(settlement.map(|s| s.commission_rate.to_string()))
    .bind(settlement.map(|s| format_timestamp(s.processing_date)))
    .bind(format_timestamp(quote.updated_at))
    .bind(quote.id.0)
    .bind(expected_version)
    .bind(expected_status.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(quote.id));
    }
    Ok(())
}

async fn insert_line_item(
    conn: &mut SqliteConnection,
    quote_id: QuoteId,
    item: &NewLineItem,
) -> Result<(), RepositoryError> {
    sqlx::query("INSERT INTO line_item (quote_id, description, price) VALUES (?, ?, ?)")
        .bind(quote_id.0)
        .bind(&item.description)
        .bind(item.price.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Read-modify-write of the balance. Runs after the guarded quote update, which already holds
/// SQLite's write lock for this transaction.
async fn credit_commission(
    conn: &mut SqliteConnection,
    associate_id: AssociateId,
    amount: Decimal,
) -> Result<(), RepositoryError> {
    let current: Option<String> =
        sqlx::query_scalar("SELECT accumulated_commission FROM associate WHERE id = ?")
            .bind(associate_id.0)
            .fetch_optional(&mut *conn)
            .await?;
    let current = current.ok_or(RepositoryError::Database(sqlx::Error::RowNotFound))?;
    let balance = parse_decimal("accumulated_commission", &current)? + amount;

    sqlx::query("UPDATE associate SET accumulated_commission = ? WHERE id = ?")
        .bind(balance.to_string())
        .bind(associate_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn row_to_line_item(row: &SqliteRow) -> Result<LineItem, RepositoryError> {
    let price: String = row.try_get("price")?;
    Ok(LineItem {
        id: LineItemId(row.try_get("id")?),
        description: row.try_get("description")?,
        price: parse_decimal("price", &price)?,
    })
}

fn row_to_quote(row: &SqliteRow, items: Vec<LineItem>) -> Result<Quote, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = QuoteStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown quote status `{status_raw}`")))?;
    let kind_raw: String = row.try_get("discount_type")?;
    let kind = DiscountKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown discount type `{kind_raw}`")))?;

    let discount: String = row.try_get("discount")?;
    let total_amount: String = row.try_get("total_amount")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Quote {
        id: QuoteId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        associate_id: AssociateId(row.try_get("associate_id")?),
        email: row.try_get("email")?,
        secret_notes: row.try_get("secret_notes")?,
        status,
        discount: Discount { kind, value: parse_decimal("discount", &discount)? },
        total_amount: parse_decimal("total_amount", &total_amount)?,
        settlement: settlement_from_row(row)?,
        items,
        version: row.try_get("version")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

/// The settlement columns are written together; a partially filled set is corrupt data.
fn settlement_from_row(row: &SqliteRow) -> Result<Option<OrderSettlement>, RepositoryError> {
    let order_reference: Option<String> = row.try_get("order_reference")?;
    let final_discount = parse_optional_decimal("final_discount", row.try_get("final_discount")?)?;
    let final_amount = parse_optional_decimal("final_amount", row.try_get("final_amount")?)?;
    let commission_rate =
        parse_optional_decimal("commission_rate", row.try_get("commission_rate")?)?;
    let processing_date =
        parse_optional_timestamp("processing_date", row.try_get("processing_date")?)?;

    match (order_reference, final_discount, final_amount, commission_rate, processing_date) {
        (None, None, None, None, None) => Ok(None),
        (
            Some(order_reference),
            Some(final_discount),
            Some(final_amount),
            Some(commission_rate),
            Some(processing_date),
        ) => Ok(Some(OrderSettlement {
            order_reference,
            final_discount,
            final_amount,
            commission_rate,
            processing_date,
        })),
        _ => Err(RepositoryError::Decode("settlement columns are only partially set".to_string())),
    }
}
