use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::associate::AssociateId;
use crate::domain::customer::CustomerId;
use crate::domain::quote::QuoteId;
use crate::pricing::format_money;

/// Wire body posted to the settlement system. Every field travels as a string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order: String,
    pub associate: String,
    pub custid: String,
    pub amount: String,
}

impl OrderRequest {
    pub fn new(
        order_reference: &str,
        associate_id: AssociateId,
        customer_id: CustomerId,
        amount: Decimal,
    ) -> Self {
        Self {
            order: order_reference.to_string(),
            associate: associate_id.to_string(),
            custid: customer_id.to_string(),
            amount: format_money(amount),
        }
    }
}

pub fn order_reference(quote_id: QuoteId, millis: i64) -> String {
    format!("PO-{}-{millis}", quote_id.0)
}

/// Raw reply from the settlement system. Either `errors` is populated or the booking fields are.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<Value>,
    #[serde(default, rename = "timeStamp", skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

impl SettlementReply {
    pub fn booked(commission: &str, time_stamp: &str) -> Self {
        Self {
            errors: None,
            commission: Some(Value::String(commission.to_string())),
            time_stamp: Some(Value::String(time_stamp.to_string())),
            order: None,
        }
    }

    pub fn rejected(errors: &[&str]) -> Self {
        Self {
            errors: Some(Value::Array(
                errors.iter().map(|error| Value::String((*error).to_string())).collect(),
            )),
            ..Self::default()
        }
    }

    /// Turns the raw reply into a receipt. Nothing about the local ledger may change when this
    /// returns an error.
    pub fn interpret(&self, order_reference: &str) -> Result<SettlementReceipt, SettlementReplyError> {
        if let Some(errors) = self.errors.as_ref().filter(|errors| !is_empty_errors(errors)) {
            return Err(SettlementReplyError::Rejected(error_messages(errors)));
        }

        let commission = self.commission.as_ref().ok_or(SettlementReplyError::MissingCommission)?;
        let commission_rate = parse_commission_rate(commission)?;

        let time_stamp = self.time_stamp.as_ref().ok_or(SettlementReplyError::MissingTimestamp)?;
        let processing_date = parse_timestamp(time_stamp)?;

        Ok(SettlementReceipt {
            order_reference: self
                .order
                .clone()
                .filter(|order| !order.trim().is_empty())
                .unwrap_or_else(|| order_reference.to_string()),
            commission_rate,
            processing_date,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub order_reference: String,
    pub commission_rate: Decimal,
    pub processing_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SettlementReplyError {
    #[error("settlement system rejected the order: {}", .0.join("; "))]
    Rejected(Vec<String>),
    #[error("settlement reply carried no commission")]
    MissingCommission,
    #[error("settlement reply carried an unparsable commission `{0}`")]
    UnparsableCommission(String),
    #[error("settlement reply carried no timestamp")]
    MissingTimestamp,
    #[error("settlement reply carried an unparsable timestamp `{0}`")]
    UnparsableTimestamp(String),
}

/// Accepts `"10%"`, `"10"`, `" 7.5 % "` or a bare JSON number. Rates must lie in 0..=100.
pub fn parse_commission_rate(value: &Value) -> Result<Decimal, SettlementReplyError> {
    let raw = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        other => return Err(SettlementReplyError::UnparsableCommission(other.to_string())),
    };

    let trimmed = raw.trim();
    let numeric = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    let rate = Decimal::from_str(numeric)
        .or_else(|_| Decimal::from_scientific(numeric))
        .map_err(|_| SettlementReplyError::UnparsableCommission(raw.clone()))?;

    if (rate.is_sign_negative() && !rate.is_zero()) || rate > Decimal::ONE_HUNDRED {
        return Err(SettlementReplyError::UnparsableCommission(raw));
    }
    Ok(rate.normalize())
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// ISO-8601 with or without offset (naive values are taken as UTC), a bare date, or epoch
/// milliseconds.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, SettlementReplyError> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Ok(parsed.with_timezone(&Utc));
            }
            for format in NAIVE_FORMATS {
                if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
                    return Ok(parsed.and_utc());
                }
            }
            if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
            {
                return Ok(midnight.and_utc());
            }
            Err(SettlementReplyError::UnparsableTimestamp(text.to_string()))
        }
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| SettlementReplyError::UnparsableTimestamp(number.to_string())),
        other => Err(SettlementReplyError::UnparsableTimestamp(other.to_string())),
    }
}

fn is_empty_errors(errors: &Value) -> bool {
    match errors {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn error_messages(errors: &Value) -> Vec<String> {
    match errors {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(text) => vec![text.clone()],
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{
        order_reference, parse_commission_rate, parse_timestamp, OrderRequest, SettlementReply,
        SettlementReplyError,
    };
    use crate::domain::{associate::AssociateId, customer::CustomerId, quote::QuoteId};

    #[test]
    fn order_request_sends_two_place_amount_strings() {
        let request = OrderRequest::new(
            &order_reference(QuoteId(7), 1_700_000_000_123),
            AssociateId(3),
            CustomerId(41),
            Decimal::new(450, 0),
        );

        assert_eq!(request.order, "PO-7-1700000000123");
        assert_eq!(request.associate, "3");
        assert_eq!(request.custid, "41");
        assert_eq!(request.amount, "450.00");
    }

    #[test]
    fn commission_accepts_percent_suffix_and_plain_numbers() {
        assert_eq!(parse_commission_rate(&json!("10%")), Ok(Decimal::new(10, 0)));
        assert_eq!(parse_commission_rate(&json!(" 7.5 % ")), Ok(Decimal::new(75, 1)));
        assert_eq!(parse_commission_rate(&json!(12)), Ok(Decimal::new(12, 0)));
    }

    #[test]
    fn commission_rejects_garbage_and_negative_rates() {
        assert!(matches!(
            parse_commission_rate(&json!("ten percent")),
            Err(SettlementReplyError::UnparsableCommission(_))
        ));
        assert!(matches!(
            parse_commission_rate(&json!("-5%")),
            Err(SettlementReplyError::UnparsableCommission(_))
        ));
        assert!(parse_commission_rate(&json!(null)).is_err());
    }

    #[test]
    fn commission_above_one_hundred_percent_is_refused() {
        assert_eq!(parse_commission_rate(&json!("100%")), Ok(Decimal::ONE_HUNDRED));
        assert!(matches!(
            parse_commission_rate(&json!("1e28%")),
            Err(SettlementReplyError::UnparsableCommission(_))
        ));
        assert!(matches!(
            parse_commission_rate(&json!(100.5)),
            Err(SettlementReplyError::UnparsableCommission(_))
        ));
    }

    #[test]
    fn timestamps_parse_iso_naive_and_epoch_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).single().expect("valid date");

        assert_eq!(parse_timestamp(&json!("2024-03-01T12:30:00Z")), Ok(expected));
        assert_eq!(parse_timestamp(&json!("2024-03-01T14:30:00+02:00")), Ok(expected));
        assert_eq!(parse_timestamp(&json!("2024-03-01 12:30:00")), Ok(expected));
        assert_eq!(parse_timestamp(&json!(expected.timestamp_millis())), Ok(expected));
        assert!(matches!(
            parse_timestamp(&json!("yesterday")),
            Err(SettlementReplyError::UnparsableTimestamp(_))
        ));
    }

    #[test]
    fn rejected_reply_surfaces_every_error() {
        let reply = SettlementReply::rejected(&["customer on hold", "amount too large"]);

        assert_eq!(
            reply.interpret("PO-1-1"),
            Err(SettlementReplyError::Rejected(vec![
                "customer on hold".to_string(),
                "amount too large".to_string()
            ]))
        );
    }

    #[test]
    fn booked_reply_prefers_echoed_order_reference() {
        let mut reply = SettlementReply::booked("10%", "2024-03-01T12:30:00Z");
        let receipt = reply.interpret("PO-7-1").expect("booked reply");
        assert_eq!(receipt.order_reference, "PO-7-1");
        assert_eq!(receipt.commission_rate, Decimal::new(10, 0));

        reply.order = Some("EXT-889".to_string());
        let receipt = reply.interpret("PO-7-1").expect("booked reply");
        assert_eq!(receipt.order_reference, "EXT-889");
    }

    #[test]
    fn empty_errors_array_is_not_a_rejection() {
        let reply: SettlementReply = serde_json::from_value(json!({
            "errors": [],
            "commission": "4%",
            "timeStamp": "2024-03-01T00:00:00Z"
        }))
        .expect("reply json");

        assert!(reply.interpret("PO-2-5").is_ok());
    }
}
