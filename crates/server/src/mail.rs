//! Customer mail: tera-rendered notices handed to a [`MailTransport`].

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quotedesk_core::config::MailConfig;
use quotedesk_core::domain::quote::{CustomerQuoteView, DiscountKind, Quote};
use quotedesk_core::domain::settlement::SettlementReceipt;
use quotedesk_core::ports::{NotificationError, Notifier};
use quotedesk_core::pricing::format_money;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tera::{Context, Tera};
use tracing::info;

const SANCTION_NOTICE: &str = "sanction_notice.html";
const ORDER_CONFIRMATION: &str = "order_confirmation.html";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotificationError>;
}

/// Posts rendered mail to an HTTP relay authenticated with a bearer key.
pub struct HttpMailRelay {
    client: Client,
    relay_url: String,
    api_key: SecretString,
}

impl HttpMailRelay {
    pub fn new(
        relay_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotificationError::Delivery(error.to_string()))?;
        Ok(Self { client, relay_url: relay_url.into(), api_key })
    }
}

#[async_trait]
impl MailTransport for HttpMailRelay {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.relay_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(mail)
            .send()
            .await
            .map_err(|error| NotificationError::Delivery(error.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "mail relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Used when mail is disabled: the message is logged instead of delivered.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), NotificationError> {
        info!(
            event_name = "mail.logged",
            to = %mail.to,
            subject = %mail.subject,
            bytes = mail.html.len(),
            "mail delivery disabled, message logged"
        );
        Ok(())
    }
}

pub fn transport_from_config(
    config: &MailConfig,
) -> Result<Arc<dyn MailTransport>, NotificationError> {
    match (config.enabled, config.relay_url.as_deref(), config.api_key.as_ref()) {
        (true, Some(relay_url), Some(api_key)) => Ok(Arc::new(HttpMailRelay::new(
            relay_url,
            api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        (true, _, _) => Err(NotificationError::Delivery(
            "mail is enabled without a relay url and api key".to_string(),
        )),
        (false, _, _) => Ok(Arc::new(LogMailTransport)),
    }
}

pub struct TemplateNotifier {
    templates: Tera,
    transport: Arc<dyn MailTransport>,
    from_address: String,
}

impl TemplateNotifier {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        from_address: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let mut templates = Tera::default();
        register_template_filters(&mut templates);
        templates
            .add_raw_templates(vec![
                (
                    SANCTION_NOTICE,
                    include_str!("../../../templates/mail/sanction_notice.html"),
                ),
                (
                    ORDER_CONFIRMATION,
                    include_str!("../../../templates/mail/order_confirmation.html"),
                ),
            ])
            .map_err(|error| render_error("mail templates", error))?;
        Ok(Self { templates, transport, from_address: from_address.into() })
    }

    fn render(&self, template: &str, context: &Context) -> Result<String, NotificationError> {
        self.templates.render(template, context).map_err(|error| render_error(template, error))
    }

    async fn deliver(
        &self,
        quote: &Quote,
        subject: String,
        html: String,
    ) -> Result<(), NotificationError> {
        let mail = OutgoingMail {
            from: self.from_address.clone(),
            to: quote.email.clone(),
            subject,
            html,
        };
        self.transport.send(&mail).await?;
        info!(
            event_name = "mail.sent",
            quote_id = quote.id.0,
            subject = %mail.subject,
            "customer mail handed to transport"
        );
        Ok(())
    }
}

#[async_trait]
impl Notifier for TemplateNotifier {
    async fn send_sanction_notice(&self, quote: &Quote) -> Result<(), NotificationError> {
        let mut context = Context::new();
        context.insert("quote", &CustomerQuoteView::from(quote));
        context.insert("discount_label", &discount_label(quote));

        let html = self.render(SANCTION_NOTICE, &context)?;
        self.deliver(quote, format!("Quote #{} has been approved", quote.id), html).await
    }

    async fn send_order_confirmation(
        &self,
        quote: &Quote,
        receipt: &SettlementReceipt,
    ) -> Result<(), NotificationError> {
        let final_amount = quote
            .settlement
            .as_ref()
            .map(|settlement| settlement.final_amount)
            .unwrap_or(quote.total_amount);

        let mut context = Context::new();
        context.insert("quote", &CustomerQuoteView::from(quote));
        context.insert("receipt", receipt);
        context.insert("final_amount", &final_amount);
        context.insert(
            "processed_on",
            &receipt.processing_date.format("%Y-%m-%d %H:%M UTC").to_string(),
        );

        let html = self.render(ORDER_CONFIRMATION, &context)?;
        self.deliver(
            quote,
            format!("Purchase order {} confirmed", receipt.order_reference),
            html,
        )
        .await
    }
}

fn discount_label(quote: &Quote) -> Option<String> {
    if quote.discount.value.is_zero() {
        return None;
    }
    Some(match quote.discount.kind {
        DiscountKind::Percentage => format!("{}%", quote.discount.value.normalize()),
        DiscountKind::Amount => format_money(quote.discount.value),
    })
}

fn render_error(template: &str, error: tera::Error) -> NotificationError {
    NotificationError::Render { template: template.to_string(), message: error.to_string() }
}

pub fn register_template_filters(tera: &mut Tera) {
    tera.register_filter("money", tera_money_filter);
}

/// Formats a decimal, given as a JSON string or number, to two places.
/// Usage: `amount | money`
fn tera_money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(text) => Decimal::from_str(text.trim())
            .map_err(|_| tera::Error::msg(format!("`{text}` is not a decimal amount")))?,
        tera::Value::Number(number) => Decimal::from_str(&number.to_string())
            .map_err(|_| tera::Error::msg(format!("`{number}` is not a decimal amount")))?,
        tera::Value::Null => Decimal::ZERO,
        other => return Err(tera::Error::msg(format!("money filter cannot format {other}"))),
    };
    Ok(tera::Value::String(format_money(amount)))
}
