use std::sync::Arc;
use std::time::Duration;

use quotedesk_core::audit::TracingAuditSink;
use quotedesk_core::config::{AppConfig, ConfigError, LoadOptions};
use quotedesk_core::ports::{GatewayError, NotificationError, SystemClock};
use quotedesk_core::services::{AssociateService, QuoteService, SettlementOrchestrator};
use quotedesk_db::{
    connect_read_only, connect_with_settings, migrations, DbPool, SqlAssociateRepository,
    SqlCustomerDirectory, SqlQuoteStore,
};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::mail::{transport_from_config, TemplateNotifier};
use crate::settlement::HttpSettlementGateway;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub directory_pool: DbPool,
    pub api: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("customer directory connection failed: {0}")]
    DirectoryConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("settlement client setup failed: {0}")]
    Settlement(#[source] GatewayError),
    #[error("mail setup failed: {0}")]
    Mail(#[source] NotificationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let directory_pool = match config.directory.url.as_deref() {
        Some(url) => {
            let pool = connect_read_only(
                url,
                config.database.max_connections,
                config.database.timeout_secs,
            )
            .await
            .map_err(BootstrapError::DirectoryConnect)?;
            info!(
                event_name = "system.bootstrap.directory_connected",
                correlation_id = "bootstrap",
                "separate customer directory connected read-only"
            );
            pool
        }
        None => db_pool.clone(),
    };

    let api = services(&config, &db_pool, &directory_pool)?;

    Ok(Application { config, db_pool, directory_pool, api })
}

fn services(
    config: &AppConfig,
    db_pool: &DbPool,
    directory_pool: &DbPool,
) -> Result<ApiState, BootstrapError> {
    let store = Arc::new(SqlQuoteStore::new(db_pool.clone()));
    let associates = Arc::new(SqlAssociateRepository::new(db_pool.clone()));
    let directory = Arc::new(SqlCustomerDirectory::new(directory_pool.clone()));
    let clock = Arc::new(SystemClock);
    let audit = Arc::new(TracingAuditSink);

    let transport = transport_from_config(&config.mail).map_err(BootstrapError::Mail)?;
    let notifier = Arc::new(
        TemplateNotifier::new(transport, config.mail.from_address.clone())
            .map_err(BootstrapError::Mail)?,
    );
    let gateway = Arc::new(
        HttpSettlementGateway::new(&config.settlement).map_err(BootstrapError::Settlement)?,
    );

    let quotes = QuoteService::new(
        store.clone(),
        associates.clone(),
        directory,
        notifier.clone(),
        clock.clone(),
        audit.clone(),
    );
    let orders = SettlementOrchestrator::new(
        store,
        gateway,
        notifier,
        clock,
        audit,
        Duration::from_secs(config.settlement.timeout_secs),
    );

    Ok(ApiState {
        quotes: Arc::new(quotes),
        orders: Arc::new(orders),
        associates: Arc::new(AssociateService::new(associates)),
    })
}
