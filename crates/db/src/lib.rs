pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_read_only, connect_with_settings, probe, DbPool};
pub use fixtures::{DemoSeedDataset, QuoteSeedInfo, SeedResult, VerificationResult};
pub use repositories::{
    RepositoryError, SqlAssociateRepository, SqlCustomerDirectory, SqlQuoteStore,
};
