pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};
pub use config::{JsonFileOutcomeStore, TomlConfig};

pub use core::{tenant_from_config, CredentialBroker, Orchestrator, WsfeClient};
pub use domain::model::{AuthorizationResult, InvoiceOutcome, SaleSnapshot, TenantProfile};
pub use domain::services::validate_tax_id;
pub use utils::error::{InvoicingError, Result};
