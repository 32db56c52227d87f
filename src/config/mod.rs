pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::domain::model::InvoiceType;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

pub use cli::JsonFileOutcomeStore;
pub use toml_config::TomlConfig;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "afip-fe")]
#[command(about = "Electronic invoice authorization against AFIP (WSAA + WSFEv1)")]
pub struct CliConfig {
    #[arg(long, short, default_value = "afip.toml", help = "Path to the TOML configuration")]
    pub config: PathBuf,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Probe the invoicing service health (FEDummy)
    Status,

    /// Last number the Authority authorized for a type and sale point
    LastNumber {
        #[arg(long = "type", help = "Invoice type code or name (e.g. 6, B, NC-A)")]
        invoice_type: InvoiceType,
        #[arg(long, help = "Sale point; defaults to the configured one")]
        point: Option<u32>,
    },

    /// Authorize the sale described by a JSON snapshot file
    Authorize {
        #[arg(long)]
        sale: PathBuf,
        #[arg(long, help = "Write the printed-invoice QR code as SVG to this file")]
        qr_svg: Option<PathBuf>,
    },

    /// Fetch an invoice the Authority already holds
    Query {
        #[arg(long = "type")]
        invoice_type: InvoiceType,
        #[arg(long)]
        point: Option<u32>,
        #[arg(long)]
        number: u64,
    },

    /// Resolve an invoice whose submission outcome is unknown
    Reconcile {
        #[arg(long = "type")]
        invoice_type: InvoiceType,
        #[arg(long)]
        point: Option<u32>,
        #[arg(long)]
        number: u64,
        #[arg(long, help = "Record the recovered outcome against this sale")]
        sale_id: Option<String>,
    },

    /// List the issuer's sale points
    SalePoints,

    /// Check a CUIT/CUIL checksum without contacting the Authority
    ValidateCuit { value: String },
}
