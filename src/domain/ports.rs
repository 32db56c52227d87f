use crate::domain::model::{InvoiceOutcome, InvoiceType, TenantProfile};
use crate::domain::wire::{
    InvoiceRecord, InvoiceRequest, InvoiceResponse, SalePointInfo, ServerStatus, WsfeAuth,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Testing,
    Production,
}

impl Environment {
    pub fn wsaa_url(self) -> &'static str {
        match self {
            Self::Testing => "https://wsaahomo.afip.gov.ar/ws/services/LoginCms",
            Self::Production => "https://wsaa.afip.gov.ar/ws/services/LoginCms",
        }
    }

    pub fn wsfe_url(self) -> &'static str {
        match self {
            Self::Testing => "https://wswhomo.afip.gov.ar/wsfev1/service.asmx",
            Self::Production => "https://servicios1.afip.gov.ar/wsfev1/service.asmx",
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn environment(&self) -> Environment;
    fn tenant_id(&self) -> &str;
    fn issuer_cuit(&self) -> &str;
    fn default_sale_point(&self) -> u32;
    fn certificate_path(&self) -> &Path;
    fn private_key_path(&self) -> &Path;
    fn auth_timeout(&self) -> Duration;
    fn invoice_timeout(&self) -> Duration;

    fn wsaa_endpoint(&self) -> &str {
        self.environment().wsaa_url()
    }

    fn wsfe_endpoint(&self) -> &str {
        self.environment().wsfe_url()
    }
}

/// Produces a CMS/PKCS#7 signed-data structure (DER) embedding `content`.
pub trait CmsSigner: Send + Sync {
    fn sign(&self, tenant: &TenantProfile, content: &[u8]) -> Result<Vec<u8>>;
}

/// Where terminal outcomes are recorded, keyed by sale id.
pub trait OutcomeStore: Send + Sync {
    fn find_outcome(
        &self,
        sale_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<InvoiceOutcome>>> + Send;
    fn record_outcome(
        &self,
        sale_id: &str,
        outcome: &InvoiceOutcome,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Operations of the invoicing service.
#[async_trait]
pub trait FiscalGateway: Send + Sync {
    /// Best-effort probe; never fails.
    async fn server_status(&self) -> ServerStatus;

    async fn last_authorized_number(
        &self,
        auth: &WsfeAuth,
        invoice_type: InvoiceType,
        sale_point: u32,
    ) -> Result<u64>;

    /// A rejection is an `Ok` response with `AuthorityResult::Rejected`.
    async fn authorize(&self, auth: &WsfeAuth, request: &InvoiceRequest) -> Result<InvoiceResponse>;

    async fn query_invoice(
        &self,
        auth: &WsfeAuth,
        invoice_type: InvoiceType,
        sale_point: u32,
        number: u64,
    ) -> Result<Option<InvoiceRecord>>;

    async fn sale_points(&self, auth: &WsfeAuth) -> Result<Vec<SalePointInfo>>;
}
