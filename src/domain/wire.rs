//! Request documents for each Authority operation and the typed results read back.
//!
//! Field renames reproduce the Authority's element names exactly; element order
//! follows the published schema sequences.

use crate::domain::model::AuthorityMessage;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

pub const WSFE_NAMESPACE: &str = "http://ar.gov.afip.dif.FEV1/";
pub const WSAA_NAMESPACE: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov";
pub const WSFE_SERVICE: &str = "wsfe";

// ---------------------------------------------------------------------------
// Authentication service (WSAA)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "loginTicketRequest")]
pub struct LoginTicketRequest {
    #[serde(rename = "@version")]
    pub version: &'static str,
    pub header: LoginTicketHeader,
    pub service: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginTicketHeader {
    #[serde(rename = "uniqueId")]
    pub unique_id: u32,
    #[serde(rename = "generationTime")]
    pub generation_time: String,
    #[serde(rename = "expirationTime")]
    pub expiration_time: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "loginCms")]
pub struct LoginCms {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    /// Base64 of the DER-encoded CMS signed-data.
    pub in0: String,
}

// ---------------------------------------------------------------------------
// Invoicing service (WSFEv1) requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WsfeAuth {
    #[serde(rename = "Token")]
    pub token: String,
    #[serde(rename = "Sign")]
    pub sign: String,
    #[serde(rename = "Cuit")]
    pub cuit: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "FEDummy")]
pub struct FeDummy {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "FECompUltimoAutorizado")]
pub struct FeCompUltimoAutorizado {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Auth")]
    pub auth: WsfeAuth,
    #[serde(rename = "PtoVta")]
    pub sale_point: u32,
    #[serde(rename = "CbteTipo")]
    pub invoice_type: u16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "FECAESolicitar")]
pub struct FeCaeSolicitar {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Auth")]
    pub auth: WsfeAuth,
    #[serde(rename = "FeCAEReq")]
    pub request: FeCaeReq,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeCaeReq {
    #[serde(rename = "FeCabReq")]
    pub header: FeCabReq,
    #[serde(rename = "FeDetReq")]
    pub details: FeDetReq,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeCabReq {
    #[serde(rename = "CantReg")]
    pub record_count: u32,
    #[serde(rename = "PtoVta")]
    pub sale_point: u32,
    #[serde(rename = "CbteTipo")]
    pub invoice_type: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeDetReq {
    #[serde(rename = "FECAEDetRequest")]
    pub records: Vec<FeCaeDetRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeCaeDetRequest {
    #[serde(rename = "Concepto")]
    pub concept: u8,
    #[serde(rename = "DocTipo")]
    pub document_type: u16,
    #[serde(rename = "DocNro")]
    pub document_number: u64,
    #[serde(rename = "CbteDesde")]
    pub number_from: u64,
    #[serde(rename = "CbteHasta")]
    pub number_to: u64,
    #[serde(rename = "CbteFch")]
    pub invoice_date: String,
    #[serde(rename = "ImpTotal")]
    pub total: Decimal,
    #[serde(rename = "ImpTotConc")]
    pub untaxed: Decimal,
    #[serde(rename = "ImpNeto")]
    pub net: Decimal,
    #[serde(rename = "ImpOpEx")]
    pub exempt: Decimal,
    #[serde(rename = "ImpTrib")]
    pub other_taxes: Decimal,
    #[serde(rename = "ImpIVA")]
    pub vat: Decimal,
    #[serde(rename = "FchServDesde", skip_serializing_if = "Option::is_none")]
    pub service_from: Option<String>,
    #[serde(rename = "FchServHasta", skip_serializing_if = "Option::is_none")]
    pub service_to: Option<String>,
    #[serde(rename = "FchVtoPago", skip_serializing_if = "Option::is_none")]
    pub payment_due: Option<String>,
    #[serde(rename = "MonId")]
    pub currency: String,
    #[serde(rename = "MonCotiz")]
    pub exchange_rate: Decimal,
    #[serde(rename = "CondicionIVAReceptorId", skip_serializing_if = "Option::is_none")]
    pub receiver_vat_condition: Option<u8>,
    #[serde(rename = "CbtesAsoc", skip_serializing_if = "Option::is_none")]
    pub associated: Option<CbtesAsoc>,
    #[serde(rename = "Tributos", skip_serializing_if = "Option::is_none")]
    pub taxes: Option<Tributos>,
    #[serde(rename = "Iva", skip_serializing_if = "Option::is_none")]
    pub vat_breakdown: Option<IvaBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CbtesAsoc {
    #[serde(rename = "CbteAsoc")]
    pub items: Vec<CbteAsoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CbteAsoc {
    #[serde(rename = "Tipo")]
    pub invoice_type: u16,
    #[serde(rename = "PtoVta")]
    pub sale_point: u32,
    #[serde(rename = "Nro")]
    pub number: u64,
    #[serde(rename = "Cuit", skip_serializing_if = "Option::is_none")]
    pub cuit: Option<u64>,
    #[serde(rename = "CbteFch", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tributos {
    #[serde(rename = "Tributo")]
    pub items: Vec<Tributo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tributo {
    #[serde(rename = "Id")]
    pub id: u16,
    #[serde(rename = "Desc")]
    pub description: String,
    #[serde(rename = "BaseImp")]
    pub base: Decimal,
    #[serde(rename = "Alic")]
    pub rate: Decimal,
    #[serde(rename = "Importe")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IvaBlock {
    #[serde(rename = "AlicIva")]
    pub items: Vec<AlicIva>,
}

/// One aggregated VAT group: all lines sharing a rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlicIva {
    #[serde(rename = "Id")]
    pub code: u8,
    #[serde(rename = "BaseImp")]
    pub base: Decimal,
    #[serde(rename = "Importe")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "FECompConsultar")]
pub struct FeCompConsultar {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Auth")]
    pub auth: WsfeAuth,
    #[serde(rename = "FeCompConsReq")]
    pub request: FeCompConsReq,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeCompConsReq {
    #[serde(rename = "CbteTipo")]
    pub invoice_type: u16,
    #[serde(rename = "CbteNro")]
    pub number: u64,
    #[serde(rename = "PtoVta")]
    pub sale_point: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "FEParamGetPtosVenta")]
pub struct FeParamGetPtosVenta {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Auth")]
    pub auth: WsfeAuth,
}

/// A single-record authorization request, ready to submit.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRequest {
    pub header: FeCabReq,
    pub detail: FeCaeDetRequest,
    pub invoice_date: NaiveDate,
}

impl InvoiceRequest {
    pub fn sale_point(&self) -> u32 {
        self.header.sale_point
    }

    pub fn invoice_type(&self) -> u16 {
        self.header.invoice_type
    }

    pub fn number(&self) -> u64 {
        self.detail.number_from
    }

    pub fn into_operation(self, auth: WsfeAuth) -> FeCaeSolicitar {
        FeCaeSolicitar {
            xmlns: WSFE_NAMESPACE,
            auth,
            request: FeCaeReq {
                header: self.header,
                details: FeDetReq {
                    records: vec![self.detail],
                },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Typed results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityResult {
    Approved,
    Rejected,
    Partial,
}

impl AuthorityResult {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "A" => Some(Self::Approved),
            "R" => Some(Self::Rejected),
            "P" => Some(Self::Partial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceResponse {
    pub result: AuthorityResult,
    pub cae: Option<String>,
    pub cae_expiration: Option<NaiveDate>,
    pub cuit: Option<u64>,
    pub sale_point: Option<u32>,
    pub invoice_type: Option<u16>,
    pub number_from: Option<u64>,
    pub number_to: Option<u64>,
    pub reprocessed: bool,
    pub events: Vec<AuthorityMessage>,
    pub observations: Vec<AuthorityMessage>,
    pub errors: Vec<AuthorityMessage>,
}

/// Canonical record of an invoice the Authority already holds.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRecord {
    pub invoice_type: u16,
    pub sale_point: u32,
    pub number: u64,
    pub invoice_date: Option<NaiveDate>,
    pub document_type: Option<u16>,
    pub document_number: Option<u64>,
    pub total: Option<Decimal>,
    pub result: Option<AuthorityResult>,
    pub authorization_code: Option<String>,
    pub authorization_expiration: Option<NaiveDate>,
    pub emission_type: Option<String>,
    pub observations: Vec<AuthorityMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentHealth {
    Ok,
    Error,
    Other(String),
}

impl ComponentHealth {
    pub fn from_text(text: Option<&str>) -> Self {
        match text.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("OK") => Self::Ok,
            Some(value) if !value.is_empty() => Self::Other(value.to_string()),
            _ => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub app_server: ComponentHealth,
    pub db_server: ComponentHealth,
    pub auth_server: ComponentHealth,
}

impl ServerStatus {
    pub fn unavailable() -> Self {
        Self {
            app_server: ComponentHealth::Error,
            db_server: ComponentHealth::Error,
            auth_server: ComponentHealth::Error,
        }
    }

    pub fn is_healthy(&self) -> bool {
        [&self.app_server, &self.db_server, &self.auth_server]
            .iter()
            .all(|c| **c == ComponentHealth::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalePointInfo {
    pub number: u32,
    pub emission_type: String,
    pub blocked: bool,
    pub deactivated_on: Option<NaiveDate>,
}
