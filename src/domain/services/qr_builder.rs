//! Printed-invoice QR code: a JSON payload, base64-encoded into the Authority's verification URL.

use crate::domain::wire::InvoiceRequest;
use crate::utils::error::{InvoicingError, Result};
use base64::{engine::general_purpose, Engine as _};
use qrcode::render::svg;
use qrcode::QrCode;
use rust_decimal::Decimal;
use serde::Serialize;

pub const QR_BASE_URL: &str = "https://www.afip.gob.ar/fe/qr/";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    pub ver: u8,
    pub fecha: String,
    pub cuit: u64,
    pub pto_vta: u32,
    pub tipo_cmp: u16,
    pub nro_cmp: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub importe: Decimal,
    pub moneda: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub ctz: Decimal,
    pub tipo_doc_rec: u16,
    pub nro_doc_rec: u64,
    pub tipo_cod_aut: &'static str,
    pub cod_aut: u64,
}

impl QrPayload {
    pub fn new(issuer_cuit: u64, request: &InvoiceRequest, cae: &str) -> Result<Self> {
        let cod_aut = cae.trim().parse::<u64>().map_err(|_| {
            InvoicingError::validation("cae", format!("'{}' is not a numeric authorization code", cae))
        })?;
        Ok(Self {
            ver: 1,
            fecha: request.invoice_date.format("%Y-%m-%d").to_string(),
            cuit: issuer_cuit,
            pto_vta: request.sale_point(),
            tipo_cmp: request.invoice_type(),
            nro_cmp: request.number(),
            importe: request.detail.total,
            moneda: request.detail.currency.clone(),
            ctz: request.detail.exchange_rate,
            tipo_doc_rec: request.detail.document_type,
            nro_doc_rec: request.detail.document_number,
            tipo_cod_aut: "E",
            cod_aut,
        })
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(general_purpose::STANDARD.encode(json))
    }

    pub fn to_url(&self) -> Result<String> {
        Ok(format!("{}?p={}", QR_BASE_URL, self.encode()?))
    }

    /// SVG image of the verification URL, suitable for embedding in a printed invoice.
    pub fn render_svg(&self) -> Result<String> {
        render_svg(&self.to_url()?)
    }
}

/// Renders an already-built verification URL as an SVG QR code.
pub fn render_svg(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes()).map_err(|e| InvoicingError::ValidationError {
        field: "qr_url".to_string(),
        message: format!("QR encoding failed: {}", e),
    })?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .build())
}
