//! Turns invoicing-service payloads into typed results.
//!
//! Every `*Result` element carries up to three independent message lists
//! (`Events/Evt`, `Observaciones/Obs`, `Errors/Err`), each entry a code and a message.

use crate::adapters::xml::XmlNode;
use crate::domain::model::AuthorityMessage;
use crate::domain::wire::{
    AuthorityResult, ComponentHealth, InvoiceRecord, InvoiceResponse, SalePointInfo, ServerStatus,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

pub const CODE_INVALID_TOKEN: i64 = 600;
pub const CODE_UNAUTHORIZED_CUIT: i64 = 601;
pub const CODE_NOT_FOUND: i64 = 602;

/// Why a payload could not be interpreted; callers attach the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum InterpretError {
    /// The service answered with errors instead of data.
    Authority(Vec<AuthorityMessage>),
    Malformed(String),
}

fn is_ticket_error(message: &AuthorityMessage) -> bool {
    message.code == CODE_INVALID_TOKEN || message.code == CODE_UNAUTHORIZED_CUIT
}

impl InterpretError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authority(errors) if errors.iter().any(is_ticket_error))
    }
}

impl std::fmt::Display for InterpretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authority(errors) => {
                let joined: Vec<String> = errors.iter().map(|e| format!("[{}] {}", e.code, e.message)).collect();
                write!(f, "{}", joined.join("; "))
            }
            Self::Malformed(message) => write!(f, "{}", message),
        }
    }
}

type Interpreted<T> = std::result::Result<T, InterpretError>;

/// Short English labels for frequent codes. Unknown codes stay unlabelled.
pub fn label_for(code: i64) -> Option<&'static str> {
    Some(match code {
        501 => "Internal database error",
        502 => "Internal error reading the database",
        600 => "Access ticket not valid or expired",
        601 => "CUIT not authorized for this service",
        602 => "No results for the requested query",
        10013 => "Receiver document type or number is invalid",
        10015 => "Receiver document number is invalid",
        10016 => "Invoice number is not the next one expected",
        10048 => "Total amount does not equal the sum of its components",
        _ => return None,
    })
}

fn messages(result: &XmlNode, list: &str, item: &str) -> Vec<AuthorityMessage> {
    let Some(container) = result.child(list) else {
        return Vec::new();
    };
    container
        .children_named(item)
        .map(|entry| {
            let code = entry
                .text_of("Code")
                .and_then(|c| c.parse::<i64>().ok())
                .unwrap_or(0);
            AuthorityMessage {
                code,
                message: entry.text_of("Msg").unwrap_or("").to_string(),
                label: label_for(code).map(str::to_string),
            }
        })
        .collect()
}

pub fn events(result: &XmlNode) -> Vec<AuthorityMessage> {
    messages(result, "Events", "Evt")
}

pub fn errors(result: &XmlNode) -> Vec<AuthorityMessage> {
    messages(result, "Errors", "Err")
}

pub fn observations(node: &XmlNode) -> Vec<AuthorityMessage> {
    messages(node, "Observaciones", "Obs")
}

/// Authority dates are `YYYYMMDD`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").ok()
}

fn number<T: FromStr>(node: &XmlNode, name: &str) -> Option<T> {
    node.text_of(name).and_then(|v| v.parse::<T>().ok())
}

fn result_node<'a>(payload: &'a XmlNode, name: &str) -> Interpreted<&'a XmlNode> {
    payload
        .find(name)
        .ok_or_else(|| InterpretError::Malformed(format!("response has no {}", name)))
}

/// FEDummy: three component states; never fails.
pub fn interpret_dummy(payload: &XmlNode) -> ServerStatus {
    match payload.find("FEDummyResult") {
        Some(result) => ServerStatus {
            app_server: ComponentHealth::from_text(result.text_of("AppServer")),
            db_server: ComponentHealth::from_text(result.text_of("DbServer")),
            auth_server: ComponentHealth::from_text(result.text_of("AuthServer")),
        },
        None => ServerStatus::unavailable(),
    }
}

pub fn interpret_last_authorized(payload: &XmlNode) -> Interpreted<u64> {
    let result = result_node(payload, "FECompUltimoAutorizadoResult")?;
    let errs = errors(result);
    if !errs.is_empty() {
        return Err(InterpretError::Authority(errs));
    }
    number::<u64>(result, "CbteNro")
        .ok_or_else(|| InterpretError::Malformed("missing or invalid CbteNro".to_string()))
}

/// FECAESolicitar. A rejection is a normal value. An unreadable payload, or a
/// refused ticket (600/601), is an error: the invoice itself was never judged.
pub fn interpret_cae(payload: &XmlNode) -> Interpreted<InvoiceResponse> {
    let result = result_node(payload, "FECAESolicitarResult")?;
    let header = result.child("FeCabResp");
    let detail = result
        .child("FeDetResp")
        .and_then(|d| d.child("FECAEDetResponse"));

    let outcome_code = detail
        .and_then(|d| d.text_of("Resultado"))
        .or_else(|| header.and_then(|h| h.text_of("Resultado")));
    let errs = errors(result);
    if errs.iter().any(is_ticket_error) {
        return Err(InterpretError::Authority(errs));
    }

    let outcome = match outcome_code.and_then(AuthorityResult::from_code) {
        Some(outcome) => outcome,
        // 沒有結果欄位時，只有附帶錯誤才視為拒絕
        None if !errs.is_empty() => AuthorityResult::Rejected,
        None => {
            return Err(InterpretError::Malformed(
                "authorization response carries no result".to_string(),
            ))
        }
    };

    Ok(InvoiceResponse {
        result: outcome,
        cae: detail
            .and_then(|d| d.text_of("CAE"))
            .map(str::to_string),
        cae_expiration: detail
            .and_then(|d| d.text_of("CAEFchVto"))
            .and_then(parse_date),
        cuit: header.and_then(|h| number(h, "Cuit")),
        sale_point: header.and_then(|h| number(h, "PtoVta")),
        invoice_type: header.and_then(|h| number(h, "CbteTipo")),
        number_from: detail.and_then(|d| number(d, "CbteDesde")),
        number_to: detail.and_then(|d| number(d, "CbteHasta")),
        reprocessed: header
            .and_then(|h| h.text_of("Reproceso"))
            .map(|r| r.eq_ignore_ascii_case("S"))
            .unwrap_or(false),
        events: events(result),
        observations: detail.map(observations).unwrap_or_default(),
        errors: errs,
    })
}

/// FECompConsultar. Code 602 means the invoice does not exist.
pub fn interpret_query(payload: &XmlNode) -> Interpreted<Option<InvoiceRecord>> {
    let result = result_node(payload, "FECompConsultarResult")?;
    let errs = errors(result);
    if errs.iter().any(|e| e.code == CODE_NOT_FOUND) {
        return Ok(None);
    }
    if !errs.is_empty() {
        return Err(InterpretError::Authority(errs));
    }

    let Some(record) = result.child("ResultGet") else {
        return Ok(None);
    };

    let required = |name: &str| -> Interpreted<u64> {
        number::<u64>(record, name)
            .ok_or_else(|| InterpretError::Malformed(format!("record is missing {}", name)))
    };

    let invoice_type = u16::try_from(required("CbteTipo")?)
        .map_err(|_| InterpretError::Malformed("CbteTipo is out of range".to_string()))?;
    let sale_point = u32::try_from(required("PtoVta")?)
        .map_err(|_| InterpretError::Malformed("PtoVta is out of range".to_string()))?;

    Ok(Some(InvoiceRecord {
        invoice_type,
        sale_point,
        number: required("CbteDesde")?,
        invoice_date: record.text_of("CbteFch").and_then(parse_date),
        document_type: number(record, "DocTipo"),
        document_number: number(record, "DocNro"),
        total: record
            .text_of("ImpTotal")
            .and_then(|v| Decimal::from_str(v).ok()),
        result: record.text_of("Resultado").and_then(AuthorityResult::from_code),
        authorization_code: record.text_of("CodAutorizacion").map(str::to_string),
        authorization_expiration: record.text_of("FchVto").and_then(parse_date),
        emission_type: record.text_of("EmisionTipo").map(str::to_string),
        observations: observations(record),
    }))
}

pub fn interpret_sale_points(payload: &XmlNode) -> Interpreted<Vec<SalePointInfo>> {
    let result = result_node(payload, "FEParamGetPtosVentaResult")?;
    let errs = errors(result);
    // 602: 尚未啟用任何銷售點
    if errs.iter().any(|e| e.code == CODE_NOT_FOUND) {
        return Ok(Vec::new());
    }
    if !errs.is_empty() {
        return Err(InterpretError::Authority(errs));
    }

    let Some(list) = result.child("ResultGet") else {
        return Ok(Vec::new());
    };
    list.children_named("PtoVenta")
        .map(|p| {
            Ok(SalePointInfo {
                number: number(p, "Nro").ok_or_else(|| {
                    InterpretError::Malformed("sale point without Nro".to_string())
                })?,
                emission_type: p.text_of("EmisionTipo").unwrap_or("").to_string(),
                blocked: p
                    .text_of("Bloqueado")
                    .map(|b| b.eq_ignore_ascii_case("S"))
                    .unwrap_or(false),
                deactivated_on: p
                    .text_of("FchBaja")
                    .filter(|d| !d.eq_ignore_ascii_case("NULL"))
                    .and_then(parse_date),
            })
        })
        .collect()
}
