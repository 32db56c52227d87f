//! SOAP 1.1 over HTTPS: wraps one operation document in an envelope, posts it and
//! hands back the first element inside `Body`.

use crate::adapters::xml::{XmlError, XmlNode};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Error, Debug)]
pub enum SoapError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("SOAP fault {code}: {message}")]
    Fault { code: String, message: String },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl From<XmlError> for SoapError {
    fn from(err: XmlError) -> Self {
        SoapError::Malformed(err.0)
    }
}

#[derive(Debug, Clone)]
pub struct SoapTransport {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl SoapTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts `operation` and returns the response payload element.
    ///
    /// `action` goes into the `SOAPAction` header verbatim (quoted); pass `""` for none.
    pub async fn call<T: Serialize>(&self, action: &str, operation: &T) -> Result<XmlNode, SoapError> {
        let body = envelope(operation)?;
        tracing::debug!(endpoint = %self.endpoint, action, bytes = body.len(), "Sending SOAP request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header("SOAPAction", format!("\"{}\"", action))
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(endpoint = %self.endpoint, status = status.as_u16(), "SOAP response received");

        // 伺服器錯誤時仍可能回傳 SOAP Fault，先嘗試解析
        let parsed = XmlNode::parse(&text);
        if let Ok(root) = &parsed {
            if let Some(fault) = root.find("Fault") {
                return Err(SoapError::Fault {
                    code: fault.text_of("faultcode").unwrap_or("unknown").to_string(),
                    message: fault.text_of("faultstring").unwrap_or("").to_string(),
                });
            }
        }

        if !status.is_success() {
            return Err(SoapError::Status {
                status: status.as_u16(),
                body: truncate(&text, 512),
            });
        }

        let root = parsed?;
        let body = root
            .find("Body")
            .ok_or_else(|| SoapError::Malformed("missing SOAP Body".to_string()))?;
        body.children
            .first()
            .cloned()
            .ok_or_else(|| SoapError::Malformed("empty SOAP Body".to_string()))
    }
}

pub fn envelope<T: Serialize>(operation: &T) -> Result<String, SoapError> {
    let payload = quick_xml::se::to_string(operation)
        .map_err(|e| SoapError::Malformed(format!("could not serialize request: {}", e)))?;
    Ok(format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="{}"><soap:Header/><soap:Body>{}</soap:Body></soap:Envelope>"#,
        SOAP_ENVELOPE_NS, payload
    ))
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::wire::{FeDummy, WSFE_NAMESPACE};

    #[test]
    fn test_envelope_wraps_operation() {
        let xml = envelope(&FeDummy { xmlns: WSFE_NAMESPACE }).unwrap();
        assert!(xml.contains(r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#));
        assert!(xml.contains(r#"<soap:Body><FEDummy xmlns="http://ar.gov.afip.dif.FEV1/""#));
        assert!(xml.ends_with("</soap:Body></soap:Envelope>"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("ñandú", 2), "ñ...");
    }
}
