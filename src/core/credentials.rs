use crate::adapters::soap::{SoapError, SoapTransport};
use crate::adapters::xml::XmlNode;
use crate::domain::model::{authority_offset, AuthTicket, TenantProfile};
use crate::domain::ports::CmsSigner;
use crate::domain::wire::{
    LoginCms, LoginTicketHeader, LoginTicketRequest, WsfeAuth, WSAA_NAMESPACE, WSFE_SERVICE,
};
use crate::utils::error::{InvoicingError, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_TICKET_TTL_HOURS: i64 = 12;
pub const DEFAULT_REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TicketKey {
    tenant_id: String,
    service: String,
}

impl TicketKey {
    fn new(tenant_id: &str, service: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            service: service.to_string(),
        }
    }
}

type TicketSlot = Arc<Mutex<Option<AuthTicket>>>;

/// Obtains and caches access tickets from the authentication service.
///
/// Each (tenant, service) pair owns a slot whose lock is held while
/// re-authenticating, so concurrent callers wait for one login instead of racing.
pub struct CredentialBroker {
    transport: SoapTransport,
    signer: Arc<dyn CmsSigner>,
    ticket_ttl: Duration,
    refresh_margin: Duration,
    slots: Mutex<HashMap<TicketKey, TicketSlot>>,
}

impl CredentialBroker {
    pub fn new(transport: SoapTransport, signer: Arc<dyn CmsSigner>) -> Self {
        Self {
            transport,
            signer,
            ticket_ttl: Duration::hours(DEFAULT_TICKET_TTL_HOURS),
            refresh_margin: Duration::minutes(DEFAULT_REFRESH_MARGIN_MINUTES),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    async fn slot(&self, tenant_id: &str, service: &str) -> TicketSlot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(TicketKey::new(tenant_id, service))
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Returns the cached ticket while more than the refresh margin remains; otherwise logs in.
    pub async fn get_ticket(&self, tenant: &TenantProfile, service: &str) -> Result<AuthTicket> {
        let slot = self.slot(&tenant.tenant_id, service).await;
        let mut cached = slot.lock().await;

        if let Some(ticket) = cached.as_ref() {
            if ticket.is_valid_at(Utc::now(), self.refresh_margin) {
                tracing::debug!(tenant = %tenant.tenant_id, service, "Reusing cached ticket");
                return Ok(ticket.clone());
            }
            tracing::info!(tenant = %tenant.tenant_id, service, "🔄 Ticket near expiry, re-authenticating");
        }

        let ticket = self.authenticate(tenant, service).await?;
        *cached = Some(ticket.clone());
        Ok(ticket)
    }

    /// Ticket for the invoicing service, shaped as the `Auth` block every operation carries.
    pub async fn wsfe_auth(&self, tenant: &TenantProfile) -> Result<WsfeAuth> {
        let ticket = self.get_ticket(tenant, WSFE_SERVICE).await?;
        Ok(WsfeAuth {
            token: ticket.token,
            sign: ticket.sign,
            cuit: tenant.issuer_cuit,
        })
    }

    /// Drops the cached ticket so the next request re-authenticates.
    pub async fn invalidate(&self, tenant_id: &str, service: &str) {
        let slot = self.slot(tenant_id, service).await;
        slot.lock().await.take();
        tracing::info!(tenant = tenant_id, service, "Ticket invalidated");
    }

    pub async fn clear_credentials(&self) {
        let slots: Vec<TicketSlot> = self.slots.lock().await.values().cloned().collect();
        for slot in slots {
            slot.lock().await.take();
        }
        tracing::info!("All cached tickets cleared");
    }

    pub async fn has_valid_credentials(&self, tenant_id: &str, service: &str) -> bool {
        let slot = self.slot(tenant_id, service).await;
        let cached = slot.lock().await;
        cached
            .as_ref()
            .map(|t| t.is_valid_at(Utc::now(), self.refresh_margin))
            .unwrap_or(false)
    }

    /// Remaining lifetime of the cached ticket, if any.
    pub async fn time_to_live(&self, tenant_id: &str, service: &str) -> Option<Duration> {
        let slot = self.slot(tenant_id, service).await;
        let cached = slot.lock().await;
        cached.as_ref().map(|t| t.time_to_live(Utc::now()))
    }

    async fn authenticate(&self, tenant: &TenantProfile, service: &str) -> Result<AuthTicket> {
        let endpoint = self.transport.endpoint().to_string();
        tracing::info!(tenant = %tenant.tenant_id, service, endpoint = %endpoint, "🔐 Requesting access ticket");

        let request = build_login_request(service, Utc::now(), self.ticket_ttl)?;
        // 簽章失敗屬於設定錯誤 (憑證或金鑰無法讀取)
        let cms = self.signer.sign(tenant, request.as_bytes())?;

        let operation = LoginCms {
            xmlns: WSAA_NAMESPACE,
            in0: general_purpose::STANDARD.encode(cms),
        };
        let response = self
            .transport
            .call("", &operation)
            .await
            .map_err(|e| login_error(&endpoint, e))?;

        let ticket = parse_login_response(&response, &tenant.tenant_id, service)
            .map_err(|message| InvoicingError::authentication(&endpoint, message))?;

        tracing::info!(
            tenant = %tenant.tenant_id,
            service,
            expires_at = %ticket.expires_at,
            "✅ Access ticket obtained"
        );
        Ok(ticket)
    }
}

fn login_error(endpoint: &str, err: SoapError) -> InvoicingError {
    tracing::error!(endpoint, error = %err, "Authentication request failed");
    InvoicingError::authentication(endpoint, err.to_string())
}

/// Serialized `loginTicketRequest` document, ready to sign.
pub fn build_login_request(service: &str, now: DateTime<Utc>, ttl: Duration) -> Result<String> {
    let local = now.with_timezone(&authority_offset());
    let request = LoginTicketRequest {
        version: "1.0",
        header: LoginTicketHeader {
            unique_id: now.timestamp().clamp(0, u32::MAX as i64) as u32,
            generation_time: local.to_rfc3339_opts(SecondsFormat::Secs, false),
            expiration_time: (local + ttl).to_rfc3339_opts(SecondsFormat::Secs, false),
        },
        service: service.to_string(),
    };
    let body = quick_xml::se::to_string(&request).map_err(|e| InvoicingError::ConfigError {
        message: format!("Cannot serialize login ticket request: {}", e),
    })?;
    Ok(format!(r#"<?xml version="1.0" encoding="UTF-8"?>{}"#, body))
}

/// Extracts token, sign and expiration from a `loginCmsResponse` payload.
///
/// The ticket arrives as an escaped XML document inside `loginCmsReturn`.
pub fn parse_login_response(
    response: &XmlNode,
    tenant_id: &str,
    service: &str,
) -> std::result::Result<AuthTicket, String> {
    let inner = response
        .find("loginCmsReturn")
        .map(|n| n.text.trim())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "response has no loginCmsReturn".to_string())?;
    let document = XmlNode::parse(inner).map_err(|e| e.to_string())?;

    let field = |name: &str| -> std::result::Result<String, String> {
        document
            .find(name)
            .map(|n| n.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| format!("login ticket response is missing '{}'", name))
    };

    let token = field("token")?;
    let sign = field("sign")?;
    let expiration = field("expirationTime")?;
    let expires_at = DateTime::parse_from_rfc3339(&expiration)
        .map_err(|e| format!("invalid expirationTime '{}': {}", expiration, e))?;

    Ok(AuthTicket {
        tenant_id: tenant_id.to_string(),
        service: service.to_string(),
        token,
        sign,
        expires_at,
    })
}
