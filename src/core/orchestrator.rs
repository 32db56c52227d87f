use crate::adapters::signer::OpensslCmsSigner;
use crate::adapters::soap::SoapTransport;
use crate::core::credentials::CredentialBroker;
use crate::core::numbering::NumberingCoordinator;
use crate::core::wsfe_client::WsfeClient;
use crate::domain::model::{
    authority_today, AuthorizationResult, AuthorizationStage, InvoiceOutcome,
    InvoiceType, SaleSnapshot, TenantProfile,
};
use crate::domain::ports::{ConfigProvider, FiscalGateway, OutcomeStore};
use crate::domain::services::document_validator::{format_invoice_number, parse_tax_id};
use crate::domain::services::qr_builder::QrPayload;
use crate::domain::services::request_mapper::RequestMapper;
use crate::domain::wire::{
    AuthorityResult, InvoiceRecord, InvoiceRequest, InvoiceResponse, SalePointInfo, ServerStatus, WsfeAuth,
    WSFE_SERVICE,
};
use crate::utils::error::{InvoicingError, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Builds the issuer profile from configuration.
pub fn tenant_from_config(config: &dyn ConfigProvider) -> Result<TenantProfile> {
    Ok(TenantProfile {
        tenant_id: config.tenant_id().to_string(),
        issuer_cuit: parse_tax_id("issuer.cuit", config.issuer_cuit())?,
        default_sale_point: config.default_sale_point(),
        certificate_path: config.certificate_path().to_path_buf(),
        private_key_path: config.private_key_path().to_path_buf(),
    })
}

/// Removes the sale from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    sale_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.sale_id);
    }
}

/// Sequences ticket, numbering, mapping, submission and persistence for one sale.
pub struct Orchestrator<G: FiscalGateway, S: OutcomeStore> {
    broker: Arc<CredentialBroker>,
    gateway: Arc<G>,
    numbering: NumberingCoordinator<G>,
    store: S,
    in_flight: Mutex<HashSet<String>>,
}

impl<S: OutcomeStore> Orchestrator<WsfeClient, S> {
    /// Wires the real SOAP clients and the OpenSSL signer from configuration.
    pub fn from_config(config: &dyn ConfigProvider, store: S) -> Self {
        let broker = CredentialBroker::new(
            SoapTransport::new(config.wsaa_endpoint(), config.auth_timeout()),
            Arc::new(OpensslCmsSigner::new()),
        );
        let client = WsfeClient::new(SoapTransport::new(
            config.wsfe_endpoint(),
            config.invoice_timeout(),
        ));
        Self::new(Arc::new(broker), Arc::new(client), store)
    }
}

impl<G: FiscalGateway, S: OutcomeStore> Orchestrator<G, S> {
    pub fn new(broker: Arc<CredentialBroker>, gateway: Arc<G>, store: S) -> Self {
        Self {
            broker,
            numbering: NumberingCoordinator::new(gateway.clone()),
            gateway,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn broker(&self) -> &CredentialBroker {
        &self.broker
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn stage(sale_id: &str, stage: AuthorizationStage) {
        tracing::debug!(sale_id, stage = ?stage, "Authorization stage");
    }

    fn enter_flight(&self, sale_id: &str) -> Result<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(sale_id.to_string()) {
            return Err(InvoicingError::AuthorizationInFlight {
                sale_id: sale_id.to_string(),
            });
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            sale_id: sale_id.to_string(),
        })
    }

    async fn auth(&self, tenant: &TenantProfile) -> Result<WsfeAuth> {
        self.broker.wsfe_auth(tenant).await
    }

    /// A ticket the service refuses (600/601) is dropped so the next call logs in again.
    async fn check_auth<T>(&self, tenant: &TenantProfile, result: Result<T>) -> Result<T> {
        if let Err(InvoicingError::AuthenticationError { .. }) = &result {
            self.broker.invalidate(&tenant.tenant_id, WSFE_SERVICE).await;
        }
        result
    }

    /// Idempotency checks that need no network: the snapshot's own outcome, then the store.
    async fn ensure_not_authorized(&self, sale: &SaleSnapshot) -> Result<()> {
        if let Some(cae) = sale.existing_outcome.as_ref().and_then(InvoiceOutcome::cae) {
            return Err(InvoicingError::AlreadyAuthorizedError {
                sale_id: sale.sale_id.clone(),
                cae: cae.to_string(),
            });
        }
        if let Some(outcome) = self.store.find_outcome(&sale.sale_id).await? {
            if let Some(cae) = outcome.cae() {
                return Err(InvoicingError::AlreadyAuthorizedError {
                    sale_id: sale.sale_id.clone(),
                    cae: cae.to_string(),
                });
            }
        }
        Ok(())
    }

    pub async fn authorize_invoice(
        &self,
        tenant: &TenantProfile,
        sale: &SaleSnapshot,
    ) -> Result<AuthorizationResult> {
        let sale_id = sale.sale_id.as_str();
        Self::stage(sale_id, AuthorizationStage::Requested);

        // 先做所有不需網路的檢查
        self.ensure_not_authorized(sale).await?;
        let _flight = self.enter_flight(sale_id)?;
        let mapper = RequestMapper::new(tenant.issuer_cuit, tenant.default_sale_point);
        let prepared = mapper.prepare(sale, authority_today())?;

        let auth = self.auth(tenant).await?;
        Self::stage(sale_id, AuthorizationStage::Authenticated);

        let reservation = self
            .numbering
            .reserve(&tenant.tenant_id, &auth, prepared.invoice_type, prepared.sale_point)
            .await;
        let reservation = self.check_auth(tenant, reservation).await?;
        Self::stage(sale_id, AuthorizationStage::Numbered);

        let request = prepared.with_number(reservation.number);
        let formatted = format_invoice_number(request.sale_point(), request.number());
        Self::stage(sale_id, AuthorizationStage::Built);

        tracing::info!(
            tenant = %tenant.tenant_id,
            sale_id,
            invoice_type = request.invoice_type(),
            invoice = %formatted,
            "📤 Submitting invoice for authorization"
        );
        let response = match self.gateway.authorize(&auth, &request).await {
            Ok(response) => response,
            Err(e @ InvoicingError::AuthenticationError { .. }) => {
                // 票證被拒，發票未經審查
                tracing::warn!(sale_id, invoice = %formatted, error = %e, "Ticket refused at submission");
                return self.check_auth(tenant, Err(e)).await;
            }
            Err(e) => {
                // 結果不明：不寫入任何紀錄，重試時會重新查詢編號
                tracing::error!(sale_id, invoice = %formatted, error = %e, "Submission failed; outcome unknown");
                return Err(e);
            }
        };
        Self::stage(sale_id, AuthorizationStage::Submitted);
        drop(reservation);

        let result = Self::decide(tenant, sale_id, &request, formatted, response);
        Self::stage(sale_id, result.decision);

        let outcome = outcome_of(&result);
        self.store
            .record_outcome(sale_id, &outcome)
            .await
            .map_err(|e| persistence_error(sale_id, &result, e))?;
        Self::stage(sale_id, AuthorizationStage::Persisted);

        Ok(result)
    }

    fn decide(
        tenant: &TenantProfile,
        sale_id: &str,
        request: &InvoiceRequest,
        formatted: String,
        response: InvoiceResponse,
    ) -> AuthorizationResult {
        let approved = matches!(response.result, AuthorityResult::Approved | AuthorityResult::Partial);
        let cae = response.cae.clone().filter(|c| !c.is_empty());

        match (approved, cae, response.cae_expiration) {
            (true, Some(cae), Some(expiration)) => {
                let decision = if response.result == AuthorityResult::Partial {
                    AuthorizationStage::PartiallyApproved
                } else {
                    AuthorizationStage::Approved
                };
                let qr_url = QrPayload::new(tenant.issuer_cuit, request, &cae)
                    .and_then(|payload| payload.to_url())
                    .map_err(|e| tracing::warn!(sale_id, error = %e, "QR payload could not be built"))
                    .ok();

                tracing::info!(
                    sale_id,
                    invoice = %formatted,
                    cae = %cae,
                    observations = response.observations.len(),
                    "✅ Invoice authorized"
                );
                AuthorizationResult {
                    success: true,
                    decision,
                    cae: Some(cae),
                    cae_expiration: Some(expiration),
                    formatted_invoice_number: Some(formatted),
                    errors: response.errors,
                    observations: response.observations,
                    events: response.events,
                    qr_url,
                }
            }
            _ => {
                let mut errors = response.errors;
                if errors.is_empty() {
                    // 無錯誤碼但也沒有 CAE，以觀察訊息作為拒絕原因
                    errors = response.observations.clone();
                }
                let codes: Vec<i64> = errors.iter().map(|e| e.code).collect();
                tracing::warn!(sale_id, invoice = %formatted, codes = ?codes, "⚠️ Invoice rejected by the Authority");
                AuthorizationResult {
                    success: false,
                    decision: AuthorizationStage::Rejected,
                    cae: None,
                    cae_expiration: None,
                    formatted_invoice_number: None,
                    errors,
                    observations: response.observations,
                    events: response.events,
                    qr_url: None,
                }
            }
        }
    }

    /// Looks up an invoice at the Authority and, when it holds a CAE, returns the
    /// outcome it corresponds to. With a `sale_id`, that outcome is also recorded.
    ///
    /// This is how an authorization whose submission timed out gets resolved.
    pub async fn reconcile(
        &self,
        tenant: &TenantProfile,
        invoice_type: InvoiceType,
        sale_point: u32,
        number: u64,
        sale_id: Option<&str>,
    ) -> Result<Option<InvoiceOutcome>> {
        let record = self.query(tenant, invoice_type, sale_point, number).await?;
        let outcome = record.and_then(|r| authorized_outcome(&r));

        match (&outcome, sale_id) {
            (Some(found), Some(sale_id)) => {
                self.store.record_outcome(sale_id, found).await?;
                tracing::info!(sale_id, invoice = %format_invoice_number(sale_point, number), "🔁 Reconciled authorized invoice");
            }
            (None, _) => {
                tracing::info!(invoice = %format_invoice_number(sale_point, number), "No authorized invoice found");
            }
            _ => {}
        }
        Ok(outcome)
    }

    pub async fn server_status(&self) -> ServerStatus {
        self.gateway.server_status().await
    }

    pub async fn last_number(
        &self,
        tenant: &TenantProfile,
        invoice_type: InvoiceType,
        sale_point: u32,
    ) -> Result<u64> {
        let auth = self.auth(tenant).await?;
        let result = self
            .gateway
            .last_authorized_number(&auth, invoice_type, sale_point)
            .await;
        self.check_auth(tenant, result).await
    }

    pub async fn query(
        &self,
        tenant: &TenantProfile,
        invoice_type: InvoiceType,
        sale_point: u32,
        number: u64,
    ) -> Result<Option<InvoiceRecord>> {
        let auth = self.auth(tenant).await?;
        let result = self
            .gateway
            .query_invoice(&auth, invoice_type, sale_point, number)
            .await;
        self.check_auth(tenant, result).await
    }

    pub async fn sale_points(&self, tenant: &TenantProfile) -> Result<Vec<SalePointInfo>> {
        let auth = self.auth(tenant).await?;
        let result = self.gateway.sale_points(&auth).await;
        self.check_auth(tenant, result).await
    }
}

fn outcome_of(result: &AuthorizationResult) -> InvoiceOutcome {
    match (&result.cae, &result.cae_expiration, &result.formatted_invoice_number) {
        (Some(cae), Some(expiration), Some(number)) if result.success => InvoiceOutcome::Authorized {
            invoice_number: number.clone(),
            cae: cae.clone(),
            cae_expiration: *expiration,
            observations: result.observations.clone(),
        },
        _ => InvoiceOutcome::Rejected {
            errors: result.errors.clone(),
            observations: result.observations.clone(),
            rejected_at: Utc::now(),
        },
    }
}

fn authorized_outcome(record: &InvoiceRecord) -> Option<InvoiceOutcome> {
    let cae = record.authorization_code.clone().filter(|c| !c.is_empty())?;
    let expiration = record.authorization_expiration?;
    if matches!(record.result, Some(AuthorityResult::Rejected)) {
        return None;
    }
    Some(InvoiceOutcome::Authorized {
        invoice_number: format_invoice_number(record.sale_point, record.number),
        cae,
        cae_expiration: expiration,
        observations: record.observations.clone(),
    })
}

fn persistence_error(sale_id: &str, result: &AuthorizationResult, err: InvoicingError) -> InvoicingError {
    let message = match &result.cae {
        Some(cae) => format!("CAE {} was issued but could not be recorded: {}", cae, err),
        None => format!("rejection could not be recorded: {}", err),
    };
    tracing::error!(sale_id, %message, "Outcome persistence failed");
    InvoicingError::PersistenceError {
        sale_id: sale_id.to_string(),
        message,
    }
}
