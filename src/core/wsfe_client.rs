use crate::adapters::soap::SoapTransport;
use crate::adapters::xml::XmlNode;
use crate::core::response_interpreter::{self as interpreter, InterpretError};
use crate::domain::model::InvoiceType;
use crate::domain::ports::FiscalGateway;
use crate::domain::wire::{
    FeCompConsReq, FeCompConsultar, FeCompUltimoAutorizado, FeDummy, FeParamGetPtosVenta,
    InvoiceRecord, InvoiceRequest, InvoiceResponse, SalePointInfo, ServerStatus, WsfeAuth,
    WSFE_NAMESPACE,
};
use crate::utils::error::{InvoicingError, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Client for the invoicing service (WSFEv1).
///
/// No call is retried here: a repeated `FECAESolicitar` after a timeout could
/// authorize the same number twice.
pub struct WsfeClient {
    transport: SoapTransport,
}

impl WsfeClient {
    pub fn new(transport: SoapTransport) -> Self {
        Self { transport }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    async fn invoke<T: Serialize>(&self, operation: &str, body: &T) -> Result<XmlNode> {
        let action = format!("{}{}", WSFE_NAMESPACE, operation);
        self.transport.call(&action, body).await.map_err(|e| {
            tracing::error!(endpoint = %self.endpoint(), operation, error = %e, "❌ Invoicing service call failed");
            InvoicingError::transport(self.endpoint(), format!("{}: {}", operation, e))
        })
    }

    /// 600/601 become authentication errors so the caller can drop its ticket;
    /// other service errors mean the request itself was refused.
    fn interpret_error(&self, operation: &str, err: InterpretError) -> InvoicingError {
        let message = format!("{}: {}", operation, err);
        if err.is_auth_failure() {
            return InvoicingError::authentication(self.endpoint(), message);
        }
        match err {
            InterpretError::Authority(_) => InvoicingError::validation(operation, message),
            InterpretError::Malformed(_) => InvoicingError::transport(self.endpoint(), message),
        }
    }
}

#[async_trait]
impl FiscalGateway for WsfeClient {
    async fn server_status(&self) -> ServerStatus {
        match self
            .invoke("FEDummy", &FeDummy { xmlns: WSFE_NAMESPACE })
            .await
        {
            Ok(payload) => interpreter::interpret_dummy(&payload),
            Err(e) => {
                tracing::warn!(error = %e, "Health probe failed, reporting all components as down");
                ServerStatus::unavailable()
            }
        }
    }

    async fn last_authorized_number(
        &self,
        auth: &WsfeAuth,
        invoice_type: InvoiceType,
        sale_point: u32,
    ) -> Result<u64> {
        let operation = FeCompUltimoAutorizado {
            xmlns: WSFE_NAMESPACE,
            auth: auth.clone(),
            sale_point,
            invoice_type: invoice_type.code(),
        };
        let payload = self.invoke("FECompUltimoAutorizado", &operation).await?;
        let last = interpreter::interpret_last_authorized(&payload)
            .map_err(|e| self.interpret_error("FECompUltimoAutorizado", e))?;

        tracing::debug!(invoice_type = invoice_type.code(), sale_point, last, "Last authorized number");
        Ok(last)
    }

    async fn authorize(&self, auth: &WsfeAuth, request: &InvoiceRequest) -> Result<InvoiceResponse> {
        let operation = request.clone().into_operation(auth.clone());
        let payload = self.invoke("FECAESolicitar", &operation).await?;
        interpreter::interpret_cae(&payload).map_err(|e| self.interpret_error("FECAESolicitar", e))
    }

    async fn query_invoice(
        &self,
        auth: &WsfeAuth,
        invoice_type: InvoiceType,
        sale_point: u32,
        number: u64,
    ) -> Result<Option<InvoiceRecord>> {
        let operation = FeCompConsultar {
            xmlns: WSFE_NAMESPACE,
            auth: auth.clone(),
            request: FeCompConsReq {
                invoice_type: invoice_type.code(),
                number,
                sale_point,
            },
        };
        let payload = self.invoke("FECompConsultar", &operation).await?;
        interpreter::interpret_query(&payload).map_err(|e| self.interpret_error("FECompConsultar", e))
    }

    async fn sale_points(&self, auth: &WsfeAuth) -> Result<Vec<SalePointInfo>> {
        let operation = FeParamGetPtosVenta {
            xmlns: WSFE_NAMESPACE,
            auth: auth.clone(),
        };
        let payload = self.invoke("FEParamGetPtosVenta", &operation).await?;
        interpreter::interpret_sale_points(&payload)
            .map_err(|e| self.interpret_error("FEParamGetPtosVenta", e))
    }
}
