#![allow(dead_code)]

use afip_fe::adapters::soap::SoapTransport;
use afip_fe::core::{CredentialBroker, Orchestrator, WsfeClient};
use afip_fe::domain::model::TenantProfile;
use afip_fe::domain::ports::CmsSigner;
use afip_fe::JsonFileOutcomeStore;
use chrono::{Duration, Utc};
use httpmock::MockServer;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const WSFE_ACTION_PREFIX: &str = "http://ar.gov.afip.dif.FEV1/";

/// Passes the document through unsigned; the mock server never checks it.
#[derive(Default)]
pub struct FakeSigner {
    pub calls: AtomicUsize,
}

impl CmsSigner for FakeSigner {
    fn sign(&self, _tenant: &TenantProfile, content: &[u8]) -> afip_fe::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(content.to_vec())
    }
}

pub fn tenant() -> TenantProfile {
    TenantProfile {
        tenant_id: "shop-1".to_string(),
        issuer_cuit: 20409378472,
        default_sale_point: 1,
        certificate_path: PathBuf::from("unused-cert.pem"),
        private_key_path: PathBuf::from("unused-key.pem"),
    }
}

pub fn action(operation: &str) -> String {
    format!("\"{}{}\"", WSFE_ACTION_PREFIX, operation)
}

fn escape(xml: &str) -> String {
    xml.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn soap(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>{}</soap:Body></soap:Envelope>"#,
        body
    )
}

/// A `loginCmsResponse` whose ticket expires `valid_for` from now.
pub fn login_response(token: &str, valid_for: Duration) -> String {
    let now = Utc::now().with_timezone(&afip_fe::domain::model::authority_offset());
    let ticket = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><loginTicketResponse version="1.0"><header><source>CN=wsaahomo</source><destination>SERIALNUMBER=CUIT 20409378472</destination><uniqueId>1</uniqueId><generationTime>{}</generationTime><expirationTime>{}</expirationTime></header><credentials><token>{}</token><sign>SIGN-{}</sign></credentials></loginTicketResponse>"#,
        now.to_rfc3339(),
        (now + valid_for).to_rfc3339(),
        token,
        token
    );
    soap(&format!(
        r#"<loginCmsResponse xmlns="http://wsaa.view.sua.dvadac.desein.afip.gov"><loginCmsReturn>{}</loginCmsReturn></loginCmsResponse>"#,
        escape(&ticket)
    ))
}

pub fn soap_fault(message: &str) -> String {
    soap(&format!(
        "<soap:Fault><faultcode>soap:Server</faultcode><faultstring>{}</faultstring></soap:Fault>",
        message
    ))
}

pub fn last_authorized_response(number: u64) -> String {
    soap(&format!(
        r#"<FECompUltimoAutorizadoResponse xmlns="http://ar.gov.afip.dif.FEV1/"><FECompUltimoAutorizadoResult><PtoVta>1</PtoVta><CbteTipo>6</CbteTipo><CbteNro>{}</CbteNro></FECompUltimoAutorizadoResult></FECompUltimoAutorizadoResponse>"#,
        number
    ))
}

pub fn wsfe_error_response(operation: &str, code: i64, message: &str) -> String {
    soap(&format!(
        r#"<{op}Response xmlns="http://ar.gov.afip.dif.FEV1/"><{op}Result><Errors><Err><Code>{code}</Code><Msg>{msg}</Msg></Err></Errors></{op}Result></{op}Response>"#,
        op = operation,
        code = code,
        msg = message
    ))
}

pub fn approved_response(number: u64, cae: &str) -> String {
    soap(&format!(
        r#"<FECAESolicitarResponse xmlns="http://ar.gov.afip.dif.FEV1/"><FECAESolicitarResult><FeCabResp><Cuit>20409378472</Cuit><PtoVta>1</PtoVta><CbteTipo>6</CbteTipo><FchProceso>20240301101500</FchProceso><CantReg>1</CantReg><Resultado>A</Resultado><Reproceso>N</Reproceso></FeCabResp><FeDetResp><FECAEDetResponse><Concepto>1</Concepto><DocTipo>99</DocTipo><DocNro>0</DocNro><CbteDesde>{n}</CbteDesde><CbteHasta>{n}</CbteHasta><CbteFch>20240301</CbteFch><Resultado>A</Resultado><CAE>{cae}</CAE><CAEFchVto>20240311</CAEFchVto></FECAEDetResponse></FeDetResp></FECAESolicitarResult></FECAESolicitarResponse>"#,
        n = number,
        cae = cae
    ))
}

pub fn rejected_response(number: u64) -> String {
    soap(&format!(
        r#"<FECAESolicitarResponse xmlns="http://ar.gov.afip.dif.FEV1/"><FECAESolicitarResult><FeCabResp><Cuit>20409378472</Cuit><PtoVta>1</PtoVta><CbteTipo>6</CbteTipo><CantReg>1</CantReg><Resultado>R</Resultado><Reproceso>N</Reproceso></FeCabResp><FeDetResp><FECAEDetResponse><Concepto>1</Concepto><DocTipo>99</DocTipo><DocNro>0</DocNro><CbteDesde>{n}</CbteDesde><CbteHasta>{n}</CbteHasta><CbteFch>20240301</CbteFch><Resultado>R</Resultado><Observaciones><Obs><Code>10048</Code><Msg>El campo ImpTotal no coincide</Msg></Obs></Observaciones></FECAEDetResponse></FeDetResp><Errors><Err><Code>10016</Code><Msg>El numero o fecha del comprobante no se corresponde con el proximo a autorizar</Msg></Err></Errors></FECAESolicitarResult></FECAESolicitarResponse>"#,
        n = number
    ))
}

/// Partially approved: a CAE is issued together with an observation.
pub fn partial_response(number: u64, cae: &str) -> String {
    soap(&format!(
        r#"<FECAESolicitarResponse xmlns="http://ar.gov.afip.dif.FEV1/"><FECAESolicitarResult><FeCabResp><Cuit>20409378472</Cuit><PtoVta>1</PtoVta><CbteTipo>6</CbteTipo><CantReg>1</CantReg><Resultado>P</Resultado><Reproceso>N</Reproceso></FeCabResp><FeDetResp><FECAEDetResponse><Concepto>1</Concepto><DocTipo>99</DocTipo><DocNro>0</DocNro><CbteDesde>{n}</CbteDesde><CbteHasta>{n}</CbteHasta><CbteFch>20240301</CbteFch><Resultado>P</Resultado><Observaciones><Obs><Code>10217</Code><Msg>El receptor no informa condicion frente al IVA</Msg></Obs></Observaciones><CAE>{cae}</CAE><CAEFchVto>20240311</CAEFchVto></FECAEDetResponse></FeDetResp></FECAESolicitarResult></FECAESolicitarResponse>"#,
        n = number,
        cae = cae
    ))
}

/// Marked approved but carrying no CAE, only an observation.
pub fn approved_without_cae_response(number: u64) -> String {
    soap(&format!(
        r#"<FECAESolicitarResponse xmlns="http://ar.gov.afip.dif.FEV1/"><FECAESolicitarResult><FeCabResp><Cuit>20409378472</Cuit><PtoVta>1</PtoVta><CbteTipo>6</CbteTipo><CantReg>1</CantReg><Resultado>A</Resultado><Reproceso>N</Reproceso></FeCabResp><FeDetResp><FECAEDetResponse><Concepto>1</Concepto><DocTipo>99</DocTipo><DocNro>0</DocNro><CbteDesde>{n}</CbteDesde><CbteHasta>{n}</CbteHasta><CbteFch>20240301</CbteFch><Resultado>A</Resultado><Observaciones><Obs><Code>10063</Code><Msg>Fecha de comprobante fuera de rango</Msg></Obs></Observaciones><CAE></CAE><CAEFchVto></CAEFchVto></FECAEDetResponse></FeDetResp></FECAESolicitarResult></FECAESolicitarResponse>"#,
        n = number
    ))
}

pub fn dummy_response() -> String {
    soap(r#"<FEDummyResponse xmlns="http://ar.gov.afip.dif.FEV1/"><FEDummyResult><AppServer>OK</AppServer><DbServer>OK</DbServer><AuthServer>OK</AuthServer></FEDummyResult></FEDummyResponse>"#)
}

pub fn broker(server: &MockServer, signer: Arc<FakeSigner>) -> CredentialBroker {
    CredentialBroker::new(
        SoapTransport::new(server.url("/wsaa"), std::time::Duration::from_secs(5)),
        signer,
    )
}

pub fn wsfe_client(server: &MockServer) -> WsfeClient {
    WsfeClient::new(SoapTransport::new(server.url("/wsfe"), std::time::Duration::from_secs(5)))
}

pub fn orchestrator(
    server: &MockServer,
    outcomes: &Path,
) -> Orchestrator<WsfeClient, JsonFileOutcomeStore> {
    Orchestrator::new(
        Arc::new(broker(server, Arc::new(FakeSigner::default()))),
        Arc::new(wsfe_client(server)),
        JsonFileOutcomeStore::new(outcomes),
    )
}
