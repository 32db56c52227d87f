//! CMS/PKCS#7 signed-data over the login ticket request, backed by OpenSSL.

use crate::domain::model::TenantProfile;
use crate::domain::ports::CmsSigner;
use crate::utils::error::{InvoicingError, Result};
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::X509;
use std::path::Path;

/// Reads the tenant's PEM certificate and private key on every signature.
///
/// Tickets are requested at most a few times a day, so material is not cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpensslCmsSigner;

impl OpensslCmsSigner {
    pub fn new() -> Self {
        Self
    }

    fn load_certificate(path: &Path) -> Result<X509> {
        let pem = read_material(path, "certificate")?;
        X509::from_pem(&pem).map_err(|e| InvoicingError::ConfigError {
            message: format!("Certificate {} is not valid PEM: {}", path.display(), e),
        })
    }

    fn load_private_key(path: &Path) -> Result<PKey<Private>> {
        let pem = read_material(path, "private key")?;
        PKey::private_key_from_pem(&pem).map_err(|e| InvoicingError::ConfigError {
            message: format!("Private key {} is not valid PEM: {}", path.display(), e),
        })
    }
}

fn read_material(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| InvoicingError::ConfigError {
        message: format!("Cannot read {} at {}: {}", what, path.display(), e),
    })
}

impl CmsSigner for OpensslCmsSigner {
    fn sign(&self, tenant: &TenantProfile, content: &[u8]) -> Result<Vec<u8>> {
        let certificate = Self::load_certificate(&tenant.certificate_path)?;
        let key = Self::load_private_key(&tenant.private_key_path)?;

        let extra = Stack::new().map_err(signing_error)?;
        // 內容需內嵌於 signed-data 中 (不可使用 DETACHED)
        let signed = Pkcs7::sign(&certificate, &key, &extra, content, Pkcs7Flags::BINARY)
            .map_err(signing_error)?;
        let der = signed.to_der().map_err(signing_error)?;

        tracing::debug!(tenant = %tenant.tenant_id, bytes = der.len(), "CMS signed-data produced");
        Ok(der)
    }
}

fn signing_error(err: openssl::error::ErrorStack) -> InvoicingError {
    InvoicingError::ConfigError {
        message: format!("CMS signing failed: {}", err),
    }
}
