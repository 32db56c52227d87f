use crate::utils::error::{InvoicingError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(InvoicingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(InvoicingError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(InvoicingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(InvoicingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(InvoicingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    // An unexpanded ${VAR} means the environment variable was not set.
    if path.contains("${") {
        return Err(InvoicingError::MissingConfigError {
            field: format!("{} (unresolved variable in '{}')", field_name, path),
        });
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(InvoicingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(InvoicingError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("wsfe_endpoint", "https://wswhomo.afip.gov.ar/wsfev1/service.asmx").is_ok());
        assert!(validate_url("wsfe_endpoint", "http://localhost:8080").is_ok());
        assert!(validate_url("wsfe_endpoint", "").is_err());
        assert!(validate_url("wsfe_endpoint", "invalid-url").is_err());
        assert!(validate_url("wsfe_endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_path_rejects_unresolved_variables() {
        assert!(validate_path("certificate_path", "/etc/afip/cert.pem").is_ok());
        assert!(validate_path("certificate_path", "").is_err());
        let err = validate_path("certificate_path", "${AFIP_CERT_PATH}").unwrap_err();
        assert!(matches!(err, InvoicingError::MissingConfigError { .. }));
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("default_sale_point", 1u32, 1, 99_999).is_ok());
        assert!(validate_range("default_sale_point", 0u32, 1, 99_999).is_err());
        assert!(validate_range("default_sale_point", 100_000u32, 1, 99_999).is_err());
    }
}
