use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvoicingError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Authentication against {endpoint} failed: {message}")]
    AuthenticationError { endpoint: String, message: String },

    #[error("Validation failed for '{field}': {message}")]
    ValidationError { field: String, message: String },

    #[error("Transport failure against {endpoint}: {message}")]
    TransportError { endpoint: String, message: String },

    #[error("Sale {sale_id} is already authorized with CAE {cae}")]
    AlreadyAuthorizedError { sale_id: String, cae: String },

    #[error("Sale {sale_id} is already being authorized")]
    AuthorizationInFlight { sale_id: String },

    #[error("Failed to persist outcome for sale {sale_id}: {message}")]
    PersistenceError { sale_id: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    Validation,
    Transport,
    Idempotency,
    Persistence,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl InvoicingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportError {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn authentication(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthenticationError {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::AuthenticationError { .. } => ErrorCategory::Authentication,
            Self::ValidationError { .. } => ErrorCategory::Validation,
            Self::TransportError { .. } => ErrorCategory::Transport,
            Self::AlreadyAuthorizedError { .. } | Self::AuthorizationInFlight { .. } => {
                ErrorCategory::Idempotency
            }
            Self::PersistenceError { .. } => ErrorCategory::Persistence,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Idempotency => ErrorSeverity::Low,
            ErrorCategory::Authentication | ErrorCategory::Transport => ErrorSeverity::Medium,
            ErrorCategory::Validation => ErrorSeverity::High,
            ErrorCategory::Configuration
            | ErrorCategory::Persistence
            | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    ///
    /// A retried authorization must still derive a fresh invoice number.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Authentication | ErrorCategory::Transport
        ) || matches!(self, Self::AuthorizationInFlight { .. })
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::ConfigError { .. } => {
                "Check that the signing certificate and private key exist, are readable and are PEM encoded".to_string()
            }
            Self::InvalidConfigValueError { field, .. } => {
                format!("Correct the value of '{}' in the configuration file", field)
            }
            Self::MissingConfigError { field } => {
                format!("Add '{}' to the configuration file or environment", field)
            }
            Self::AuthenticationError { message, .. } if message.contains("alreadyAuthenticated") => {
                "The Authority already issued a valid ticket for this certificate; reuse it or wait for it to expire".to_string()
            }
            Self::AuthenticationError { .. } => {
                "Verify the certificate is associated with the service in the Authority portal and retry".to_string()
            }
            Self::ValidationError { field, .. } => {
                format!("Correct '{}' on the sale and submit it again", field)
            }
            Self::TransportError { .. } => {
                "Retry later; the invoice number will be re-derived from the Authority before resubmitting".to_string()
            }
            Self::AlreadyAuthorizedError { .. } => {
                "No action needed: the sale already has an authorized invoice".to_string()
            }
            Self::AuthorizationInFlight { .. } => {
                "Wait for the running authorization to finish before retrying".to_string()
            }
            Self::PersistenceError { .. } => {
                "Record the CAE manually and check the outcome storage location".to_string()
            }
            Self::IoError(_) => "Check file permissions and available disk space".to_string(),
            Self::SerializationError(_) => "Check the input document is valid JSON".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Authentication => {
                format!("Could not authenticate with the tax authority: {}", self)
            }
            ErrorCategory::Validation => format!("The sale cannot be invoiced as is: {}", self),
            ErrorCategory::Transport => format!("The tax authority could not be reached: {}", self),
            ErrorCategory::Idempotency => self.to_string(),
            ErrorCategory::Persistence => format!("Invoice outcome not saved: {}", self),
            ErrorCategory::System => format!("Unexpected system error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, InvoicingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = InvoicingError::transport("https://wsfe", "timed out");
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_validation_and_config_errors_are_not_retryable() {
        assert!(!InvoicingError::validation("customer.tax_id", "bad checksum").is_retryable());
        let config = InvoicingError::ConfigError {
            message: "cannot read cert.pem".to_string(),
        };
        assert!(!config.is_retryable());
        assert_eq!(config.severity(), ErrorSeverity::Critical);
        assert!(config.recovery_suggestion().contains("certificate"));
    }

    #[test]
    fn test_already_authorized_is_idempotency() {
        let err = InvoicingError::AlreadyAuthorizedError {
            sale_id: "S-1".to_string(),
            cae: "12345678901234".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Idempotency);
        assert!(err.user_friendly_message().contains("12345678901234"));
    }
}
