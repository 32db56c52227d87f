use crate::domain::ports::{ConfigProvider, Environment};
use crate::domain::services::document_validator::validate_tax_id;
use crate::utils::error::{InvoicingError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_AUTH_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_INVOICE_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_OUTCOME_PATH: &str = "./outcomes";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub authority: AuthorityConfig,
    pub issuer: IssuerConfig,
    pub storage: Option<StorageConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorityConfig {
    #[serde(default)]
    pub environment: Environment,
    pub wsaa_endpoint: Option<String>,
    pub wsfe_endpoint: Option<String>,
    pub auth_timeout_seconds: Option<u64>,
    pub invoice_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    pub cuit: String,
    #[serde(default = "default_sale_point")]
    pub default_sale_point: u32,
    pub certificate_path: String,
    pub private_key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub outcome_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_tenant() -> String {
    "default".to_string()
}

fn default_sale_point() -> u32 {
    1
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| InvoicingError::ConfigError {
            message: format!("Cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| InvoicingError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${AFIP_CERT_PATH})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| InvoicingError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 取得結果儲存目錄
    pub fn outcome_path(&self) -> &str {
        self.storage
            .as_ref()
            .map(|s| s.outcome_path.as_str())
            .unwrap_or(DEFAULT_OUTCOME_PATH)
    }

    pub fn log_format(&self) -> LogFormat {
        self.logging.as_ref().map(|l| l.format).unwrap_or_default()
    }
}

impl ConfigProvider for TomlConfig {
    fn environment(&self) -> Environment {
        self.authority.environment
    }

    fn tenant_id(&self) -> &str {
        &self.issuer.tenant_id
    }

    fn issuer_cuit(&self) -> &str {
        &self.issuer.cuit
    }

    fn default_sale_point(&self) -> u32 {
        self.issuer.default_sale_point
    }

    fn certificate_path(&self) -> &Path {
        Path::new(&self.issuer.certificate_path)
    }

    fn private_key_path(&self) -> &Path {
        Path::new(&self.issuer.private_key_path)
    }

    fn auth_timeout(&self) -> Duration {
        Duration::from_secs(
            self.authority
                .auth_timeout_seconds
                .unwrap_or(DEFAULT_AUTH_TIMEOUT_SECONDS),
        )
    }

    fn invoice_timeout(&self) -> Duration {
        Duration::from_secs(
            self.authority
                .invoice_timeout_seconds
                .unwrap_or(DEFAULT_INVOICE_TIMEOUT_SECONDS),
        )
    }

    fn wsaa_endpoint(&self) -> &str {
        self.authority
            .wsaa_endpoint
            .as_deref()
            .unwrap_or_else(|| self.environment().wsaa_url())
    }

    fn wsfe_endpoint(&self) -> &str {
        self.authority
            .wsfe_endpoint
            .as_deref()
            .unwrap_or_else(|| self.environment().wsfe_url())
    }
}

impl Validate for TomlConfig {
    /// 驗證配置的合理性
    fn validate(&self) -> Result<()> {
        // 驗證端點覆寫
        if let Some(endpoint) = &self.authority.wsaa_endpoint {
            validation::validate_url("authority.wsaa_endpoint", endpoint)?;
        }
        if let Some(endpoint) = &self.authority.wsfe_endpoint {
            validation::validate_url("authority.wsfe_endpoint", endpoint)?;
        }

        if let Some(seconds) = self.authority.auth_timeout_seconds {
            validation::validate_range("authority.auth_timeout_seconds", seconds, 1, 600)?;
        }
        if let Some(seconds) = self.authority.invoice_timeout_seconds {
            validation::validate_range("authority.invoice_timeout_seconds", seconds, 1, 600)?;
        }

        // 驗證開立人資料
        validation::validate_non_empty_string("issuer.tenant_id", &self.issuer.tenant_id)?;
        if !validate_tax_id(&self.issuer.cuit) {
            return Err(InvoicingError::InvalidConfigValueError {
                field: "issuer.cuit".to_string(),
                value: self.issuer.cuit.clone(),
                reason: "Not a valid CUIT (11 digits with a matching check digit)".to_string(),
            });
        }
        validation::validate_range("issuer.default_sale_point", self.issuer.default_sale_point, 1, 99_999)?;

        // 驗證憑證路徑
        validation::validate_path("issuer.certificate_path", &self.issuer.certificate_path)?;
        validation::validate_path("issuer.private_key_path", &self.issuer.private_key_path)?;

        validation::validate_path("storage.outcome_path", self.outcome_path())?;
        Ok(())
    }
}
