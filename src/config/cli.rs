use crate::domain::model::InvoiceOutcome;
use crate::domain::ports::OutcomeStore;
use crate::utils::error::{InvoicingError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Keeps one `{sale_id}.json` per sale under a base directory.
#[derive(Debug, Clone)]
pub struct JsonFileOutcomeStore {
    base_path: PathBuf,
}

impl JsonFileOutcomeStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path_for(&self, sale_id: &str) -> PathBuf {
        Path::new(&self.base_path).join(format!("{}.json", encode_sale_id(sale_id)))
    }
}

/// File-name form of a sale id: alphanumerics and `-` stay, every other byte
/// (including `_`) becomes `_XX`. Distinct ids never share a file and the
/// name cannot contain path separators.
fn encode_sale_id(sale_id: &str) -> String {
    let mut encoded = String::with_capacity(sale_id.len());
    for byte in sale_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("_{:02X}", byte));
        }
    }
    encoded
}

impl OutcomeStore for JsonFileOutcomeStore {
    async fn find_outcome(&self, sale_id: &str) -> Result<Option<InvoiceOutcome>> {
        let path = self.path_for(sale_id);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path)?;
        let outcome = serde_json::from_slice(&data)?;
        Ok(Some(outcome))
    }

    async fn record_outcome(&self, sale_id: &str, outcome: &InvoiceOutcome) -> Result<()> {
        let path = self.path_for(sale_id);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(outcome)?;
        fs::write(&path, data).map_err(|e| InvoicingError::PersistenceError {
            sale_id: sale_id.to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        tracing::debug!(sale_id, path = %path.display(), "Outcome recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_record_then_find() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileOutcomeStore::new(dir.path().join("outcomes"));

        assert_eq!(store.find_outcome("S-1").await.unwrap(), None);

        let outcome = InvoiceOutcome::Authorized {
            invoice_number: "00001-00000101".to_string(),
            cae: "12345678901234".to_string(),
            cae_expiration: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
            observations: vec![],
        };
        store.record_outcome("S-1", &outcome).await.unwrap();

        assert_eq!(store.find_outcome("S-1").await.unwrap(), Some(outcome));
        let raw = std::fs::read_to_string(store.path_for("S-1")).unwrap();
        assert!(raw.contains("\"status\": \"authorized\""));
    }

    #[test]
    fn test_sale_id_cannot_escape_base_path() {
        let store = JsonFileOutcomeStore::new("/data");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/data/_2E_2E_2Fetc_2Fpasswd.json")
        );
    }

    #[test]
    fn test_similar_sale_ids_get_distinct_files() {
        let store = JsonFileOutcomeStore::new("/data");
        let ids = ["2024/0001", "2024_0001", "2024_2F0001", "2024-0001", "2024.0001"];
        let paths: std::collections::HashSet<PathBuf> =
            ids.iter().map(|id| store.path_for(id)).collect();
        assert_eq!(paths.len(), ids.len());
    }

    #[tokio::test]
    async fn test_outcome_of_one_sale_is_not_visible_under_a_similar_id() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileOutcomeStore::new(dir.path());

        let outcome = InvoiceOutcome::Authorized {
            invoice_number: "00001-00000101".to_string(),
            cae: "12345678901234".to_string(),
            cae_expiration: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
            observations: vec![],
        };
        store.record_outcome("2024/0001", &outcome).await.unwrap();

        assert_eq!(store.find_outcome("2024_0001").await.unwrap(), None);
        assert_eq!(store.find_outcome("2024/0001").await.unwrap(), Some(outcome));
    }
}
