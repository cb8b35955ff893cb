//! Persistence layer: libSQL-backed storage for sessions, leads, bank rates
//! and chat logs.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, Error};
use crate::savings::BankRate;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ChatLogEntry, Database, InquiryLead, Lead};

/// Parse bank rate rows from a JSON array.
pub fn parse_bank_rates(json: &str) -> Result<Vec<BankRate>, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::ParseError(format!("bank rates: {e}")))
}

/// Replace the stored bank rates with the rows in a JSON file.
pub async fn seed_bank_rates(db: &dyn Database, path: &Path) -> Result<usize, Error> {
    let json = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    let rates = parse_bank_rates(&json)?;
    let count = db.replace_bank_rates(&rates).await?;
    info!(path = %path.display(), count, "Bank rates seeded");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_rates_parse() {
        let rates = parse_bank_rates(include_str!("../../data/bank_rates.json")).unwrap();
        assert!(!rates.is_empty());
        assert!(rates.iter().any(|r| r.max_amount.is_none()));
    }

    #[test]
    fn bad_json_is_a_parse_error() {
        assert!(matches!(
            parse_bank_rates("{"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn seed_from_file() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        std::fs::write(
            &path,
            r#"[{"bank_name":"A","min_amount":0,"max_amount":null,"interest_rate":3.9}]"#,
        )
        .unwrap();
        assert_eq!(seed_bank_rates(&db, &path).await.unwrap(), 1);
        assert_eq!(db.list_bank_rates().await.unwrap()[0].bank_name, "A");
    }

    #[tokio::test]
    async fn seed_missing_file_is_io_error() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let err = seed_bank_rates(&db, Path::new("/nonexistent/rates.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Io(_))));
    }
}
