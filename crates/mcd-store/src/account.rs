use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::PersistenceError;

/// `account.json`: the scalar part of the portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFile {
    pub cash: Decimal,
    pub initial_equity: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl AccountFile {
    pub fn read(path: &Path) -> Result<Self, PersistenceError> {
        let text = std::fs::read_to_string(path).map_err(|e| PersistenceError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| PersistenceError::Json {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, PersistenceError> {
        let mut json = serde_json::to_vec_pretty(self).map_err(|e| PersistenceError::Json {
            path: Default::default(),
            message: e.to_string(),
        })?;
        json.push(b'\n');
        Ok(json)
    }
}
