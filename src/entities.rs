use std::fs::File;
use std::path::PathBuf;

use tracing::warn;

use crate::domain::{Identifier, IdentifierPolicy};
use crate::error::HarvestError;

/// Supplies the identifiers a run works through.
pub trait EntitySource {
    fn identifiers(&self) -> Result<Vec<Identifier>, HarvestError>;
}

/// Tabular identifier list: a header row and one entity per row.
#[derive(Debug, Clone)]
pub struct CsvEntitySource {
    path: PathBuf,
    column: String,
    policy: IdentifierPolicy,
}

impl CsvEntitySource {
    pub fn new(path: impl Into<PathBuf>, column: impl Into<String>, policy: IdentifierPolicy) -> Self {
        Self {
            path: path.into(),
            column: column.into(),
            policy,
        }
    }

    fn source_error(&self, message: impl ToString) -> HarvestError {
        HarvestError::EntitySource {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }
}

impl EntitySource for CsvEntitySource {
    fn identifiers(&self) -> Result<Vec<Identifier>, HarvestError> {
        let file = File::open(&self.path).map_err(|err| self.source_error(err))?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = reader.headers().map_err(|err| self.source_error(err))?;
        let index = headers
            .iter()
            .position(|header| header.trim() == self.column)
            .ok_or_else(|| HarvestError::MissingColumn(self.column.clone()))?;

        let mut identifiers = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|err| self.source_error(err))?;
            let raw = record.get(index).unwrap_or("");
            match Identifier::normalize(raw, self.policy) {
                Ok(identifier) => identifiers.push(identifier),
                Err(err) => warn!(row = row + 1, error = %err, "skipping identifier row"),
            }
        }
        Ok(identifiers)
    }
}
