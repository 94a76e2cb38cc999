use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::warn;

use crate::domain::{Artifact, Identifier, InteractionRow, InteractionTable, ValidationOutcome};
use crate::error::HarvestError;
use crate::extract::Extractor;
use crate::validate::{MISSING_STRUCTURE, NO_CONTENT, Validator};

/// Output column names, in order.
pub const HEADERS: [&str; 5] = [
    "Official symbol for Interactor A",
    "Official symbol for Interactor B",
    "Synonyms/Aliases for Interactor A",
    "Synonyms/Aliases for Interactor B",
    "Quantitative Score",
];

// Positions in the tab2 layout.
const SYMBOL_A: usize = 7;
const SYMBOL_B: usize = 8;
const SYNONYMS_A: usize = 9;
const SYNONYMS_B: usize = 10;
const SCORE: usize = 18;

pub fn parse_records(text: &str) -> Result<Vec<StringRecord>, csv::Error> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .quoting(false)
        .from_reader(text.as_bytes())
        .records()
        .collect()
}

/// `-` and anything else non-numeric counts as no score.
pub fn parse_score(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw == "-" {
        return 0.0;
    }
    raw.parse::<f64>().unwrap_or(0.0)
}

/// Keeps the five published columns, drops rows scoring ≤ 0 and orders the
/// rest by score, highest first.
pub fn filter_rows<'a>(records: impl IntoIterator<Item = &'a StringRecord>) -> Vec<InteractionRow> {
    let field = |record: &StringRecord, index: usize| record.get(index).unwrap_or("").to_string();
    let mut rows: Vec<InteractionRow> = records
        .into_iter()
        .map(|record| InteractionRow {
            symbol_a: field(record, SYMBOL_A),
            symbol_b: field(record, SYMBOL_B),
            synonyms_a: field(record, SYNONYMS_A),
            synonyms_b: field(record, SYNONYMS_B),
            score: parse_score(record.get(SCORE).unwrap_or("-")),
        })
        .filter(|row| row.score > 0.0)
        .collect();
    rows.sort_by(|a, b| b.score.total_cmp(&a.score));
    rows
}

pub fn to_csv_bytes(table: &InteractionTable) -> Result<Vec<u8>, HarvestError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(HEADERS)
        .map_err(|err| HarvestError::Serialize(err.to_string()))?;
    for row in &table.rows {
        writer
            .serialize(row)
            .map_err(|err| HarvestError::Serialize(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| HarvestError::Serialize(err.to_string()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionValidator;

impl Validator for InteractionValidator {
    fn validate(&self, raw: &[u8]) -> ValidationOutcome {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return ValidationOutcome::Invalid(NO_CONTENT.to_string());
        }
        let text = match std::str::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => return ValidationOutcome::Invalid(format!("unparseable content: {err}")),
        };
        let records = match parse_records(text) {
            Ok(records) => records,
            Err(err) => return ValidationOutcome::Invalid(format!("unparseable content: {err}")),
        };
        if records.is_empty() {
            return ValidationOutcome::Invalid(NO_CONTENT.to_string());
        }
        if records.iter().any(|record| record.len() <= SCORE) {
            return ValidationOutcome::Invalid(MISSING_STRUCTURE.to_string());
        }
        ValidationOutcome::Valid
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionExtractor;

impl Extractor for InteractionExtractor {
    fn extract(&self, content: &str, identifier: &Identifier) -> Artifact {
        let records = match parse_records(content) {
            Ok(records) => records,
            Err(err) => {
                warn!(identifier = %identifier, error = %err, "interaction rows unreadable");
                Vec::new()
            }
        };
        Artifact::Table(InteractionTable {
            identifier: identifier.clone(),
            rows: filter_rows(&records),
        })
    }
}
