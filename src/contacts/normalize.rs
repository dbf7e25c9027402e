//! Contact Normalization
//!
//! Turns raw model output into a deduplicated phone book.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

/// One row as returned by the model. Either field may be null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContactRow {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,
}

/// A contact with a normalized phone number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Saved name, empty when the row only showed a number
    pub name: String,

    /// Digits only, country code removed
    pub phone: String,
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````)
pub fn strip_code_fence(record: &str) -> &str {
    let mut cleaned = record.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

/// Parse one model response into rows. The record must be a JSON array;
/// each element is decoded on its own so one malformed row does not take the
/// rest of the record with it.
pub fn parse_record(record: &str) -> serde_json::Result<Vec<serde_json::Result<ContactRow>>> {
    let rows: Vec<serde_json::Value> = serde_json::from_str(strip_code_fence(record))?;
    Ok(rows.into_iter().map(serde_json::from_value).collect())
}

/// Strip every occurrence of `country_code` and all non-digits.
/// Returns `None` when nothing is left.
pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
    let without_code = if country_code.is_empty() {
        raw.to_string()
    } else {
        raw.replace(country_code, "")
    };

    let digits: String = without_code.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Unique phone numbers in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    contacts: Vec<Contact>,
    seen: HashSet<String>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from raw model responses. Records that are not a JSON
    /// array, and rows that are not `{name, phone}` objects, are logged and
    /// skipped.
    pub fn from_records<S: AsRef<str>>(records: &[S], country_code: &str) -> Self {
        let mut book = Self::new();

        for (index, record) in records.iter().enumerate() {
            match parse_record(record.as_ref()) {
                Ok(rows) => {
                    for (row_index, row) in rows.into_iter().enumerate() {
                        match row {
                            Ok(row) => {
                                book.insert(row, country_code);
                            }
                            Err(e) => warn!(
                                record = index,
                                row = row_index,
                                error = %e,
                                "Skipping malformed row"
                            ),
                        }
                    }
                }
                Err(e) => warn!(record = index, error = %e, "Skipping unparseable record"),
            }
        }

        book
    }

    /// Add a row. Returns false when it has no usable phone or the number is
    /// already present; the first name seen for a number is kept.
    pub fn insert(&mut self, row: ContactRow, country_code: &str) -> bool {
        let Some(phone) = row
            .phone
            .as_deref()
            .and_then(|p| normalize_phone(p, country_code))
        else {
            return false;
        };

        if !self.seen.insert(phone.clone()) {
            return false;
        }

        self.contacts.push(Contact {
            name: row.name.unwrap_or_default(),
            phone,
        });
        true
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}
