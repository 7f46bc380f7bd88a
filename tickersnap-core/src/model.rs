//! Exported document types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptive data about an instrument. The field set is whatever the
/// provider reports; keys keep the order the provider gave them.
pub type MetadataRecord = Map<String, Value>;

/// One row of price history: column name to value, in table column order.
pub type HistoryRecord = Map<String, Value>;

/// The JSON document written by an export.
///
/// Always has exactly two keys. Either section may be empty when the
/// provider failed or had nothing to report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportDocument {
    pub info: MetadataRecord,
    pub history: Vec<HistoryRecord>,
}

impl ExportDocument {
    pub fn new(info: MetadataRecord, history: Vec<HistoryRecord>) -> Self {
        Self { info, history }
    }

    /// True when neither section carries any data.
    pub fn is_empty(&self) -> bool {
        self.info.is_empty() && self.history.is_empty()
    }
}
