//! Indexed history tables.
//!
//! Providers hand back price history as a table whose rows are keyed by a
//! time index (the shape of a dataframe before `reset_index`). Export needs
//! plain row mappings, so the table is first flattened into a `FlatTable`
//! whose first column is the former index.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::{Number, Value};
use thiserror::Error;

/// A single table value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// An instant with the UTC offset of the venue it was reported in.
    Timestamp(DateTime<FixedOffset>),
    /// A calendar date with no time of day.
    Date(NaiveDate),
    /// Anything already representable as JSON.
    Value(Value),
}

impl Cell {
    /// A float cell. Missing and non-finite values become `null`.
    pub fn float(v: Option<f64>) -> Self {
        match v.and_then(Number::from_f64) {
            Some(n) => Cell::Value(Value::Number(n)),
            None => Cell::Value(Value::Null),
        }
    }

    pub fn int(v: Option<i64>) -> Self {
        match v {
            Some(n) => Cell::Value(Value::from(n)),
            None => Cell::Value(Value::Null),
        }
    }

    pub fn null() -> Self {
        Cell::Value(Value::Null)
    }

    /// ISO-8601 rendering, if this cell has a date or time representation.
    pub fn to_iso8601(&self) -> Option<String> {
        match self {
            Cell::Timestamp(ts) => Some(ts.to_rfc3339()),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Cell::Value(_) => None,
        }
    }

    /// The cell as a float, when it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Value(v) => v.as_f64(),
            _ => None,
        }
    }

    /// Convert to JSON without any index-specific treatment.
    ///
    /// JSON has no timestamp type, so temporal cells become epoch
    /// milliseconds here. The index column gets ISO strings instead; see
    /// `normalize`.
    pub fn into_json(self) -> Value {
        match self {
            Cell::Timestamp(ts) => Value::from(ts.timestamp_millis()),
            Cell::Date(d) => match d.and_hms_opt(0, 0, 0) {
                Some(dt) => Value::from(dt.and_utc().timestamp_millis()),
                None => Value::Null,
            },
            Cell::Value(v) => v,
        }
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Cell::Value(v)
    }
}

impl From<DateTime<FixedOffset>> for Cell {
    fn from(ts: DateTime<FixedOffset>) -> Self {
        Cell::Timestamp(ts)
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("column '{column}' has {actual} values, index has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("row {row} has {actual} cells, header has {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// Column-major table keyed by a row index.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTable {
    index_name: String,
    index: Vec<Cell>,
    columns: Vec<(String, Vec<Cell>)>,
}

impl HistoryTable {
    pub fn new(index_name: impl Into<String>, index: Vec<Cell>) -> Self {
        Self {
            index_name: index_name.into(),
            index,
            columns: Vec::new(),
        }
    }

    /// A table with no rows and no data columns.
    pub fn empty(index_name: impl Into<String>) -> Self {
        Self::new(index_name, Vec::new())
    }

    /// Append a data column. It must have one value per index entry.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<Cell>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(TableError::LengthMismatch {
                column: name,
                expected: self.index.len(),
                actual: values.len(),
            });
        }
        if name == self.index_name || self.columns.iter().any(|(n, _)| *n == name) {
            return Err(TableError::DuplicateColumn(name));
        }
        self.columns.push((name, values));
        Ok(())
    }

    /// Builder form of [`push_column`](Self::push_column).
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Cell>,
    ) -> Result<Self, TableError> {
        self.push_column(name, values)?;
        Ok(self)
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index(&self) -> &[Cell] {
        &self.index
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Move the index into an ordinary leading column and go row-major.
    pub fn reset_index(self) -> FlatTable {
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(self.index_name);

        let mut iters: Vec<std::vec::IntoIter<Cell>> = Vec::with_capacity(self.columns.len());
        for (name, values) in self.columns {
            header.push(name);
            iters.push(values.into_iter());
        }

        let rows = self
            .index
            .into_iter()
            .map(|idx| {
                let mut row = Vec::with_capacity(header.len());
                row.push(idx);
                // Every column has index.len() values (checked on push).
                row.extend(iters.iter_mut().map(|it| it.next().unwrap_or(Cell::null())));
                row
            })
            .collect();

        FlatTable {
            columns: header,
            rows,
        }
    }
}

/// Row-major table with a plain header.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTable {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl FlatTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, TableError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RowWidth {
                    row: i,
                    expected: columns.len(),
                    actual: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Cell>>) {
        (self.columns, self.rows)
    }
}
