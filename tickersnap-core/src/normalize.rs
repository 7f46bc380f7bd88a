//! History table → JSON row records.

use crate::model::HistoryRecord;
use crate::table::{Cell, HistoryTable};
use serde_json::Value;

/// Which column of the flattened table carries the time index.
///
/// `First` assumes the index lands in column 0 after `reset_index`, which
/// holds for every table this crate builds but is positional: a provider
/// that reorders columns breaks it silently. Use `Named` when the index
/// column name is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IndexColumn {
    #[default]
    First,
    Named(String),
}

impl IndexColumn {
    pub fn from_name(name: Option<String>) -> Self {
        match name {
            Some(n) if !n.is_empty() => IndexColumn::Named(n),
            _ => IndexColumn::First,
        }
    }
}

/// Flatten `table` into one record per row.
///
/// Values in the index column become ISO-8601 strings when they have a
/// date or time representation and pass through otherwise. If the index
/// column cannot be found, no value gets ISO treatment and rows are
/// emitted as-is.
pub fn normalize_history(table: HistoryTable, index: &IndexColumn) -> Vec<HistoryRecord> {
    if table.is_empty() {
        return Vec::new();
    }

    let flat = table.reset_index();
    let position = match index {
        IndexColumn::First => (!flat.columns().is_empty()).then_some(0),
        IndexColumn::Named(name) => flat.position(name),
    };
    if position.is_none() {
        log::warn!(
            "index column {index:?} not found among {:?}; leaving values unconverted",
            flat.columns()
        );
    }

    let (columns, rows) = flat.into_parts();
    rows.into_iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .enumerate()
                .map(|(i, (name, cell))| {
                    let value = if Some(i) == position {
                        index_value(cell)
                    } else {
                        cell.into_json()
                    };
                    (name.clone(), value)
                })
                .collect()
        })
        .collect()
}

fn index_value(cell: Cell) -> Value {
    match cell.to_iso8601() {
        Some(iso) => Value::String(iso),
        None => cell.into_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
    use proptest::prelude::*;
    use serde_json::json;

    fn est() -> FixedOffset {
        FixedOffset::west_opt(5 * 3600).unwrap()
    }

    fn bars(days: &[u32]) -> HistoryTable {
        let index = days
            .iter()
            .map(|&d| Cell::Timestamp(est().with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()))
            .collect();
        let closes = days.iter().map(|&d| Cell::float(Some(100.0 + d as f64))).collect();
        let volumes = days.iter().map(|&d| Cell::int(Some(1_000 * d as i64))).collect();
        HistoryTable::new("Date", index)
            .with_column("Close", closes)
            .unwrap()
            .with_column("Volume", volumes)
            .unwrap()
    }

    #[test]
    fn empty_table_is_empty_history() {
        assert!(normalize_history(HistoryTable::empty("Date"), &IndexColumn::First).is_empty());
    }

    #[test]
    fn first_column_becomes_iso_string() {
        let records = normalize_history(bars(&[2, 3]), &IndexColumn::First);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Date"], json!("2024-01-02T00:00:00-05:00"));
        assert_eq!(records[1]["Close"], json!(103.0));
        assert_eq!(records[1]["Volume"], json!(3000));
    }

    #[test]
    fn record_keys_keep_column_order() {
        let records = normalize_history(bars(&[2]), &IndexColumn::First);
        let keys: Vec<&str> = records[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["Date", "Close", "Volume"]);
    }

    #[test]
    fn named_index_column() {
        let records = normalize_history(bars(&[2]), &IndexColumn::Named("Date".into()));
        assert_eq!(records[0]["Date"], json!("2024-01-02T00:00:00-05:00"));
    }

    #[test]
    fn missing_named_column_leaves_values_unconverted() {
        let records = normalize_history(bars(&[2]), &IndexColumn::Named("Datetime".into()));
        assert_eq!(records.len(), 1);
        // Not ISO; falls back to the plain JSON rendering of a timestamp.
        assert_eq!(records[0]["Date"], json!(1_704_171_600_000_i64));
        assert_eq!(records[0]["Close"], json!(102.0));
    }

    #[test]
    fn non_temporal_index_values_stay_typed() {
        let table = HistoryTable::new("Bar", vec![Cell::int(Some(0)), Cell::int(Some(1))])
            .with_column("Close", vec![Cell::float(Some(1.0)), Cell::float(Some(2.0))])
            .unwrap();
        let records = normalize_history(table, &IndexColumn::First);
        assert_eq!(records[0]["Bar"], json!(0));
        assert_eq!(records[1]["Bar"], json!(1));
    }

    #[test]
    fn date_index_renders_as_plain_date() {
        let d = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap();
        let table = HistoryTable::new("Date", vec![Cell::Date(d)]);
        let records = normalize_history(table, &IndexColumn::First);
        assert_eq!(records[0]["Date"], json!("2023-12-29"));
    }

    #[test]
    fn index_column_from_optional_name() {
        assert_eq!(IndexColumn::from_name(None), IndexColumn::First);
        assert_eq!(IndexColumn::from_name(Some(String::new())), IndexColumn::First);
        assert_eq!(
            IndexColumn::from_name(Some("Date".into())),
            IndexColumn::Named("Date".into())
        );
    }

    proptest! {
        #[test]
        fn every_row_survives_with_iso_index(
            secs in prop::collection::vec(0i64..4_000_000_000, 0..64),
            offset_hours in -12i32..=14,
        ) {
            let tz = FixedOffset::east_opt(offset_hours * 3600).unwrap();
            let index: Vec<Cell> = secs
                .iter()
                .map(|&s| Cell::Timestamp(DateTime::from_timestamp(s, 0).unwrap().with_timezone(&tz)))
                .collect();
            let closes = secs.iter().map(|&s| Cell::float(Some(s as f64))).collect();
            let table = HistoryTable::new("Date", index)
                .with_column("Close", closes)
                .unwrap();

            let records = normalize_history(table, &IndexColumn::First);
            prop_assert_eq!(records.len(), secs.len());
            for (record, &s) in records.iter().zip(&secs) {
                let iso = record["Date"].as_str().unwrap();
                let parsed = DateTime::parse_from_rfc3339(iso).unwrap();
                prop_assert_eq!(parsed.timestamp(), s);
            }
        }
    }
}
