//! Wire shaping: indexed column data to the dashboard response envelopes.
//!
//! Two shapes exist. A timeseries is `{target, datapoints: [[value, index]]}`
//! sorted ascending by index with unrepresentable values dropped; a table is
//! `{type: "table", columns, rows}` keeping every row, with null standing in
//! for whatever JSON cannot hold.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::{CellValue, ColumnData, IndexKey, Series, Table};
use crate::error::Error;

/// Requested result encoding for one query target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseShape {
    Table,
    /// Anything else, including an absent hint, renders as a timeseries.
    #[default]
    Timeseries,
}

impl<'de> Deserialize<'de> for ResponseShape {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "table" => ResponseShape::Table,
            _ => ResponseShape::Timeseries,
        })
    }
}

/// One element of the query response array.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Timeseries(TimeseriesResult),
    Table(TableResult),
    Failed(FailedTarget),
}

impl QueryResult {
    /// Error entry for a target that could not be evaluated.
    pub fn failed(target: &str, error: &Error) -> QueryResult {
        QueryResult::Failed(FailedTarget {
            target: target.to_string(),
            error: error.to_string(),
        })
    }
}

/// `{"target": name, "datapoints": [[value, index], ...]}`
#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesResult {
    pub target: String,
    pub datapoints: Vec<[Value; 2]>,
}

/// `{"type": "table", "columns": [{"text": name}, ...], "rows": [[...], ...]}`
#[derive(Debug, Clone, Serialize)]
pub struct TableResult {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnHeader {
    pub text: String,
}

/// Per-target error entry; the batch itself still succeeds.
#[derive(Debug, Clone, Serialize)]
pub struct FailedTarget {
    pub target: String,
    pub error: String,
}

/// Shape `data` for the wire. Empty data shapes to nothing; a multi-column
/// fetch under the timeseries hint yields one entry per column.
pub fn shape(data: ColumnData, shape: ResponseShape) -> Vec<QueryResult> {
    match (shape, data) {
        (ResponseShape::Timeseries, ColumnData::Series(series)) => {
            timeseries(series).into_iter().collect()
        }
        (ResponseShape::Timeseries, ColumnData::Table(table)) => table
            .into_series()
            .into_iter()
            .filter_map(timeseries)
            .collect(),
        (ResponseShape::Table, ColumnData::Series(series)) => {
            table(single_column(series)).into_iter().collect()
        }
        (ResponseShape::Table, ColumnData::Table(t)) => table(t).into_iter().collect(),
    }
}

/// Timeseries entry for one series, or nothing if the series held no rows.
/// Rows survive when their value is JSON-representable; the survivors sort
/// ascending by index.
fn timeseries(series: Series) -> Option<QueryResult> {
    if series.points.is_empty() {
        return None;
    }
    let mut kept: Vec<(IndexKey, Value)> = series
        .points
        .into_iter()
        .filter_map(|(key, cell)| plottable(cell).map(|value| (key, value)))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));
    Some(QueryResult::Timeseries(TimeseriesResult {
        target: series.name,
        datapoints: kept
            .into_iter()
            .map(|(key, value)| [value, key.to_json()])
            .collect(),
    }))
}

/// A datapoint value survives timeseries shaping when JSON can hold it:
/// finite numbers and text pass, null and NaN and infinities drop.
fn plottable(cell: CellValue) -> Option<Value> {
    match cell {
        CellValue::Number(n) => serde_json::Number::from_f64(n).map(Value::Number),
        CellValue::Text(s) => Some(Value::String(s)),
        CellValue::Null => None,
    }
}

/// Table entry, or nothing if the table held no rows. Rows keep file order;
/// the index itself is not a column.
fn table(table: Table) -> Option<QueryResult> {
    if table.rows.is_empty() {
        return None;
    }
    Some(QueryResult::Table(TableResult {
        kind: "table",
        columns: table
            .columns
            .into_iter()
            .map(|text| ColumnHeader { text })
            .collect(),
        rows: table
            .rows
            .into_iter()
            .map(|(_, cells)| cells.into_iter().map(CellValue::into_json).collect())
            .collect(),
    }))
}

/// A lone series renders as a one-column table.
fn single_column(series: Series) -> Table {
    Table {
        columns: vec![series.name],
        rows: series
            .points
            .into_iter()
            .map(|(key, cell)| (key, vec![cell]))
            .collect(),
    }
}
