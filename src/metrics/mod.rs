//! The fixed catalog of derived metrics, computed per index group.
//!
//! Each special metric pulls one or two raw columns from a source reader,
//! groups rows by index value, and applies its aggregation rule. The result
//! is a series named after the metric, keyed by group, ascending.

pub mod auc;

use std::collections::BTreeMap;

use crate::data::{CellValue, ColumnData, IndexChoice, IndexKey, Series, Table};
use crate::error::{Error, Result};
use crate::reader::SourceReader;

/// Namespace prefix distinguishing catalog metrics from raw columns in
/// listings and query targets.
pub const SPECIAL_PREFIX: &str = "special:";

/// Logical input columns, resolved by substring against the source header.
const ID_COLUMN: &str = "id";
const PD_COLUMN: &str = "pd";
const DEFAULT_COLUMN: &str = "default_12m";
const CURRENT_COLUMN: &str = "cur_default";

/// Derived metrics computed from raw columns, grouped by index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialMetric {
    /// Non-missing row count per group.
    AgreementCount,
    /// Grouped sum of realized defaults over grouped sum of open positions.
    DefaultRate,
    /// Mean predicted default probability per group.
    AvgPd,
    /// Ranking quality of the prediction against the realized outcome,
    /// 2*AUC - 1.
    Gini,
}

impl SpecialMetric {
    pub const ALL: [SpecialMetric; 4] = [
        SpecialMetric::AgreementCount,
        SpecialMetric::DefaultRate,
        SpecialMetric::AvgPd,
        SpecialMetric::Gini,
    ];

    /// Catalog name, as listed and as requested by clients.
    pub fn name(self) -> &'static str {
        match self {
            SpecialMetric::AgreementCount => "agreement_count",
            SpecialMetric::DefaultRate => "default_rate",
            SpecialMetric::AvgPd => "avg_PD",
            SpecialMetric::Gini => "gini",
        }
    }

    /// Reverse lookup over the catalog.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.name() == name)
    }

    /// Evaluate this metric against `reader`, honoring the index override.
    pub fn compute(self, reader: &dyn SourceReader, index: &IndexChoice) -> Result<Series> {
        let points = match self {
            SpecialMetric::AgreementCount => {
                let series = fetch_series(reader, ID_COLUMN, index)?;
                group_cells(&series)
                    .into_iter()
                    .map(|(key, cells)| {
                        let count = cells.iter().filter(|c| !c.is_missing()).count();
                        (key, count as f64)
                    })
                    .collect()
            }
            SpecialMetric::DefaultRate => {
                let table = fetch_table(reader, &[DEFAULT_COLUMN, CURRENT_COLUMN], index)?;
                group_rows(&table)
                    .into_iter()
                    .map(|(key, rows)| {
                        let defaults: f64 = rows.iter().filter_map(|r| r[0].numeric()).sum();
                        let open: f64 = rows.iter().filter_map(|r| r[1].numeric()).sum();
                        // Division by a zero denominator stays undefined
                        // rather than erroring; shaping decides what to show.
                        (key, defaults / open)
                    })
                    .collect()
            }
            SpecialMetric::AvgPd => {
                let series = fetch_series(reader, PD_COLUMN, index)?;
                group_cells(&series)
                    .into_iter()
                    .map(|(key, cells)| {
                        let nums: Vec<f64> = cells.iter().filter_map(|c| c.numeric()).collect();
                        (key, nums.iter().sum::<f64>() / nums.len() as f64)
                    })
                    .collect()
            }
            SpecialMetric::Gini => {
                let table = fetch_table(reader, &[PD_COLUMN, DEFAULT_COLUMN], index)?;
                let mut points = Vec::new();
                for (key, rows) in group_rows(&table) {
                    let (scores, outcomes): (Vec<f64>, Vec<f64>) = rows
                        .iter()
                        .filter_map(|r| r[0].numeric().zip(r[1].numeric()))
                        .unzip();
                    let auc = auc::roc_auc(&scores, &outcomes)
                        .map_err(|e| Error::compute(self.name(), format!("group {key}: {e}")))?;
                    points.push((key, 2.0 * auc - 1.0));
                }
                points
            }
        };

        Ok(Series {
            name: self.name().to_string(),
            points: points
                .into_iter()
                .map(|(key, value)| (key, CellValue::Number(value)))
                .collect(),
        })
    }
}

/// Group a series' cells by index key, keys ascending.
fn group_cells(series: &Series) -> BTreeMap<IndexKey, Vec<&CellValue>> {
    let mut groups: BTreeMap<IndexKey, Vec<&CellValue>> = BTreeMap::new();
    for (key, cell) in &series.points {
        groups.entry(key.clone()).or_default().push(cell);
    }
    groups
}

/// Group a table's rows by index key, keys ascending.
fn group_rows(table: &Table) -> BTreeMap<IndexKey, Vec<&Vec<CellValue>>> {
    let mut groups: BTreeMap<IndexKey, Vec<&Vec<CellValue>>> = BTreeMap::new();
    for (key, cells) in &table.rows {
        groups.entry(key.clone()).or_default().push(cells);
    }
    groups
}

fn fetch_series(
    reader: &dyn SourceReader,
    column: &str,
    index: &IndexChoice,
) -> Result<Series> {
    match reader.column_values(&[column.to_string()], index)? {
        ColumnData::Series(series) => Ok(series),
        ColumnData::Table(_) => Err(Error::compute(
            column,
            "reader returned several columns for a single-column fetch",
        )),
    }
}

fn fetch_table(
    reader: &dyn SourceReader,
    columns: &[&str],
    index: &IndexChoice,
) -> Result<Table> {
    let names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    match reader.column_values(&names, index)? {
        ColumnData::Table(table) => Ok(table),
        ColumnData::Series(series) => Err(Error::compute(
            series.name,
            "reader returned a single column for a multi-column fetch",
        )),
    }
}
