//! Core value model: cells, index keys, and indexed column data.
//!
//! Everything the pipeline passes around is built from three pieces: a
//! [`CellValue`] (one parsed field), an [`IndexKey`] (the row's position in
//! the index), and the [`Series`]/[`Table`] containers pairing them up.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

/// One parsed cell: numeric after coercion, the original text when coercion
/// fails open, or null for an empty field.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    /// Parse a raw field. Tries a direct numeric parse, then a
    /// locale-normalized one (decimal comma to decimal point), and keeps the
    /// original text when both fail. An empty field is null.
    pub fn parse(raw: &str) -> CellValue {
        if raw.is_empty() {
            return CellValue::Null;
        }
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            return CellValue::Number(n);
        }
        if trimmed.contains(',') {
            if let Ok(n) = normalize_decimal(trimmed).parse::<f64>() {
                return CellValue::Number(n);
            }
        }
        CellValue::Text(raw.to_string())
    }

    /// Missing for aggregation purposes: null, or a number that is NaN.
    pub fn is_missing(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Number(n) => n.is_nan(),
            CellValue::Text(_) => false,
        }
    }

    /// The cell as an aggregatable number. Text and missing cells yield
    /// nothing; infinities pass through.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    /// Wire encoding for table rows: finite numbers as numbers, text as
    /// strings, anything JSON cannot represent as null.
    pub fn into_json(self) -> Value {
        match self {
            CellValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Text(s) => Value::String(s),
            CellValue::Null => Value::Null,
        }
    }
}

/// Normalize a locale-variant numeric encoding: the decimal comma becomes a
/// decimal point. Idempotent, since the output has no comma left to replace.
pub fn normalize_decimal(raw: &str) -> String {
    raw.replace(',', ".")
}

/// Date encodings accepted for index columns, tried in order.
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%d/%m/%Y"];

/// Parse a date-like index value to milliseconds since the Unix epoch,
/// treating naive values as UTC. Bare `YYYY-MM` month keys resolve to the
/// first day of the month.
pub fn parse_date_ms(raw: &str) -> Option<i64> {
    let s = raw.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return date_to_ms(d);
        }
    }
    // Month key: "2020-01" becomes the first of the month.
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
        return date_to_ms(d);
    }
    None
}

fn date_to_ms(d: NaiveDate) -> Option<i64> {
    d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis())
}

/// Key of one row in an indexed table: a time instant when the index column
/// is date-like, the raw column value otherwise, or the row position when no
/// index is in effect. A single table never mixes kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    /// Milliseconds since the Unix epoch.
    Time(i64),
    Label(String),
    Row(usize),
}

impl IndexKey {
    /// Wire encoding: epoch-millisecond integer, raw label, or row position.
    pub fn to_json(&self) -> Value {
        match self {
            IndexKey::Time(ms) => Value::from(*ms),
            IndexKey::Label(s) => Value::from(s.clone()),
            IndexKey::Row(i) => Value::from(*i),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Time(ms) => write!(f, "{ms}"),
            IndexKey::Label(s) => write!(f, "{s}"),
            IndexKey::Row(i) => write!(f, "{i}"),
        }
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        use IndexKey::{Label, Row, Time};
        match (self, other) {
            (Time(a), Time(b)) => a.cmp(b),
            (Label(a), Label(b)) => compare_labels(a, b),
            (Row(a), Row(b)) => a.cmp(b),
            // Kinds never mix within one table; give them a stable order
            // anyway so sorting mixed collections stays total.
            (Time(_), _) => Ordering::Less,
            (_, Time(_)) => Ordering::Greater,
            (Label(_), _) => Ordering::Less,
            (_, Label(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Labels sort numerically when both sides parse as numbers, with the raw
/// string as tie-break so distinct spellings of one value stay distinct
/// keys. Numeric labels sort before non-numeric ones.
fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Index-column request attached to a query or a reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IndexChoice {
    /// Use the reader's detected or construction-time index.
    #[default]
    Default,
    /// No index at all: rows keyed by position.
    None,
    /// A specific column, by name.
    Column(String),
    /// A specific column, by zero-based position in the header.
    Position(usize),
}

/// A single named column sliced out of an indexed table.
#[derive(Debug, Clone)]
pub struct Series {
    pub name: String,
    pub points: Vec<(IndexKey, CellValue)>,
}

/// Several columns sharing one index. Rows are in file order.
#[derive(Debug, Clone)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<(IndexKey, Vec<CellValue>)>,
}

impl Table {
    /// Split into one series per column, preserving row order.
    pub fn into_series(self) -> Vec<Series> {
        let mut split: Vec<Series> = self
            .columns
            .into_iter()
            .map(|name| Series {
                name,
                points: Vec::with_capacity(self.rows.len()),
            })
            .collect();
        for (key, cells) in self.rows {
            for (series, cell) in split.iter_mut().zip(cells) {
                series.points.push((key.clone(), cell));
            }
        }
        split
    }
}

/// What a column fetch produced: one column or several.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Series(Series),
    Table(Table),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_coerces_plain_numbers() {
        assert_eq!(CellValue::parse("3.14"), CellValue::Number(3.14));
        assert_eq!(CellValue::parse("-7"), CellValue::Number(-7.0));
        assert_eq!(CellValue::parse("1e3"), CellValue::Number(1000.0));
        assert_eq!(CellValue::parse(" 2.5 "), CellValue::Number(2.5));
    }

    #[test]
    fn parse_normalizes_decimal_comma() {
        assert_eq!(CellValue::parse("3,14"), CellValue::Number(3.14));
        assert_eq!(CellValue::parse("0,5"), CellValue::Number(0.5));
    }

    #[test]
    fn parse_keeps_text_on_failure() {
        assert_eq!(
            CellValue::parse("north"),
            CellValue::Text("north".to_string())
        );
        // A thousands-grouped value does not become a number by comma
        // replacement alone.
        assert_eq!(
            CellValue::parse("1,234,567"),
            CellValue::Text("1,234,567".to_string())
        );
    }

    #[test]
    fn parse_empty_is_null() {
        assert_eq!(CellValue::parse(""), CellValue::Null);
    }

    #[test]
    fn nan_text_is_missing() {
        let cell = CellValue::parse("NaN");
        assert!(cell.is_missing(), "NaN should count as missing");
        assert_eq!(cell.numeric(), None);
    }

    #[test]
    fn numeric_passes_infinities() {
        assert_eq!(CellValue::Number(f64::INFINITY).numeric(), Some(f64::INFINITY));
        assert!(!CellValue::Number(f64::INFINITY).is_missing());
    }

    #[test]
    fn into_json_nulls_what_json_cannot_hold() {
        assert_eq!(CellValue::Number(f64::NAN).into_json(), Value::Null);
        assert_eq!(CellValue::Number(f64::INFINITY).into_json(), Value::Null);
        assert_eq!(CellValue::Number(2.0).into_json(), Value::from(2.0));
        assert_eq!(CellValue::Null.into_json(), Value::Null);
    }

    #[test]
    fn dates_parse_to_epoch_millis() {
        assert_eq!(parse_date_ms("2020-01-01"), Some(1_577_836_800_000));
        assert_eq!(parse_date_ms("1970-01-01"), Some(0));
        assert_eq!(parse_date_ms("2020-01-01 00:00:10"), Some(1_577_836_810_000));
        assert_eq!(parse_date_ms("2020-01-01T00:00:10"), Some(1_577_836_810_000));
        assert_eq!(parse_date_ms("01.02.2020"), Some(1_580_515_200_000));
        assert_eq!(parse_date_ms("2020/02/01"), Some(1_580_515_200_000));
    }

    #[test]
    fn month_keys_resolve_to_first_of_month() {
        assert_eq!(parse_date_ms("2020-01"), Some(1_577_836_800_000));
        assert_eq!(parse_date_ms("2020-02"), Some(1_580_515_200_000));
    }

    #[test]
    fn junk_is_not_a_date() {
        assert_eq!(parse_date_ms("north"), None);
        assert_eq!(parse_date_ms(""), None);
        assert_eq!(parse_date_ms("2020-13"), None);
    }

    #[test]
    fn time_keys_order_by_instant() {
        let mut keys = vec![
            IndexKey::Time(1_580_515_200_000),
            IndexKey::Time(1_577_836_800_000),
        ];
        keys.sort();
        assert_eq!(keys[0], IndexKey::Time(1_577_836_800_000));
    }

    #[test]
    fn numeric_labels_order_numerically() {
        let mut keys = vec![
            IndexKey::Label("10".to_string()),
            IndexKey::Label("9".to_string()),
            IndexKey::Label("north".to_string()),
        ];
        keys.sort();
        assert_eq!(keys[0], IndexKey::Label("9".to_string()));
        assert_eq!(keys[1], IndexKey::Label("10".to_string()));
        assert_eq!(
            keys[2],
            IndexKey::Label("north".to_string()),
            "non-numeric labels sort after numeric ones"
        );
    }

    #[test]
    fn equal_valued_label_spellings_stay_distinct() {
        let a = IndexKey::Label("1.0".to_string());
        let b = IndexKey::Label("1.00".to_string());
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal, "Ord must agree with Eq");
    }

    #[test]
    fn table_splits_into_column_series() {
        let table = Table {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![
                (IndexKey::Row(0), vec![CellValue::Number(1.0), CellValue::Number(2.0)]),
                (IndexKey::Row(1), vec![CellValue::Number(3.0), CellValue::Null]),
            ],
        };
        let split = table.into_series();
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].name, "a");
        assert_eq!(split[0].points.len(), 2);
        assert_eq!(split[1].points[1], (IndexKey::Row(1), CellValue::Null));
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[-0-9,. eE+]{0,16}") {
            let once = normalize_decimal(&raw);
            let twice = normalize_decimal(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn coercion_roundtrips_normal_floats(n in proptest::num::f64::NORMAL) {
            match CellValue::parse(&n.to_string()) {
                CellValue::Number(m) => prop_assert_eq!(m, n),
                other => prop_assert!(false, "expected a number, got {:?}", other),
            }
        }
    }
}
