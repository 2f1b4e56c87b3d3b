//! Source readers: lazy materialization of delimited files into indexed
//! tables.
//!
//! A reader is constructed cheaply (dialect sniff plus header read) and
//! parses the whole file only when column values are first requested. The
//! materialized table is immutable; requesting a different index column
//! builds a fresh table and swaps it in, so concurrent readers always see a
//! complete one.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::data::{parse_date_ms, CellValue, ColumnData, IndexChoice, IndexKey, Series, Table};
use crate::error::{Error, Result};
use crate::sniff::{self, Dialect};

/// Header substrings (matched case-insensitively) that mark a column as
/// date-like.
const DATE_INDICATORS: [&str; 3] = ["date", "дата", "_dt"];

/// Capability shared by every source kind: advertise columns and extract
/// indexed column values.
pub trait SourceReader: Send + Sync {
    /// Advertised column names containing `filter`; an empty filter keeps
    /// all.
    fn columns(&self, filter: &str) -> Vec<String>;

    /// Extract one or more columns under the requested index choice,
    /// rebuilding the materialized table when the choice changes.
    fn column_values(&self, names: &[String], index: &IndexChoice) -> Result<ColumnData>;
}

impl std::fmt::Debug for dyn SourceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceReader").finish_non_exhaustive()
    }
}

/// True when a header name marks a date-like column.
pub fn is_date_like(name: &str) -> bool {
    let lower = name.to_lowercase();
    DATE_INDICATORS.iter().any(|marker| lower.contains(marker))
}

/// Exact header match first, then the first header containing `name`.
fn find_column(columns: &[String], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c == name)
        .or_else(|| columns.iter().position(|c| c.contains(name)))
}

/// The index column a table was materialized under.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResolvedIndex {
    /// Row position is the key.
    None,
    /// Keys come from the named column, which is excluded from the data
    /// columns. `time` marks a date-like column whose values become epoch
    /// milliseconds.
    Column { name: String, time: bool },
}

/// Fully parsed file content under one index choice. Immutable once built.
struct IndexedTable {
    index: ResolvedIndex,
    /// Data columns; the resolved index column, if any, is excluded.
    columns: Vec<String>,
    rows: Vec<(IndexKey, Vec<CellValue>)>,
}

/// A delimited text file exposed as a source.
pub struct CsvReader {
    path: PathBuf,
    dialect: Dialect,
    /// All header names, in file order.
    headers: Vec<String>,
    /// Advertised columns: headers minus the auto-detected date column.
    advertised: Vec<String>,
    /// Index in effect when a query does not override it.
    default_index: IndexChoice,
    table: RwLock<Option<Arc<IndexedTable>>>,
}

impl CsvReader {
    /// Open `path`, sniff its dialect, and read the header row. With no
    /// explicit index the first date-like header becomes the index column
    /// and is dropped from the advertised list; an explicit index keeps the
    /// full list.
    pub fn open(path: impl Into<PathBuf>, explicit_index: Option<IndexChoice>) -> Result<Self> {
        let path = path.into();
        let dialect = sniff::sniff_path(&path)?;
        let headers = read_headers(&path, dialect)?;

        let (default_index, advertised) = match explicit_index {
            Some(choice) => (choice, headers.clone()),
            None => match headers.iter().position(|h| is_date_like(h)) {
                Some(pos) => {
                    let mut advertised = headers.clone();
                    advertised.remove(pos);
                    (IndexChoice::Column(headers[pos].clone()), advertised)
                }
                None => (IndexChoice::None, headers.clone()),
            },
        };

        tracing::debug!(
            path = %path.display(),
            delimiter = %char::from(dialect.delimiter),
            index = ?default_index,
            "Opened source"
        );

        Ok(Self {
            path,
            dialect,
            headers,
            advertised,
            default_index,
            table: RwLock::new(None),
        })
    }

    /// Canonical index column for a request: an override wins, otherwise the
    /// reader default; positions resolve to header names.
    fn resolve_index(&self, requested: &IndexChoice) -> Result<ResolvedIndex> {
        let effective = match requested {
            IndexChoice::Default => self.default_index.clone(),
            other => other.clone(),
        };
        match effective {
            IndexChoice::Default | IndexChoice::None => Ok(ResolvedIndex::None),
            IndexChoice::Column(name) => {
                let pos = find_column(&self.headers, &name)
                    .ok_or_else(|| Error::not_found("column", self.describe(&name)))?;
                let name = self.headers[pos].clone();
                Ok(ResolvedIndex::Column {
                    time: is_date_like(&name),
                    name,
                })
            }
            IndexChoice::Position(pos) => {
                let name = self
                    .headers
                    .get(pos)
                    .cloned()
                    .ok_or_else(|| {
                        Error::not_found("column", self.describe(&format!("position {pos}")))
                    })?;
                Ok(ResolvedIndex::Column {
                    time: is_date_like(&name),
                    name,
                })
            }
        }
    }

    fn describe(&self, what: &str) -> String {
        format!("{what} in {}", self.path.display())
    }

    /// Current table if it matches `want`, else build and swap. The build
    /// happens outside the lock; concurrent readers keep the old table until
    /// the new one is published.
    fn materialized(&self, want: &ResolvedIndex) -> Result<Arc<IndexedTable>> {
        if let Ok(guard) = self.table.read() {
            if let Some(table) = guard.as_ref() {
                if table.index == *want {
                    return Ok(Arc::clone(table));
                }
            }
        }

        tracing::debug!(path = %self.path.display(), index = ?want, "Materializing indexed table");
        let built = Arc::new(self.build_table(want)?);
        if let Ok(mut guard) = self.table.write() {
            *guard = Some(Arc::clone(&built));
        }
        Ok(built)
    }

    fn build_table(&self, index: &ResolvedIndex) -> Result<IndexedTable> {
        let file = File::open(&self.path).map_err(|e| Error::format(&self.path, e.to_string()))?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.dialect.delimiter)
            .from_reader(file);

        let index_pos = match index {
            ResolvedIndex::Column { name, .. } => self.headers.iter().position(|h| h == name),
            ResolvedIndex::None => None,
        };
        let columns: Vec<String> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != index_pos)
            .map(|(_, h)| h.clone())
            .collect();

        let mut rows = Vec::new();
        for (row_no, record) in reader.records().enumerate() {
            let record = record.map_err(|e| Error::format(&self.path, e.to_string()))?;
            let key = match (index, index_pos) {
                (ResolvedIndex::Column { time, name }, Some(pos)) => {
                    let raw = record.get(pos).unwrap_or("");
                    if *time {
                        IndexKey::Time(parse_date_ms(raw).ok_or_else(|| {
                            Error::format(
                                &self.path,
                                format!("row {}: {raw:?} in {name} is not a date", row_no + 2),
                            )
                        })?)
                    } else {
                        IndexKey::Label(raw.to_string())
                    }
                }
                _ => IndexKey::Row(row_no),
            };
            let cells = record
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != index_pos)
                .map(|(_, raw)| CellValue::parse(raw))
                .collect();
            rows.push((key, cells));
        }

        Ok(IndexedTable {
            index: index.clone(),
            columns,
            rows,
        })
    }
}

impl SourceReader for CsvReader {
    fn columns(&self, filter: &str) -> Vec<String> {
        self.advertised
            .iter()
            .filter(|name| filter.is_empty() || name.contains(filter))
            .cloned()
            .collect()
    }

    fn column_values(&self, names: &[String], index: &IndexChoice) -> Result<ColumnData> {
        let want = self.resolve_index(index)?;
        let table = self.materialized(&want)?;

        let mut picks = Vec::with_capacity(names.len());
        for name in names {
            let pos = find_column(&table.columns, name)
                .ok_or_else(|| Error::not_found("column", self.describe(name)))?;
            picks.push((table.columns[pos].clone(), pos));
        }

        if let [(name, pos)] = picks.as_slice() {
            let points = table
                .rows
                .iter()
                .map(|(key, cells)| (key.clone(), cells[*pos].clone()))
                .collect();
            return Ok(ColumnData::Series(Series {
                name: name.clone(),
                points,
            }));
        }

        let rows = table
            .rows
            .iter()
            .map(|(key, cells)| {
                (
                    key.clone(),
                    picks.iter().map(|(_, pos)| cells[*pos].clone()).collect(),
                )
            })
            .collect();
        Ok(ColumnData::Table(Table {
            columns: picks.into_iter().map(|(name, _)| name).collect(),
            rows,
        }))
    }
}

fn read_headers(path: &Path, dialect: Dialect) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| Error::format(path, e.to_string()))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(dialect.delimiter)
        .from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| Error::format(path, e.to_string()))?;
    let mut names: Vec<String> = headers.iter().map(str::to_string).collect();
    // A UTF-8 BOM sticks to the first header when present.
    if let Some(first) = names.first_mut() {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }
    Ok(names)
}

type Constructor = fn(&Path) -> Result<Arc<dyn SourceReader>>;

/// Maps a file-type marker (a substring of the filename) to a reader
/// constructor. Closed set: delimited text is the only active kind.
pub struct ReaderCatalog {
    kinds: Vec<(&'static str, Constructor)>,
}

impl ReaderCatalog {
    pub fn new() -> Self {
        Self {
            kinds: vec![("csv", open_csv)],
        }
    }

    /// The marker matching `filename`, if any kind recognizes it.
    pub fn marker_for(&self, filename: &str) -> Option<&'static str> {
        self.kinds
            .iter()
            .map(|(marker, _)| *marker)
            .find(|marker| filename.contains(marker))
    }

    /// Build a reader for `path`, dispatching on the marker recognized in
    /// `filename`. Unrecognized filenames yield nothing.
    pub fn open(&self, filename: &str, path: &Path) -> Option<Result<Arc<dyn SourceReader>>> {
        self.kinds
            .iter()
            .find(|(marker, _)| filename.contains(marker))
            .map(|(_, construct)| construct(path))
    }
}

impl Default for ReaderCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn open_csv(path: &Path) -> Result<Arc<dyn SourceReader>> {
    Ok(Arc::new(CsvReader::open(path, None)?))
}
