//! Serve folders of delimited files as dashboard-queryable timeseries metrics.
//!
//! Point the server at a directory of folders; every delimited file (CSV and
//! friends, delimiter sniffed per file) inside a folder becomes a queryable
//! source. Dashboards list sources, search their metrics, and fetch data over
//! a JSON query protocol.
//!
//! ## Architecture
//!
//! 1. **Reading** (`sniff`, `data`, `reader` modules) - Detects each file's
//!    dialect, coerces cell text to numbers where possible, and materializes
//!    the file as columns grouped under an index (usually a date column).
//!
//! 2. **Catalog** (`registry` module) - Maps folder listings to cached
//!    readers, one per source file.
//!
//! 3. **Evaluation** (`metrics`, `query`, `response` modules) - Computes
//!    derived portfolio metrics or fetches raw columns per query target and
//!    shapes the result as timeseries or table JSON.
//!
//! 4. **Transport** (`server`, `annotations` modules) - axum routes for the
//!    sources/search/query/annotations protocol, plus pluggable annotation
//!    finders.
//!
//! ## Usage
//!
//! Run against a data directory:
//!
//! ```bash
//! csv-datasource \
//!   --folder /data/portfolios \
//!   --port 3003
//! ```

pub mod annotations;
pub mod data;
pub mod error;
pub mod metrics;
pub mod query;
pub mod reader;
pub mod registry;
pub mod response;
pub mod server;
pub mod sniff;
