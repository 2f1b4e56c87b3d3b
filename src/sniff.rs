//! Dialect inference for delimited files.
//!
//! The delimiter is inferred from the header line alone: whichever candidate
//! occurs most often outside quoted sections wins. Files whose header shows
//! no candidate at all have no dialect and are rejected up front.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// Candidate delimiters, in tie-break order.
const CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// The inferred on-disk convention of one delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
}

/// Infer the dialect of the file at `path` from its first line.
pub fn sniff_path(path: &Path) -> Result<Dialect> {
    let file = File::open(path).map_err(|e| Error::format(path, e.to_string()))?;
    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .map_err(|e| Error::format(path, e.to_string()))?;
    sniff_line(&first_line)
        .ok_or_else(|| Error::format(path, "could not infer a delimiter from the header line"))
}

/// Pick the candidate delimiter occurring most often outside quotes. Ties go
/// to the earlier candidate; a line with no candidate has no dialect.
pub fn sniff_line(line: &str) -> Option<Dialect> {
    let mut best: Option<(u8, usize)> = None;
    for cand in CANDIDATES {
        let count = count_unquoted(line, cand);
        if count > 0 && best.map_or(true, |(_, n)| count > n) {
            best = Some((cand, count));
        }
    }
    best.map(|(delimiter, _)| Dialect { delimiter })
}

fn count_unquoted(line: &str, delim: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delim && !in_quotes {
            count += 1;
        }
    }
    count
}
