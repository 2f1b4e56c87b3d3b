//! Annotation finders: named providers of timestamped events for dashboard
//! overlays.
//!
//! An annotation query is `finder:argument`; the prefix picks the finder and
//! the remainder is passed through. The registry ships empty and is populated
//! at startup by whoever embeds the server.

use serde::Serialize;

use crate::error::{Error, Result};

/// One event on a dashboard timeline.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationEvent {
    /// Epoch milliseconds.
    pub time: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// A named source of annotation events.
pub trait AnnotationFinder: Send + Sync {
    /// Prefix this finder answers to.
    fn name(&self) -> &str;

    /// Events for `query` (the part after the prefix) within
    /// `[from_ms, to_ms]`.
    fn find(&self, query: &str, from_ms: i64, to_ms: i64) -> Result<Vec<AnnotationEvent>>;
}

/// Dispatches annotation queries to registered finders by prefix.
#[derive(Default)]
pub struct AnnotationRegistry {
    finders: Vec<Box<dyn AnnotationFinder>>,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, finder: Box<dyn AnnotationFinder>) {
        self.finders.push(finder);
    }

    fn get(&self, name: &str) -> Result<&dyn AnnotationFinder> {
        self.finders
            .iter()
            .map(Box::as_ref)
            .find(|finder| finder.name() == name)
            .ok_or_else(|| Error::not_found("annotation finder", name))
    }

    /// Split `query` into prefix and argument and run the matching finder.
    pub fn run(&self, query: &str, from_ms: i64, to_ms: i64) -> Result<Vec<AnnotationEvent>> {
        let (name, rest) = query
            .split_once(':')
            .ok_or_else(|| Error::BadRequest(format!("annotation query {query:?} lacks a finder prefix")))?;
        self.get(name)?.find(rest, from_ms, to_ms)
    }
}
