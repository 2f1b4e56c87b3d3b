//! Request orchestration: source listings, metric listings, and batched data
//! queries.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::data::{ColumnData, IndexChoice};
use crate::error::{Error, Result};
use crate::metrics::{SpecialMetric, SPECIAL_PREFIX};
use crate::registry::SourceRegistry;
use crate::response::{self, QueryResult, ResponseShape};

/// One entry in a query batch.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryTarget {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    /// Result encoding; defaults to timeseries.
    #[serde(rename = "type", default)]
    pub shape: ResponseShape,
    /// Per-target options block.
    #[serde(default)]
    pub data: Option<TargetData>,
}

/// Recognized keys of the per-target options block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetData {
    /// Index override: a column name, a zero-based position, or -1 for no
    /// index.
    #[serde(default)]
    pub index_col: Option<Value>,
    /// Display hint carried for the frontend; computation ignores it.
    #[serde(default)]
    pub log_scale: Option<bool>,
}

impl TargetData {
    /// Decode the wire `index_col` into an index choice.
    pub fn index_choice(&self) -> Result<IndexChoice> {
        match &self.index_col {
            None | Some(Value::Null) => Ok(IndexChoice::Default),
            Some(Value::String(name)) => Ok(IndexChoice::Column(name.clone())),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(-1) => Ok(IndexChoice::None),
                Some(pos) if pos >= 0 => Ok(IndexChoice::Position(pos as usize)),
                _ => Err(Error::BadRequest(format!(
                    "index_col {n} is not a column position"
                ))),
            },
            Some(other) => Err(Error::BadRequest(format!(
                "index_col {other} is neither a column name nor a position"
            ))),
        }
    }
}

/// A query batch. Range and interval fields sent by dashboards are accepted
/// and ignored; no resampling happens here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub targets: Vec<QueryTarget>,
}

/// Orchestrates listings and batched data queries over one registry.
pub struct QueryHandler {
    registry: SourceRegistry,
}

impl QueryHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            registry: SourceRegistry::new(root),
        }
    }

    /// True when `folder` exists under the data root.
    pub fn folder_exists(&self, folder: &str) -> bool {
        self.registry.folder_exists(folder)
    }

    /// Discoverable sources in `folder`. The declared display type does not
    /// filter the listing.
    pub fn sources(&self, display_type: &str, folder: &str) -> Result<Vec<String>> {
        tracing::debug!(display_type, folder, "Listing sources");
        self.registry.list_sources(folder)
    }

    /// Metric names for one source: the namespaced special catalog followed
    /// by raw columns matching `filter`.
    pub fn metrics(&self, display_type: &str, source: &str, filter: &str) -> Result<Vec<String>> {
        tracing::debug!(display_type, source, filter, "Listing metrics");
        let reader = self.registry.resolve(source)?;
        let mut names: Vec<String> = SpecialMetric::ALL
            .iter()
            .map(|metric| format!("{SPECIAL_PREFIX}{}", metric.name()))
            .collect();
        names.extend(reader.columns(filter));
        Ok(names)
    }

    /// Evaluate a query batch. Failures are per-target: a failed target
    /// contributes an error entry and later targets still run. Targets with
    /// an empty source are skipped outright.
    pub fn data(&self, request: &QueryRequest) -> Vec<QueryResult> {
        let mut results = Vec::new();
        for target in &request.targets {
            if target.source.is_empty() {
                continue;
            }
            match self.run_target(target) {
                Ok(mut shaped) => results.append(&mut shaped),
                Err(e) => {
                    tracing::debug!(
                        source = %target.source,
                        target = %target.target,
                        error = %e,
                        "Query target failed"
                    );
                    results.push(QueryResult::failed(&target.target, &e));
                }
            }
        }
        results
    }

    fn run_target(&self, target: &QueryTarget) -> Result<Vec<QueryResult>> {
        let reader = self.registry.resolve(&target.source)?;
        let options = target.data.clone().unwrap_or_default();
        let index = options.index_choice()?;

        let data = match target.target.strip_prefix(SPECIAL_PREFIX) {
            Some(name) => match SpecialMetric::from_name(name) {
                Some(metric) => ColumnData::Series(metric.compute(reader.as_ref(), &index)?),
                None => {
                    return Err(Error::compute(name, "not in the special metric catalog"));
                }
            },
            // A bare catalog name works too; anything else is a raw column.
            None => match SpecialMetric::from_name(&target.target) {
                Some(metric) => ColumnData::Series(metric.compute(reader.as_ref(), &index)?),
                None => reader.column_values(&[target.target.clone()], &index)?,
            },
        };
        Ok(response::shape(data, target.shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const PORTFOLIO: &str = "\
date,id,pd,default_12m,cur_default
2020-01,a,\"0,1\",0,1
2020-01,b,\"0,2\",0,1
2020-01,c,\"0,9\",1,1
2020-02,d,\"0,3\",0,1
2020-02,e,\"0,8\",1,1
";

    fn handler_with_portfolio() -> (TempDir, QueryHandler) {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("risk");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join("portfolio.csv"), PORTFOLIO).unwrap();
        let handler = QueryHandler::new(dir.path());
        handler.sources("table", "risk").unwrap();
        (dir, handler)
    }

    fn request(body: Value) -> QueryRequest {
        serde_json::from_value(body).expect("request should deserialize")
    }

    #[test]
    fn metrics_lists_specials_then_columns() {
        let (_dir, handler) = handler_with_portfolio();
        let names = handler.metrics("timeseries", "portfolio.csv", "").unwrap();
        assert_eq!(
            names,
            vec![
                "special:agreement_count",
                "special:default_rate",
                "special:avg_PD",
                "special:gini",
                "id",
                "pd",
                "default_12m",
                "cur_default",
            ]
        );
    }

    #[test]
    fn metrics_filter_applies_to_columns_only() {
        let (_dir, handler) = handler_with_portfolio();
        let names = handler.metrics("timeseries", "portfolio.csv", "pd").unwrap();
        assert_eq!(
            names,
            vec![
                "special:agreement_count",
                "special:default_rate",
                "special:avg_PD",
                "special:gini",
                "pd",
            ],
            "specials are always listed; the filter narrows raw columns"
        );
    }

    #[test]
    fn metrics_for_unknown_source_is_not_found() {
        let (_dir, handler) = handler_with_portfolio();
        let err = handler.metrics("timeseries", "other.csv", "").unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "source", .. }));
    }

    #[test]
    fn raw_column_query_returns_sorted_datapoints() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [{"source": "portfolio.csv", "target": "pd"}]
        }));
        let results = handler.data(&req);
        let got = serde_json::to_value(&results).unwrap();
        assert_eq!(
            got,
            json!([{
                "target": "pd",
                "datapoints": [
                    [0.1, 1_577_836_800_000_i64],
                    [0.2, 1_577_836_800_000_i64],
                    [0.9, 1_577_836_800_000_i64],
                    [0.3, 1_580_515_200_000_i64],
                    [0.8, 1_580_515_200_000_i64]
                ]
            }])
        );
    }

    #[test]
    fn special_metric_computes_per_group() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [{"source": "portfolio.csv", "target": "special:agreement_count"}]
        }));
        let results = handler.data(&req);
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([{
                "target": "agreement_count",
                "datapoints": [
                    [3.0, 1_577_836_800_000_i64],
                    [2.0, 1_580_515_200_000_i64]
                ]
            }])
        );
    }

    #[test]
    fn bare_catalog_name_also_computes() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [{"source": "portfolio.csv", "target": "gini"}]
        }));
        let results = handler.data(&req);
        let got = serde_json::to_value(&results).unwrap();
        assert_eq!(got[0]["target"], "gini");
    }

    #[test]
    fn unknown_special_fails_without_corrupting_the_batch() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [
                {"source": "portfolio.csv", "target": "special:volatility"},
                {"source": "portfolio.csv", "target": "special:agreement_count"}
            ]
        }));
        let results = handler.data(&req);
        let got = serde_json::to_value(&results).unwrap();

        assert_eq!(got.as_array().map(Vec::len), Some(2));
        assert_eq!(got[0]["target"], "special:volatility");
        assert!(
            got[0]["error"]
                .as_str()
                .is_some_and(|m| m.contains("volatility")),
            "error should name the unknown metric: {got}"
        );
        assert_eq!(got[1]["target"], "agreement_count");
        assert!(got[1]["datapoints"].is_array());
    }

    #[test]
    fn unknown_source_becomes_an_error_entry() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [{"source": "gone.csv", "target": "pd"}]
        }));
        let got = serde_json::to_value(handler.data(&req)).unwrap();
        assert_eq!(got[0]["target"], "pd");
        assert!(got[0]["error"]
            .as_str()
            .is_some_and(|m| m.contains("source not found")));
    }

    #[test]
    fn empty_source_targets_are_skipped() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [
                {"source": "", "target": "pd"},
                {"source": "portfolio.csv", "target": "pd"}
            ]
        }));
        let results = handler.data(&req);
        assert_eq!(results.len(), 1, "the empty-source target contributes nothing");
    }

    #[test]
    fn table_shape_round_trips() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [{"source": "portfolio.csv", "target": "id", "type": "table"}]
        }));
        let got = serde_json::to_value(handler.data(&req)).unwrap();
        assert_eq!(
            got,
            json!([{
                "type": "table",
                "columns": [{"text": "id"}],
                "rows": [["a"], ["b"], ["c"], ["d"], ["e"]]
            }])
        );
    }

    #[test]
    fn index_override_changes_grouping() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("risk");
        fs::create_dir(&folder).unwrap();
        fs::write(
            folder.join("regions.csv"),
            "date,region,id,pd\n2020-01,north,a,0.1\n2020-01,south,b,0.2\n2020-02,north,c,0.3\n",
        )
        .unwrap();
        let handler = QueryHandler::new(dir.path());
        handler.sources("table", "risk").unwrap();

        let req = request(json!({
            "targets": [{
                "source": "regions.csv",
                "target": "special:agreement_count",
                "data": {"index_col": "region"}
            }]
        }));
        let got = serde_json::to_value(handler.data(&req)).unwrap();
        assert_eq!(
            got,
            json!([{
                "target": "agreement_count",
                "datapoints": [[2.0, "north"], [1.0, "south"]]
            }])
        );
    }

    #[test]
    fn no_index_sentinel_uses_row_positions() {
        let (_dir, handler) = handler_with_portfolio();
        let req = request(json!({
            "targets": [{
                "source": "portfolio.csv",
                "target": "pd",
                "data": {"index_col": -1, "log_scale": true}
            }]
        }));
        let got = serde_json::to_value(handler.data(&req)).unwrap();
        assert_eq!(
            got[0]["datapoints"],
            json!([[0.1, 0], [0.2, 1], [0.9, 2], [0.3, 3], [0.8, 4]])
        );
    }

    #[test]
    fn index_choice_decoding() {
        let cases = [
            (json!({}), IndexChoice::Default),
            (json!({"index_col": null}), IndexChoice::Default),
            (json!({"index_col": -1}), IndexChoice::None),
            (json!({"index_col": 2}), IndexChoice::Position(2)),
            (
                json!({"index_col": "region"}),
                IndexChoice::Column("region".to_string()),
            ),
        ];
        for (body, want) in cases {
            let data: TargetData = serde_json::from_value(body).unwrap();
            assert_eq!(data.index_choice().unwrap(), want);
        }

        let data: TargetData = serde_json::from_value(json!({"index_col": -7})).unwrap();
        assert!(matches!(
            data.index_choice().unwrap_err(),
            Error::BadRequest(_)
        ));
        let data: TargetData = serde_json::from_value(json!({"index_col": [1]})).unwrap();
        assert!(matches!(
            data.index_choice().unwrap_err(),
            Error::BadRequest(_)
        ));
    }
}
