//! Composite query model shared between rule definitions and the query
//! collaborator. The alert engine only looks at the query type and the
//! names of the sub-queries; everything else is passed through verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryValidationError {
    #[error("query type is required")]
    QueryTypeRequired,

    #[error("at least one {0} query is required")]
    NoQueries(QueryType),

    #[error("query {key:?} has mismatched queryName {name:?}")]
    NameMismatch { key: String, name: String },

    #[error("query {0:?}: expression is required")]
    ExpressionRequired(String),

    #[error("query {0:?}: query text is required")]
    QueryTextRequired(String),
}

/// Tag identifying how a composite query is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    #[default]
    #[serde(rename = "")]
    Unknown,
    #[serde(rename = "builder")]
    Builder,
    #[serde(rename = "clickhouse_sql")]
    ClickHouseSql,
    #[serde(rename = "promql")]
    PromQl,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Unknown => write!(f, "unknown"),
            QueryType::Builder => write!(f, "builder"),
            QueryType::ClickHouseSql => write!(f, "clickhouse_sql"),
            QueryType::PromQl => write!(f, "promql"),
        }
    }
}

/// A structured query produced by the query builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderQuery {
    pub query_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aggregate_operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_attribute: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<serde_json::Value>,
    #[serde(default)]
    pub expression: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_interval: Option<i64>,
}

/// A raw query string in one of the free-form query languages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
}

/// A query definition holding one or more named sub-queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeQuery {
    #[serde(default)]
    pub query_type: QueryType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub builder_queries: BTreeMap<String, BuilderQuery>,
    #[serde(default, rename = "chQueries", skip_serializing_if = "BTreeMap::is_empty")]
    pub clickhouse_queries: BTreeMap<String, RawQuery>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prom_queries: BTreeMap<String, RawQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl CompositeQuery {
    pub fn validate(&self) -> Result<(), QueryValidationError> {
        match self.query_type {
            QueryType::Unknown => Err(QueryValidationError::QueryTypeRequired),
            QueryType::Builder => {
                if self.builder_queries.is_empty() {
                    return Err(QueryValidationError::NoQueries(self.query_type));
                }
                for (key, q) in &self.builder_queries {
                    if q.query_name != *key {
                        return Err(QueryValidationError::NameMismatch {
                            key: key.clone(),
                            name: q.query_name.clone(),
                        });
                    }
                    if q.expression.trim().is_empty() {
                        return Err(QueryValidationError::ExpressionRequired(key.clone()));
                    }
                }
                Ok(())
            }
            QueryType::ClickHouseSql => validate_raw(self.query_type, &self.clickhouse_queries),
            QueryType::PromQl => validate_raw(self.query_type, &self.prom_queries),
        }
    }

    /// Names of the sub-queries of the active query type.
    pub fn query_names(&self) -> Vec<&str> {
        match self.query_type {
            QueryType::Builder => self.builder_queries.keys().map(String::as_str).collect(),
            QueryType::ClickHouseSql => self.clickhouse_queries.keys().map(String::as_str).collect(),
            QueryType::PromQl => self.prom_queries.keys().map(String::as_str).collect(),
            QueryType::Unknown => Vec::new(),
        }
    }
}

fn validate_raw(
    query_type: QueryType,
    queries: &BTreeMap<String, RawQuery>,
) -> Result<(), QueryValidationError> {
    if queries.is_empty() {
        return Err(QueryValidationError::NoQueries(query_type));
    }
    for (name, q) in queries {
        if !q.disabled && q.query.trim().is_empty() {
            return Err(QueryValidationError::QueryTextRequired(name.clone()));
        }
    }
    Ok(())
}
