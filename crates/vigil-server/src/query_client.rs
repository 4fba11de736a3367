use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use vigil_alert::query::{QueryError, QueryProvider};
use vigil_common::query::CompositeQuery;
use vigil_common::types::Series;

/// Longest response body kept in a status error.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct QueryRangeResponse {
    #[serde(default)]
    series: Vec<Series>,
}

/// Runs composite queries against the telemetry store's query-range
/// endpoint over HTTP.
///
/// The request body is
/// `{"compositeQuery": {...}, "start": <epoch ms>, "end": <epoch ms>}` and
/// the response is expected as
/// `{"series": [{"queryName": "A", "labels": {}, "points": []}]}`.
pub struct HttpQueryProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpQueryProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub(crate) fn request_body(
    query: &CompositeQuery,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "compositeQuery": query,
        "start": start.timestamp_millis(),
        "end": end.timestamp_millis(),
    })
}

pub(crate) fn decode_response(body: &[u8]) -> Result<Vec<Series>, QueryError> {
    serde_json::from_slice::<QueryRangeResponse>(body)
        .map(|resp| resp.series)
        .map_err(|e| QueryError::Decode(e.to_string()))
}

#[async_trait]
impl QueryProvider for HttpQueryProvider {
    async fn query_range(
        &self,
        query: &CompositeQuery,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Series>, QueryError> {
        let resp = self
            .client
            .post(self.endpoint.as_str())
            .json(&request_body(query, start, end))
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        if !status.is_success() {
            let mut text = String::from_utf8_lossy(&body).into_owned();
            if text.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
            }
            return Err(QueryError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let series = decode_response(&body)?;
        tracing::debug!(endpoint = %self.endpoint, series = series.len(), "Query range completed");
        Ok(series)
    }
}
