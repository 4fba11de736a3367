use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// An ordered set of identifying key/value attributes of a time series.
///
/// Ordering is by key, which makes both the fingerprint and the
/// `Display` output independent of insertion order.
///
/// # Examples
///
/// ```
/// use vigil_common::types::Labels;
///
/// let a = Labels::from_pairs([("service", "api"), ("env", "prod")]);
/// let b = Labels::from_pairs([("env", "prod"), ("service", "api")]);
/// assert_eq!(a.fingerprint(), b.fingerprint());
/// assert_eq!(a.to_string(), "env=prod, service=api");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Returns a copy of `self` overlaid with `other`; keys in `other` win.
    pub fn merged(&self, other: &Labels) -> Labels {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Stable 64-bit identity of the label set, used to key alerts within a rule.
    ///
    /// Pairs are hashed in key order with separator bytes that cannot occur
    /// in UTF-8, so `{"a": "bc"}` and `{"ab": "c"}` never collide by
    /// construction.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Sha256::new();
        for (k, v) in &self.0 {
            hasher.update(k.as_bytes());
            hasher.update([0xff]);
            hasher.update(v.as_bytes());
            hasher.update([0xfe]);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }
}

impl std::fmt::Display for Labels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// A single observation of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A labelled series of samples as returned by the query collaborator.
/// Points are expected in ascending time order.
///
/// `query_name` names the sub-query of the composite query that produced
/// the series. It is empty when the provider only returns the result of
/// the query being alerted on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(rename = "queryName", default, skip_serializing_if = "String::is_empty")]
    pub query_name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub points: Vec<Sample>,
}

impl Series {
    pub fn new(labels: Labels, points: Vec<Sample>) -> Self {
        Self {
            query_name: String::new(),
            labels,
            points,
        }
    }

    pub fn with_query_name(mut self, name: impl Into<String>) -> Self {
        self.query_name = name.into();
        self
    }

    /// Whether the series belongs to sub-query `name`. Untagged series
    /// belong to every query.
    pub fn is_from_query(&self, name: &str) -> bool {
        self.query_name.is_empty() || name.is_empty() || self.query_name == name
    }

    /// Points with `timestamp >= start`.
    pub fn points_since(&self, start: DateTime<Utc>) -> &[Sample] {
        let idx = self.points.partition_point(|p| p.timestamp < start);
        &self.points[idx..]
    }

    /// Points with `timestamp < end`.
    pub fn points_before(&self, end: DateTime<Utc>) -> &[Sample] {
        let idx = self.points.partition_point(|p| p.timestamp < end);
        &self.points[..idx]
    }
}
