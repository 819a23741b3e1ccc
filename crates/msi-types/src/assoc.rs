use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Value stored under a `(space, key)` pair. The bytes are opaque except to
/// vector queries, which read them as packed little-endian `f32`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssocValue {
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts_nanos: Option<u64>,
}

impl AssocValue {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn with_ts(mut self, ts_nanos: u64) -> Self {
        self.ts_nanos = Some(ts_nanos);
        self
    }
}

/// Query against one associative space. `vector` wins over `predicate`; with
/// neither set the query returns up to `k` entries in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssocQuery {
    pub k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl AssocQuery {
    pub fn top(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    pub fn vector(k: usize, vector: Vec<f32>) -> Self {
        Self {
            k,
            vector: Some(vector),
            predicate: None,
        }
    }

    pub fn predicate(k: usize, predicate: impl Into<String>) -> Self {
        Self {
            k,
            vector: None,
            predicate: Some(predicate.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssocResult {
    pub key: String,
    /// Cosine similarity; only set for vector queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AssocValue>,
}
