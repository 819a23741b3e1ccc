use std::collections::HashMap;

use indexmap::IndexMap;
use msi_types::{AssocQuery, AssocResult, AssocValue};
use parking_lot::RwLock;
use tracing::trace;

use crate::forget::ForgetPolicy;
use crate::vector::{cosine_similarity, decode_f32_le};

type Space = IndexMap<String, AssocValue>;

/// Namespaced key/value memory.
///
/// Spaces appear on first write. Entries keep insertion order, which is the
/// order unscored queries return them in.
#[derive(Debug, Default)]
pub struct AssocStore {
    spaces: RwLock<HashMap<String, Space>>,
}

impl AssocStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert. An existing key is replaced wholesale.
    pub fn put(&self, space: &str, key: impl Into<String>, value: AssocValue) {
        let mut spaces = self.spaces.write();
        spaces
            .entry(space.to_string())
            .or_default()
            .insert(key.into(), value);
    }

    pub fn get(&self, space: &str, key: &str) -> Option<AssocValue> {
        self.spaces.read().get(space)?.get(key).cloned()
    }

    pub fn query(&self, space: &str, query: &AssocQuery) -> Vec<AssocResult> {
        let spaces = self.spaces.read();
        let Some(entries) = spaces.get(space) else {
            return Vec::new();
        };
        if let Some(vector) = &query.vector {
            return vector_query(entries, vector, query.k);
        }
        if let Some(predicate) = &query.predicate {
            return predicate_query(entries, predicate, query.k);
        }
        take_unscored(entries.iter(), query.k)
    }

    pub fn forget(&self, space: &str, key_or_policy: &str) {
        let mut spaces = self.spaces.write();
        let Some(entries) = spaces.get_mut(space) else {
            return;
        };
        match ForgetPolicy::parse(key_or_policy) {
            ForgetPolicy::All => entries.clear(),
            ForgetPolicy::Oldest(n) => forget_oldest(entries, n),
            ForgetPolicy::Key(key) => {
                entries.shift_remove(&key);
            }
        }
    }

    pub fn space_exists(&self, space: &str) -> bool {
        self.spaces.read().contains_key(space)
    }

    pub fn space_size(&self, space: &str) -> usize {
        self.spaces.read().get(space).map(|s| s.len()).unwrap_or(0)
    }

    pub fn list_spaces(&self) -> Vec<String> {
        self.spaces.read().keys().cloned().collect()
    }

    pub fn list_keys(&self, space: &str) -> Vec<String> {
        self.spaces
            .read()
            .get(space)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn space_count(&self) -> usize {
        self.spaces.read().len()
    }

    pub fn clear_space(&self, space: &str) {
        if let Some(entries) = self.spaces.write().get_mut(space) {
            entries.clear();
        }
    }

    pub fn clear(&self) {
        self.spaces.write().clear();
    }
}

/// Brute-force cosine ranking over the whole space. An approximate
/// nearest-neighbour index would replace this function without changing the
/// query contract.
fn vector_query(entries: &Space, query: &[f32], k: usize) -> Vec<AssocResult> {
    let mut scored: Vec<AssocResult> = entries
        .iter()
        .filter_map(|(key, value)| {
            let candidate = decode_f32_le(&value.bytes)?;
            if candidate.len() != query.len() {
                return None;
            }
            Some(AssocResult {
                key: key.clone(),
                score: Some(cosine_similarity(query, &candidate)),
                value: Some(value.clone()),
            })
        })
        .collect();
    trace!(candidates = entries.len(), matched = scored.len(), "vector query scored");
    scored.sort_by(|a, b| {
        let a = a.score.unwrap_or(f32::MIN);
        let b = b.score.unwrap_or(f32::MIN);
        b.total_cmp(&a)
    });
    scored.truncate(k);
    scored
}

fn predicate_query(entries: &Space, predicate: &str, k: usize) -> Vec<AssocResult> {
    match predicate.split_once('=') {
        Some((meta_key, meta_value)) => take_unscored(
            entries
                .iter()
                .filter(|(_, v)| v.meta.get(meta_key).map(String::as_str) == Some(meta_value)),
            k,
        ),
        None => take_unscored(entries.iter(), k),
    }
}

fn take_unscored<'a>(
    entries: impl Iterator<Item = (&'a String, &'a AssocValue)>,
    k: usize,
) -> Vec<AssocResult> {
    entries
        .take(k)
        .map(|(key, value)| AssocResult {
            key: key.clone(),
            score: None,
            value: Some(value.clone()),
        })
        .collect()
}

/// Entries without a timestamp count as newest. Ties keep insertion order.
fn forget_oldest(entries: &mut Space, n: usize) {
    let mut by_age: Vec<(&String, u64)> = entries
        .iter()
        .map(|(key, value)| (key, value.ts_nanos.unwrap_or(u64::MAX)))
        .collect();
    by_age.sort_by_key(|(_, ts)| *ts);
    let doomed: Vec<String> = by_age.into_iter().take(n).map(|(k, _)| k.clone()).collect();
    for key in doomed {
        entries.shift_remove(&key);
    }
}
