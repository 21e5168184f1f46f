use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Variables exported to a worker or collector on top of the inherited environment.
///
/// Layers are concatenated: plan, then schedule, then rendezvous, then rank identity.
/// A key set by a later layer wins, while keeping the slot of its first appearance.
/// Serializes as a bare array of `{key, value}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerEnv(pub Vec<KeyValue>);

impl WorkerEnv {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// One-variable layer.
    pub fn single<K, V>(key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(vec![KeyValue::new(key, value)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value a child would see for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rfind(|kv| kv.key() == key)
            .map(KeyValue::value)
    }

    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.push(key, value);
        self
    }

    /// `self` followed by `layer`.
    pub fn merged(&self, layer: &WorkerEnv) -> WorkerEnv {
        WorkerEnv(self.0.iter().chain(&layer.0).cloned().collect())
    }

    /// One `(key, value)` per variable, in first-seen order with the final value.
    pub fn resolved(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = Vec::with_capacity(self.0.len());
        for kv in &self.0 {
            match out.iter_mut().find(|(k, _)| *k == kv.key()) {
                Some(slot) => slot.1 = kv.value(),
                None => out.push((kv.key(), kv.value())),
            }
        }
        out
    }
}
