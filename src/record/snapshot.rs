// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Snapshot: the cached JSON form of a record.
//!
//! Stored under `<prefix>:obj:<id>` as a flat JSON object:
//! ```json
//! {"id": 42, "title": "...", "timestamp": "2026-01-01T09:30:00+00:00", "score": 0.8}
//! ```
//!
//! The `id` field is mandatory and must match the key it was read from.
//! Anything else is treated as a corrupt payload ([`DecodeError`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A snapshot payload that does not match the snapshot schema.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Corrupt snapshot at '{key}': {reason}")]
pub struct DecodeError {
    pub key: String,
    pub reason: String,
}

/// Serialized form of a record, keyed by record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Snapshot {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter. The `id` field is reserved and ignored here.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        if name != "id" {
            self.fields.insert(name.to_string(), value.into());
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a payload read from `key`, checking it belongs to `expected_id`.
    pub fn decode(key: &str, expected_id: i64, raw: &str) -> Result<Self, DecodeError> {
        let corrupt = |reason: String| DecodeError {
            key: key.to_string(),
            reason,
        };

        let value: Value = serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;
        if !value.is_object() {
            return Err(corrupt("payload is not a JSON object".into()));
        }
        let snapshot: Snapshot = serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
        if snapshot.id != expected_id {
            return Err(corrupt(format!("id mismatch: expected {}, found {}", expected_id, snapshot.id)));
        }
        Ok(snapshot)
    }
}
