//! Journal document: the persisted form of every goal's progress.
//!
//! The document is versioned. A document with any other version, or one
//! that fails to parse, is ignored wholesale and the next run starts cold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::goal::Dependency;

/// Current journal schema version. Bump when the entry format changes.
pub const JOURNAL_VERSION: u64 = 2;

/// Top-level journal document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
    /// Schema version.
    pub journal_version: u64,
    /// Progress entries keyed by goal id.
    pub entries: BTreeMap<String, JournalEntry>,
}

/// Persisted progress of a single goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// Goal id.
    pub id: String,
    /// Whether the goal must be rebuilt next time regardless of dependencies.
    pub volatile: bool,
    /// Last result.
    pub result: Option<Value>,
    /// The tracking value equals the result and was omitted.
    #[serde(default)]
    pub last_returned_same_track: bool,
    /// Tracking value, when it differs from the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking: Option<Value>,
    /// Dependency groups recorded by the last build.
    #[serde(default)]
    pub dependencies: Vec<Vec<Dependency>>,
    /// Generation of the last modifying build.
    #[serde(default)]
    pub revision: u64,
}

impl Journal {
    /// An empty journal at the current version.
    pub fn new() -> Self {
        Self {
            journal_version: JOURNAL_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Parse a journal document.
    ///
    /// Returns `None` if the version does not match or the document is
    /// malformed.
    pub fn parse(doc: &Value) -> Option<Self> {
        let version = doc.get("journalVersion").and_then(Value::as_u64)?;
        if version != JOURNAL_VERSION {
            return None;
        }
        serde_json::from_value(doc.clone()).ok()
    }

    /// The journal as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a JSON value with tab indentation, as written to disk.
pub fn to_pretty_string(value: &Value) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only ever emits UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
