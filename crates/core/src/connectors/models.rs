//! Record shapes exchanged with the source and target systems.
//!
//! Only the fields needed for matching and upsert are modelled; everything
//! else travels as opaque JSON in `fields`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record read from the source system (Nhanh.vn).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// Source-system identifier
    pub id: String,
    pub fields: BTreeMap<String, Value>,
}

impl SyncRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field value as text, for string and number fields.
    pub fn text(&self, name: &str) -> Option<String> {
        field_text(self.fields.get(name)?)
    }
}

/// A record that already exists in the target system (Shopify).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    /// Target-system identifier
    pub id: String,
    pub fields: BTreeMap<String, Value>,
}

impl TargetRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        field_text(self.fields.get(name)?)
    }
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One page of source records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePage {
    pub records: Vec<SyncRecord>,
    /// Opaque token for the following page; `None` on the last page
    pub next_page_token: Option<String>,
    /// Total number of records, when the source reports it
    pub total: Option<u64>,
}

/// Kind of identifying key used to look a record up in the target system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKeyKind {
    Phone,
    Email,
    Sku,
    Code,
}

impl MatchKeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKeyKind::Phone => "phone",
            MatchKeyKind::Email => "email",
            MatchKeyKind::Sku => "sku",
            MatchKeyKind::Code => "code",
        }
    }
}

/// A normalized lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    pub kind: MatchKeyKind,
    pub value: String,
}

impl MatchKey {
    pub fn new(kind: MatchKeyKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for MatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.kind.as_str(), self.value)
    }
}

/// A write against the target system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation<'a> {
    Create(&'a SyncRecord),
    Update {
        target_id: &'a str,
        record: &'a SyncRecord,
    },
}
