//! Source-to-target record matching.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::match_model::MatchResult;
use super::normalize::{
    normalize_code, normalize_email, normalize_phone, normalize_sku, values_equal,
};
use crate::connectors::{ApiError, MatchKey, MatchKeyKind, SyncRecord, TargetLookup, TargetRecord};
use crate::sync::SyncType;

/// Decides how a source record maps onto the target system.
///
/// The algorithm shape is the same for every sync type: normalize the
/// identifying fields, look the record up by each key in preference order,
/// then create, update, skip, or flag a conflict. Implementations only choose
/// the keys and the compared fields.
#[async_trait]
pub trait Matcher: Send + Sync {
    fn sync_type(&self) -> SyncType;

    /// Normalized lookup keys, most specific first. Empty when the record has
    /// no usable identifier.
    fn match_keys(&self, source: &SyncRecord) -> Vec<MatchKey>;

    /// Decide the action given the candidates found under `key`.
    fn decide(&self, source: &SyncRecord, key: &MatchKey, candidates: &[TargetRecord])
        -> MatchResult;

    /// Run the full match against the target lookup.
    ///
    /// The first key that yields candidates decides the outcome; when no key
    /// finds anything the record is new.
    async fn match_record(
        &self,
        source: &SyncRecord,
        lookup: &dyn TargetLookup,
    ) -> Result<MatchResult, ApiError> {
        let keys = self.match_keys(source);
        if keys.is_empty() {
            return Err(ApiError::InvalidRecord(format!(
                "{} record {} has no usable match key",
                self.sync_type(),
                source.id
            )));
        }

        for key in &keys {
            let candidates = lookup.lookup(key).await?;
            if !candidates.is_empty() {
                return Ok(self.decide(source, key, &candidates));
            }
        }

        Ok(MatchResult::create(&source.id))
    }
}

/// Normalize a raw field value for the given key kind.
pub fn normalize_key(kind: MatchKeyKind, raw: &str) -> Option<String> {
    match kind {
        MatchKeyKind::Phone => normalize_phone(raw),
        MatchKeyKind::Email => normalize_email(raw),
        MatchKeyKind::Sku => normalize_sku(raw),
        MatchKeyKind::Code => normalize_code(raw),
    }
}

/// Field-driven matcher used by all built-in sync types.
#[derive(Debug, Clone)]
pub struct RecordMatcher {
    sync_type: SyncType,
    /// `(key kind, source field)` pairs in preference order
    key_fields: Vec<(MatchKeyKind, String)>,
    /// Fields compared between source and target to detect updates
    compared_fields: Vec<String>,
}

impl RecordMatcher {
    pub fn new(sync_type: SyncType) -> Self {
        Self {
            sync_type,
            key_fields: Vec::new(),
            compared_fields: Vec::new(),
        }
    }

    pub fn with_key(mut self, kind: MatchKeyKind, field: impl Into<String>) -> Self {
        self.key_fields.push((kind, field.into()));
        self
    }

    pub fn with_compared_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compared_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Customers match by phone, falling back to email.
    pub fn customers() -> Self {
        Self::new(SyncType::Customers)
            .with_key(MatchKeyKind::Phone, "phone")
            .with_key(MatchKeyKind::Email, "email")
            .with_compared_fields(["name", "email", "phone", "address", "birthday", "gender"])
    }

    /// Products match by SKU.
    pub fn products() -> Self {
        Self::new(SyncType::Products)
            .with_key(MatchKeyKind::Sku, "sku")
            .with_compared_fields([
                "title",
                "price",
                "compare_at_price",
                "inventory_quantity",
                "barcode",
                "weight",
            ])
    }

    /// Campaigns match by promotion code.
    pub fn campaigns() -> Self {
        Self::new(SyncType::Campaigns)
            .with_key(MatchKeyKind::Code, "code")
            .with_compared_fields([
                "title",
                "value",
                "value_type",
                "starts_at",
                "ends_at",
                "usage_limit",
            ])
    }

    /// Loyalty balances match by the member's phone.
    pub fn loyalty() -> Self {
        Self::new(SyncType::Loyalty)
            .with_key(MatchKeyKind::Phone, "customer_phone")
            .with_compared_fields(["points", "tier"])
    }

    pub fn for_sync_type(sync_type: SyncType) -> Self {
        match sync_type {
            SyncType::Customers => Self::customers(),
            SyncType::Products => Self::products(),
            SyncType::Campaigns => Self::campaigns(),
            SyncType::Loyalty => Self::loyalty(),
        }
    }

    /// Compared fields present on the source whose value differs on the target.
    ///
    /// Key fields are compared in normalized form, so `0912 345 678` on the
    /// source and `+84912345678` on the target count as equal.
    fn changed_fields(&self, source: &SyncRecord, target: &TargetRecord) -> Vec<String> {
        self.compared_fields
            .iter()
            .filter(|field| source.fields.contains_key(field.as_str()))
            .filter(|field| !self.field_equal(field, source, target))
            .cloned()
            .collect()
    }

    fn field_equal(&self, field: &str, source: &SyncRecord, target: &TargetRecord) -> bool {
        let key_kind = self
            .key_fields
            .iter()
            .find(|(_, key_field)| key_field == field)
            .map(|(kind, _)| *kind);

        if let Some(kind) = key_kind {
            let left = source.text(field).and_then(|raw| normalize_key(kind, &raw));
            let right = target.text(field).and_then(|raw| normalize_key(kind, &raw));
            if left.is_some() || right.is_some() {
                return left == right;
            }
        }

        values_equal(source.field(field), target.field(field))
    }
}

#[async_trait]
impl Matcher for RecordMatcher {
    fn sync_type(&self) -> SyncType {
        self.sync_type
    }

    fn match_keys(&self, source: &SyncRecord) -> Vec<MatchKey> {
        let mut keys: Vec<MatchKey> = Vec::new();
        for (kind, field) in &self.key_fields {
            let Some(raw) = source.text(field) else {
                continue;
            };
            if let Some(value) = normalize_key(*kind, &raw) {
                let key = MatchKey::new(*kind, value);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    fn decide(
        &self,
        source: &SyncRecord,
        key: &MatchKey,
        candidates: &[TargetRecord],
    ) -> MatchResult {
        let distinct: BTreeSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();

        if distinct.len() > 1 {
            let ids: Vec<&str> = distinct.into_iter().collect();
            return MatchResult::conflict(
                &source.id,
                format!(
                    "{} target records match {}: {}",
                    ids.len(),
                    key,
                    ids.join(", ")
                ),
            );
        }

        let Some(target) = candidates.first() else {
            return MatchResult::create(&source.id);
        };

        let changed = self.changed_fields(source, target);
        if changed.is_empty() {
            MatchResult::skip(&source.id, Some(target.id.clone()), "target is up to date")
        } else {
            MatchResult::update(&source.id, &target.id, changed)
        }
    }
}
