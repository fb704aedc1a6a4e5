use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{NHANH_API, SHOPIFY_API};
use crate::connectors::{SourcePager, TargetApi};
use crate::errors::{Error, Result};
use crate::matching::{Matcher, RecordMatcher};
use crate::ratelimit::ApiName;
use crate::sync::SyncType;

/// Everything the batch executor needs to run one sync type.
#[derive(Clone)]
pub struct RegistryEntry {
    pub sync_type: SyncType,
    pub matcher: Arc<dyn Matcher>,
    pub source: Arc<dyn SourcePager>,
    pub target: Arc<dyn TargetApi>,
    pub page_size: usize,
    /// Rate-limit bucket charged for source calls
    pub source_api: ApiName,
    /// Rate-limit bucket charged for target calls
    pub target_api: ApiName,
}

impl RegistryEntry {
    /// Entry using the default matcher of `sync_type` and the Nhanh.vn/Shopify
    /// rate-limit buckets.
    pub fn new(
        sync_type: SyncType,
        source: Arc<dyn SourcePager>,
        target: Arc<dyn TargetApi>,
        page_size: usize,
    ) -> Self {
        Self {
            sync_type,
            matcher: Arc::new(RecordMatcher::for_sync_type(sync_type)),
            source,
            target,
            page_size,
            source_api: Cow::Borrowed(NHANH_API),
            target_api: Cow::Borrowed(SHOPIFY_API),
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_apis(mut self, source_api: ApiName, target_api: ApiName) -> Self {
        self.source_api = source_api;
        self.target_api = target_api;
        self
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("sync_type", &self.sync_type)
            .field("page_size", &self.page_size)
            .field("source_api", &self.source_api)
            .field("target_api", &self.target_api)
            .finish_non_exhaustive()
    }
}

/// Read-only lookup of registered sync types.
///
/// Built once at startup; adding a sync type means registering one more entry.
#[derive(Clone, Default)]
pub struct SyncRegistry {
    entries: HashMap<SyncType, Arc<RegistryEntry>>,
}

impl SyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry, replacing any previous one for the same sync type.
    pub fn register(mut self, entry: RegistryEntry) -> Result<Self> {
        if entry.page_size == 0 {
            return Err(Error::Validation(format!(
                "page size for {} must be positive",
                entry.sync_type
            )));
        }
        if entry.matcher.sync_type() != entry.sync_type {
            return Err(Error::Validation(format!(
                "matcher for {} is registered under {}",
                entry.matcher.sync_type(),
                entry.sync_type
            )));
        }
        self.entries.insert(entry.sync_type, Arc::new(entry));
        Ok(self)
    }

    pub fn resolve(&self, sync_type: SyncType) -> Result<Arc<RegistryEntry>> {
        self.entries
            .get(&sync_type)
            .cloned()
            .ok_or_else(|| Error::UnknownSyncType(sync_type.to_string()))
    }

    /// Resolve a sync type given by name, as received from callers.
    pub fn resolve_name(&self, name: &str) -> Result<Arc<RegistryEntry>> {
        let sync_type: SyncType = name.parse()?;
        self.resolve(sync_type)
    }

    pub fn is_registered(&self, sync_type: SyncType) -> bool {
        self.entries.contains_key(&sync_type)
    }

    /// Registered sync types in a stable order.
    pub fn sync_types(&self) -> Vec<SyncType> {
        let mut types: Vec<SyncType> = self.entries.keys().copied().collect();
        types.sort();
        types
    }
}
