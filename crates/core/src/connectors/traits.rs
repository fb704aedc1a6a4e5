//! Capability traits implemented by the Nhanh.vn and Shopify clients.

use async_trait::async_trait;

use super::errors::ApiError;
use super::models::{MatchKey, Mutation, SourcePage, TargetRecord};
use crate::sync::SyncType;

/// Paginated reads from the source system.
#[async_trait]
pub trait SourcePager: Send + Sync {
    /// Fetch the page identified by `page_token` (`None` for the first page).
    async fn fetch_page(
        &self,
        sync_type: SyncType,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<SourcePage, ApiError>;
}

/// Lookups against the target system.
#[async_trait]
pub trait TargetLookup: Send + Sync {
    /// Every target record carrying `key`. More than one result is an ambiguous match.
    async fn lookup(&self, key: &MatchKey) -> Result<Vec<TargetRecord>, ApiError>;
}

/// Writes against the target system.
#[async_trait]
pub trait TargetMutate: Send + Sync {
    /// Apply a create or update and return the target id of the written record.
    async fn mutate(&self, mutation: Mutation<'_>) -> Result<String, ApiError>;
}

/// Full target capability: lookup plus mutate.
pub trait TargetApi: TargetLookup + TargetMutate {}

impl<T: TargetLookup + TargetMutate> TargetApi for T {}
