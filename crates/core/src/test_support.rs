//! Scripted source and target doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::connectors::{
    ApiError, MatchKey, Mutation, SourcePage, SourcePager, SyncRecord, TargetLookup,
    TargetMutate, TargetRecord,
};
use crate::sync::SyncType;

/// Source that serves a fixed record list in pages.
///
/// Page tokens are page indexes rendered as strings; page 0 has no token.
#[derive(Clone, Default)]
pub struct MockSource {
    records: Arc<Mutex<Vec<SyncRecord>>>,
    /// page index -> (remaining failures, error)
    failures: Arc<Mutex<HashMap<usize, (u32, ApiError)>>>,
    stuck: Arc<Mutex<bool>>,
    fetches: Arc<Mutex<Vec<Option<String>>>>,
    report_total: bool,
}

impl MockSource {
    pub fn new(records: Vec<SyncRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            report_total: true,
            ..Default::default()
        }
    }

    /// `count` customer records `nh-1..=nh-count` with distinct phones.
    pub fn customers(count: usize) -> Self {
        Self::new(
            (1..=count)
                .map(|i| {
                    SyncRecord::new(format!("nh-{i}"))
                        .with_field("name", format!("Khách {i}"))
                        .with_field("phone", format!("09{:08}", i))
                })
                .collect(),
        )
    }

    pub fn without_total(mut self) -> Self {
        self.report_total = false;
        self
    }

    /// Fail the fetch of `page` the next `times` times.
    pub fn fail_page(&self, page: usize, times: u32, error: ApiError) {
        self.failures.lock().unwrap().insert(page, (times, error));
    }

    /// Keep answering with the same next-page token.
    pub fn set_stuck(&self) {
        *self.stuck.lock().unwrap() = true;
    }

    pub fn fetches(&self) -> Vec<Option<String>> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourcePager for MockSource {
    async fn fetch_page(
        &self,
        _sync_type: SyncType,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<SourcePage, ApiError> {
        self.fetches
            .lock()
            .unwrap()
            .push(page_token.map(str::to_string));

        let page: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);

        if let Some((remaining, error)) = self.failures.lock().unwrap().get_mut(&page) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }

        let records = self.records.lock().unwrap();
        let start = (page * page_size).min(records.len());
        let end = (start + page_size).min(records.len());
        let next_page_token = if *self.stuck.lock().unwrap() {
            Some(page.max(1).to_string())
        } else if end < records.len() {
            Some((page + 1).to_string())
        } else {
            None
        };

        Ok(SourcePage {
            records: records[start..end].to_vec(),
            next_page_token,
            total: self.report_total.then_some(records.len() as u64),
        })
    }
}

/// Source that takes a permit before every page fetch, holding the run
/// until the test releases more permits.
#[derive(Clone)]
pub struct GatedSource {
    gate: Arc<Semaphore>,
    inner: MockSource,
}

impl GatedSource {
    pub fn new(inner: MockSource, permits: usize) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(permits)),
            inner,
        }
    }

    pub fn release(&self, pages: usize) {
        self.gate.add_permits(pages);
    }

    pub fn inner(&self) -> &MockSource {
        &self.inner
    }
}

#[async_trait]
impl SourcePager for GatedSource {
    async fn fetch_page(
        &self,
        sync_type: SyncType,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<SourcePage, ApiError> {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.inner.fetch_page(sync_type, page_token, page_size).await
    }
}

/// Target store keyed by match key, recording every mutation.
#[derive(Clone, Default)]
pub struct MockTarget {
    records: Arc<Mutex<HashMap<MatchKey, Vec<TargetRecord>>>>,
    failing_sources: Arc<Mutex<HashSet<String>>>,
    mutations: Arc<Mutex<Vec<String>>>,
    lookups: Arc<Mutex<usize>>,
}

impl MockTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: MatchKey, record: TargetRecord) {
        self.records
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push(record);
    }

    /// Reject mutations of the given source record.
    pub fn fail_for(&self, source_id: &str) {
        self.failing_sources
            .lock()
            .unwrap()
            .insert(source_id.to_string());
    }

    /// `create:<source id>` or `update:<target id>` per applied mutation.
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn lookup_count(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl TargetLookup for MockTarget {
    async fn lookup(&self, key: &MatchKey) -> Result<Vec<TargetRecord>, ApiError> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TargetMutate for MockTarget {
    async fn mutate(&self, mutation: Mutation<'_>) -> Result<String, ApiError> {
        let (source_id, entry, target_id) = match mutation {
            Mutation::Create(record) => (
                record.id.clone(),
                format!("create:{}", record.id),
                format!("gid-{}", record.id),
            ),
            Mutation::Update { target_id, record } => (
                record.id.clone(),
                format!("update:{}", target_id),
                target_id.to_string(),
            ),
        };

        if self.failing_sources.lock().unwrap().contains(&source_id) {
            return Err(ApiError::Rejected {
                api: "shopify".to_string(),
                status: 422,
                message: format!("record {} is invalid", source_id),
            });
        }

        self.mutations.lock().unwrap().push(entry);
        Ok(target_id)
    }
}
