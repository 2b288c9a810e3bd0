//! In-memory idempotency store honouring the conditional-write contract.
//!
//! Each trait method runs under one mutex acquisition, which gives the same
//! per-statement atomicity PostgreSQL gives the Diesel adapter.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{IdempotencyStore, IdempotencyStoreError, ReclaimRequest};
use crate::domain::{
    IdempotencyClaim, IdempotencyKey, IdempotencyRecord, NewPendingRecord, RecordStatus,
    RequesterId, RouteTemplate, StoredResponse,
};

type TupleKey = (String, String, String);

fn tuple(key: &IdempotencyKey, route: &RouteTemplate, requester: &RequesterId) -> TupleKey {
    (
        key.as_ref().to_owned(),
        route.as_ref().to_owned(),
        requester.as_ref().to_owned(),
    )
}

#[derive(Default)]
struct Faults {
    unavailable: bool,
    complete_error: Option<IdempotencyStoreError>,
    mark_failed_error: Option<IdempotencyStoreError>,
}

/// Mutex-backed [`IdempotencyStore`] for tests.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<TupleKey, IdempotencyRecord>>,
    faults: Mutex<Faults>,
    reclaims: AtomicUsize,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record.
    pub fn records(&self) -> Vec<IdempotencyRecord> {
        self.lock_records().values().cloned().collect()
    }

    /// Successful reclaims so far.
    pub fn reclaim_count(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }

    /// Seed or overwrite a record directly.
    pub fn insert_record(&self, record: IdempotencyRecord) {
        let tuple_key = tuple(&record.key, &record.route, &record.requester);
        self.lock_records().insert(tuple_key, record);
    }

    /// Fail every call with a connection error while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock_faults().unavailable = unavailable;
    }

    /// Fail `complete` calls with `error` while set.
    pub fn set_complete_error(&self, error: Option<IdempotencyStoreError>) {
        self.lock_faults().complete_error = error;
    }

    /// Fail `mark_failed` calls with `error` while set.
    pub fn set_mark_failed_error(&self, error: Option<IdempotencyStoreError>) {
        self.lock_faults().mark_failed_error = error;
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, HashMap<TupleKey, IdempotencyRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("idempotency store mutex poisoned"),
        }
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        match self.faults.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("fault mutex poisoned"),
        }
    }

    fn check_available(&self) -> Result<(), IdempotencyStoreError> {
        if self.lock_faults().unavailable {
            return Err(IdempotencyStoreError::connection("in-memory store offline"));
        }
        Ok(())
    }

    fn find_by_id<'a>(
        records: &'a mut HashMap<TupleKey, IdempotencyRecord>,
        claim: &IdempotencyClaim,
    ) -> Option<&'a mut IdempotencyRecord> {
        records
            .values_mut()
            .find(|record| record.id == claim.record_id)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn insert_pending(
        &self,
        record: &NewPendingRecord,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        self.check_available()?;
        let mut records = self.lock_records();
        let tuple_key = tuple(&record.key, &record.route, &record.requester);
        if records.contains_key(&tuple_key) {
            return Ok(None);
        }
        let inserted = IdempotencyRecord {
            id: record.id,
            key: record.key.clone(),
            route: record.route.clone(),
            requester: record.requester.clone(),
            fingerprint: record.fingerprint,
            status: RecordStatus::Pending,
            attempt: 1,
            response: None,
            claimed_at: record.claimed_at,
            created_at: record.claimed_at,
            completed_at: None,
        };
        records.insert(tuple_key, inserted.clone());
        Ok(Some(inserted))
    }

    async fn find(
        &self,
        key: &IdempotencyKey,
        route: &RouteTemplate,
        requester: &RequesterId,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        self.check_available()?;
        Ok(self.lock_records().get(&tuple(key, route, requester)).cloned())
    }

    async fn reclaim(
        &self,
        request: &ReclaimRequest,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        self.check_available()?;
        let mut records = self.lock_records();
        let Some(record) = records
            .values_mut()
            .find(|record| record.id == request.record_id)
        else {
            return Ok(None);
        };
        let reclaimable = record.status == RecordStatus::Failed
            || (record.status == RecordStatus::Pending && record.claimed_at < request.stale_before);
        if record.attempt != request.observed_attempt || !reclaimable {
            return Ok(None);
        }
        record.status = RecordStatus::Pending;
        record.attempt += 1;
        record.fingerprint = request.fingerprint;
        record.claimed_at = request.claimed_at;
        record.response = None;
        record.completed_at = None;
        self.reclaims.fetch_add(1, Ordering::SeqCst);
        Ok(Some(record.clone()))
    }

    async fn complete(
        &self,
        claim: &IdempotencyClaim,
        response: &StoredResponse,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, IdempotencyStoreError> {
        self.check_available()?;
        if let Some(error) = self.lock_faults().complete_error.clone() {
            return Err(error);
        }
        let mut records = self.lock_records();
        let Some(record) = Self::find_by_id(&mut records, claim) else {
            return Ok(false);
        };
        if record.attempt != claim.attempt || record.status != RecordStatus::Pending {
            return Ok(false);
        }
        record.status = RecordStatus::Completed;
        record.response = Some(response.clone());
        record.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn mark_failed(&self, claim: &IdempotencyClaim) -> Result<bool, IdempotencyStoreError> {
        self.check_available()?;
        if let Some(error) = self.lock_faults().mark_failed_error.clone() {
            return Err(error);
        }
        let mut records = self.lock_records();
        let Some(record) = Self::find_by_id(&mut records, claim) else {
            return Ok(false);
        };
        if record.attempt != claim.attempt || record.status != RecordStatus::Pending {
            return Ok(false);
        }
        record.status = RecordStatus::Failed;
        Ok(true)
    }
}
