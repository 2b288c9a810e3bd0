//! PostgreSQL-backed [`IdempotencyStore`] using Diesel.
//!
//! Each ownership decision is one statement: the insert relies on
//! `ON CONFLICT DO NOTHING RETURNING`, and reclaim, complete and mark-failed
//! are `UPDATE`s guarded on the observed attempt. Two callers racing on the
//! same tuple therefore cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ports::{IdempotencyStore, IdempotencyStoreError, ReclaimRequest};
use crate::domain::{
    IdempotencyClaim, IdempotencyKey, IdempotencyRecord, NewPendingRecord, RecordId,
    RecordStatus, RequestFingerprint, RequesterId, RouteTemplate, StoredResponse,
};

use super::models::{IdempotencyRecordRow, NewIdempotencyRecordRow};
use super::pool::{DbPool, PoolError};
use super::schema::idempotency_records;

/// Diesel-backed implementation of the [`IdempotencyStore`] port.
#[derive(Clone)]
pub struct DieselIdempotencyStore {
    pool: DbPool,
}

impl DieselIdempotencyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> IdempotencyStoreError {
    IdempotencyStoreError::connection(error.message())
}

fn map_diesel_error(error: diesel::result::Error, operation: &str) -> IdempotencyStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), %operation, "diesel operation failed");
        }
        other => debug!(error = %other, %operation, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            IdempotencyStoreError::connection("database connection closed")
        }
        DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, _) => {
            IdempotencyStoreError::query(format!("{operation}: record violates table constraints"))
        }
        _ => IdempotencyStoreError::query(format!("{operation}: database error")),
    }
}

fn corrupt(field: &str, detail: impl std::fmt::Display) -> IdempotencyStoreError {
    IdempotencyStoreError::corrupt(format!("{field}: {detail}"))
}

fn row_to_record(row: IdempotencyRecordRow) -> Result<IdempotencyRecord, IdempotencyStoreError> {
    let status: RecordStatus = row.status.parse().map_err(|err| corrupt("status", err))?;
    let response = row
        .response_status
        .map(|code| {
            u16::try_from(code)
                .map(|code| StoredResponse::new(code, row.response_body))
                .map_err(|err| corrupt("response_status", err))
        })
        .transpose()?;

    Ok(IdempotencyRecord {
        id: RecordId::from_uuid(row.id),
        key: IdempotencyKey::new(row.idempotency_key)
            .map_err(|err| corrupt("idempotency_key", err))?,
        route: RouteTemplate::new(row.route_template)
            .map_err(|err| corrupt("route_template", err))?,
        requester: RequesterId::new(row.requester_id)
            .map_err(|err| corrupt("requester_id", err))?,
        fingerprint: RequestFingerprint::try_from_bytes(&row.fingerprint)
            .map_err(|err| corrupt("fingerprint", err))?,
        status,
        attempt: u32::try_from(row.attempt).map_err(|err| corrupt("attempt", err))?,
        response,
        claimed_at: row.claimed_at,
        created_at: row.created_at,
        completed_at: row.completed_at,
    })
}

fn attempt_column(attempt: u32) -> Result<i32, IdempotencyStoreError> {
    i32::try_from(attempt)
        .map_err(|_| IdempotencyStoreError::query(format!("attempt {attempt} out of range")))
}

#[async_trait]
impl IdempotencyStore for DieselIdempotencyStore {
    async fn insert_pending(
        &self,
        record: &NewPendingRecord,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row = NewIdempotencyRecordRow {
            id: *record.id.as_uuid(),
            idempotency_key: record.key.as_ref(),
            route_template: record.route.as_ref(),
            requester_id: record.requester.as_ref(),
            fingerprint: record.fingerprint.as_bytes().as_slice(),
            status: RecordStatus::Pending.as_str(),
            attempt: 1,
            claimed_at: record.claimed_at,
            created_at: record.claimed_at,
        };

        let inserted = diesel::insert_into(idempotency_records::table)
            .values(&row)
            .on_conflict_do_nothing()
            .returning(IdempotencyRecordRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "insert pending record"))?;

        inserted.map(row_to_record).transpose()
    }

    async fn find(
        &self,
        key: &IdempotencyKey,
        route: &RouteTemplate,
        requester: &RequesterId,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row = idempotency_records::table
            .filter(idempotency_records::idempotency_key.eq(key.as_ref()))
            .filter(idempotency_records::route_template.eq(route.as_ref()))
            .filter(idempotency_records::requester_id.eq(requester.as_ref()))
            .select(IdempotencyRecordRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "find record"))?;

        row.map(row_to_record).transpose()
    }

    async fn reclaim(
        &self,
        request: &ReclaimRequest,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyStoreError> {
        use idempotency_records::dsl as r;

        let observed = attempt_column(request.observed_attempt)?;
        let next = observed
            .checked_add(1)
            .ok_or_else(|| IdempotencyStoreError::query("attempt counter exhausted"))?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let reclaimable = r::status.eq(RecordStatus::Failed.as_str()).or(r::status
            .eq(RecordStatus::Pending.as_str())
            .and(r::claimed_at.lt(request.stale_before)));

        let row = diesel::update(
            r::idempotency_records
                .filter(r::id.eq(request.record_id.as_uuid()))
                .filter(r::attempt.eq(observed))
                .filter(reclaimable),
        )
        .set((
            r::status.eq(RecordStatus::Pending.as_str()),
            r::attempt.eq(next),
            r::fingerprint.eq(request.fingerprint.as_bytes().as_slice()),
            r::claimed_at.eq(request.claimed_at),
            r::response_status.eq(None::<i32>),
            r::response_body.eq(None::<Vec<u8>>),
            r::completed_at.eq(None::<DateTime<Utc>>),
        ))
        .returning(IdempotencyRecordRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(|err| map_diesel_error(err, "reclaim record"))?;

        row.map(row_to_record).transpose()
    }

    async fn complete(
        &self,
        claim: &IdempotencyClaim,
        response: &StoredResponse,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, IdempotencyStoreError> {
        use idempotency_records::dsl as r;

        let attempt = attempt_column(claim.attempt)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(
            r::idempotency_records
                .filter(r::id.eq(claim.record_id.as_uuid()))
                .filter(r::attempt.eq(attempt))
                .filter(r::status.eq(RecordStatus::Pending.as_str())),
        )
        .set((
            r::status.eq(RecordStatus::Completed.as_str()),
            r::response_status.eq(Some(i32::from(response.status))),
            r::response_body.eq(response.body.as_deref()),
            r::completed_at.eq(Some(completed_at)),
        ))
        .execute(&mut conn)
        .await
        .map_err(|err| map_diesel_error(err, "complete record"))?;

        Ok(updated == 1)
    }

    async fn mark_failed(&self, claim: &IdempotencyClaim) -> Result<bool, IdempotencyStoreError> {
        use idempotency_records::dsl as r;

        let attempt = attempt_column(claim.attempt)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let updated = diesel::update(
            r::idempotency_records
                .filter(r::id.eq(claim.record_id.as_uuid()))
                .filter(r::attempt.eq(attempt))
                .filter(r::status.eq(RecordStatus::Pending.as_str())),
        )
        .set(r::status.eq(RecordStatus::Failed.as_str()))
        .execute(&mut conn)
        .await
        .map_err(|err| map_diesel_error(err, "mark record failed"))?;

        Ok(updated == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use uuid::Uuid;

    #[fixture]
    fn row() -> IdempotencyRecordRow {
        let now = Utc::now();
        IdempotencyRecordRow {
            id: Uuid::new_v4(),
            idempotency_key: "retry-7f3a".to_owned(),
            route_template: "PATCH /api/v1/users/me".to_owned(),
            requester_id: format!("user:{}", Uuid::new_v4()),
            fingerprint: vec![7; 32],
            status: "completed".to_owned(),
            attempt: 2,
            response_status: Some(200),
            response_body: Some(br#"{"displayName":"Ann"}"#.to_vec()),
            claimed_at: now,
            created_at: now,
            completed_at: Some(now),
        }
    }

    #[rstest]
    fn completed_row_maps_to_record(row: IdempotencyRecordRow) {
        let record = row_to_record(row).expect("valid row");

        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.attempt, 2);
        assert_eq!(
            record.response,
            Some(StoredResponse::new(
                200,
                Some(br#"{"displayName":"Ann"}"#.to_vec())
            ))
        );
    }

    #[rstest]
    fn pending_row_has_no_response(mut row: IdempotencyRecordRow) {
        row.status = "pending".to_owned();
        row.response_status = None;
        row.response_body = None;
        row.completed_at = None;

        let record = row_to_record(row).expect("valid row");
        assert_eq!(record.status, RecordStatus::Pending);
        assert!(record.response.is_none());
    }

    #[rstest]
    #[case::status(|row: &mut IdempotencyRecordRow| row.status = "done".to_owned(), "status")]
    #[case::fingerprint(|row: &mut IdempotencyRecordRow| row.fingerprint = vec![1; 16], "fingerprint")]
    #[case::attempt(|row: &mut IdempotencyRecordRow| row.attempt = -1, "attempt")]
    #[case::response_status(|row: &mut IdempotencyRecordRow| row.response_status = Some(70_000), "response_status")]
    #[case::requester(|row: &mut IdempotencyRecordRow| row.requester_id = String::new(), "requester_id")]
    #[case::route(|row: &mut IdempotencyRecordRow| row.route_template = "users/me".to_owned(), "route_template")]
    fn corrupt_rows_are_reported(
        mut row: IdempotencyRecordRow,
        #[case] damage: fn(&mut IdempotencyRecordRow),
        #[case] field: &str,
    ) {
        damage(&mut row);
        let err = row_to_record(row).expect_err("corrupt row");

        assert!(matches!(err, IdempotencyStoreError::Corrupt { .. }));
        assert!(err.to_string().contains(field), "{err} should name {field}");
    }

    #[rstest]
    fn pool_errors_map_to_connection() {
        let err = map_pool_error(PoolError::checkout("timed out"));
        assert_eq!(err, IdempotencyStoreError::connection("timed out"));
    }

    #[rstest]
    fn closed_connection_maps_to_connection() {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};

        let err = map_diesel_error(
            DieselError::DatabaseError(
                DatabaseErrorKind::ClosedConnection,
                Box::new("server closed the connection".to_owned()),
            ),
            "find record",
        );
        assert!(matches!(err, IdempotencyStoreError::Connection { .. }));
    }

    #[rstest]
    fn other_diesel_errors_name_the_operation() {
        let err = map_diesel_error(diesel::result::Error::NotFound, "complete record");
        assert!(matches!(err, IdempotencyStoreError::Query { .. }));
        assert!(err.to_string().contains("complete record"));
    }

    #[rstest]
    fn attempts_beyond_i32_are_rejected() {
        assert!(attempt_column(u32::MAX).is_err());
        assert_eq!(attempt_column(3).expect("in range"), 3);
    }
}
