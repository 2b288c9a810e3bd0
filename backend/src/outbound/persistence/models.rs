//! Internal Diesel row structs for database operations.
//!
//! These types never leave the persistence layer.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::idempotency_records;

/// Row read back from `idempotency_records`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = idempotency_records)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct IdempotencyRecordRow {
    pub id: Uuid,
    pub idempotency_key: String,
    pub route_template: String,
    pub requester_id: String,
    pub fingerprint: Vec<u8>,
    pub status: String,
    pub attempt: i32,
    pub response_status: Option<i32>,
    pub response_body: Option<Vec<u8>>,
    pub claimed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// First sighting of a tuple, always inserted as `pending` attempt 1.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = idempotency_records)]
pub(crate) struct NewIdempotencyRecordRow<'a> {
    pub id: Uuid,
    pub idempotency_key: &'a str,
    pub route_template: &'a str,
    pub requester_id: &'a str,
    pub fingerprint: &'a [u8],
    pub status: &'a str,
    pub attempt: i32,
    pub claimed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
