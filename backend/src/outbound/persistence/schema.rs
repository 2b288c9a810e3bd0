//! Diesel table definitions for the PostgreSQL schema.
//!
//! Must match `backend/migrations` exactly; regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Deduplication records for keyed mutating requests.
    ///
    /// `(idempotency_key, route_template, requester_id)` is unique.
    idempotency_records (id) {
        id -> Uuid,
        #[max_length = 255]
        idempotency_key -> Varchar,
        #[max_length = 255]
        route_template -> Varchar,
        #[max_length = 128]
        requester_id -> Varchar,
        /// SHA-256 of the canonical fingerprint fields (32 bytes).
        fingerprint -> Bytea,
        /// One of `pending`, `completed`, `failed`.
        #[max_length = 16]
        status -> Varchar,
        /// Claim generation, bumped by every reclaim.
        attempt -> Int4,
        response_status -> Nullable<Int4>,
        response_body -> Nullable<Bytea>,
        claimed_at -> Timestamptz,
        created_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}
