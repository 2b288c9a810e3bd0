//! Integration tests for `DieselIdempotencyStore` against embedded PostgreSQL.
//!
//! Each test gets its own database cloned from a migrated template. Set
//! `SKIP_TEST_CLUSTER=1` to skip the suite where the cluster cannot start.
//!
//! The store is async while the fixtures are not, so every test owns a Tokio
//! runtime and drives the adapter with `block_on`.

#![allow(clippy::expect_used, reason = "fixtures fail the test loudly")]

use std::sync::Arc;
use std::time::Duration;

use backend::domain::ports::{IdempotencyStore, IdempotencyStoreError, ReclaimRequest};
use backend::domain::{
    IdempotencyClaim, IdempotencyConfig, IdempotencyKey, IdempotencyRecord, IdempotencyService,
    MutationRoute, NewPendingRecord, RecordId, RecordStatus, RequestFingerprint, RequesterId,
    ResolveOutcome, ResolveRequest, StoredResponse, UserId,
};
use backend::outbound::persistence::{DbPool, DieselIdempotencyStore, PoolConfig};
use backend::test_support::MutableClock;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use futures::future::join_all;
use pg_embedded_setup_unpriv::TemporaryDatabase;
use rstest::{fixture, rstest};
use tokio::runtime::Runtime;

#[path = "support/pg_embed.rs"]
mod pg_embed;

mod support;

use pg_embed::shared_cluster;
use support::embedded_postgres::execute_sql;
use support::{handle_cluster_setup_failure, provision_template_database};

struct StoreContext {
    runtime: Runtime,
    store: Arc<DieselIdempotencyStore>,
    database_url: String,
    _database: TemporaryDatabase,
}

fn setup_context() -> Result<StoreContext, String> {
    let runtime = Runtime::new().map_err(|err| err.to_string())?;
    let cluster = shared_cluster()?;
    let database = provision_template_database(cluster)?;
    let database_url = database.url().to_owned();

    let config = PoolConfig::new(&database_url)
        .with_max_size(4)
        .with_min_idle(Some(1));
    let pool = runtime
        .block_on(DbPool::new(config))
        .map_err(|err| err.to_string())?;

    Ok(StoreContext {
        runtime,
        store: Arc::new(DieselIdempotencyStore::new(pool)),
        database_url,
        _database: database,
    })
}

#[fixture]
fn context() -> Option<StoreContext> {
    match setup_context() {
        Ok(ctx) => Some(ctx),
        Err(reason) => handle_cluster_setup_failure(reason),
    }
}

macro_rules! require_cluster {
    ($context:expr, $name:literal) => {
        match $context {
            Some(ctx) => ctx,
            None => {
                eprintln!(concat!("SKIP-TEST-CLUSTER: ", $name, " skipped"));
                return;
            }
        }
    };
}

/// Whole seconds survive PostgreSQL's microsecond timestamps unchanged.
fn instant(minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, second)
        .single()
        .expect("valid instant")
}

fn fingerprint(byte: u8) -> RequestFingerprint {
    RequestFingerprint::from_bytes([byte; 32])
}

fn pending(key: &str, requester: &RequesterId, claimed_at: DateTime<Utc>) -> NewPendingRecord {
    NewPendingRecord {
        id: RecordId::random(),
        key: IdempotencyKey::new(key).expect("valid key"),
        route: MutationRoute::UpdateProfile.template(),
        requester: requester.clone(),
        fingerprint: fingerprint(1),
        claimed_at,
    }
}

fn claim_for(record: &IdempotencyRecord) -> IdempotencyClaim {
    IdempotencyClaim {
        record_id: record.id,
        attempt: record.attempt,
        key: record.key.clone(),
        route: record.route.clone(),
        requester: record.requester.clone(),
    }
}

fn reclaim_request(record: &IdempotencyRecord, now: DateTime<Utc>) -> ReclaimRequest {
    ReclaimRequest {
        record_id: record.id,
        observed_attempt: record.attempt,
        fingerprint: fingerprint(2),
        claimed_at: now,
        stale_before: now - ChronoDuration::seconds(30),
    }
}

#[rstest]
fn first_insert_wins_and_duplicates_are_ignored(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "first_insert_wins_and_duplicates_are_ignored");
    let requester = RequesterId::user(&UserId::random());
    let first = pending("insert-key", &requester, instant(0, 0));
    let duplicate = pending("insert-key", &requester, instant(0, 5));

    ctx.runtime.block_on(async {
        let inserted = ctx
            .store
            .insert_pending(&first)
            .await
            .expect("insert succeeds")
            .expect("first sighting inserts");
        assert_eq!(inserted.id, first.id);
        assert_eq!(inserted.status, RecordStatus::Pending);
        assert_eq!(inserted.attempt, 1);
        assert_eq!(inserted.claimed_at, instant(0, 0));
        assert!(inserted.response.is_none());

        let ignored = ctx
            .store
            .insert_pending(&duplicate)
            .await
            .expect("insert succeeds");
        assert!(ignored.is_none());

        let found = ctx
            .store
            .find(&first.key, &first.route, &requester)
            .await
            .expect("find succeeds");
        assert_eq!(found, Some(inserted));
    });
}

#[rstest]
fn concurrent_inserts_admit_exactly_one_record(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "concurrent_inserts_admit_exactly_one_record");
    let requester = RequesterId::user(&UserId::random());
    let records: Vec<_> = (0..8)
        .map(|_| pending("burst-key", &requester, instant(0, 0)))
        .collect();

    let results = ctx.runtime.block_on(join_all(
        records.iter().map(|record| ctx.store.insert_pending(record)),
    ));
    let inserted = results
        .into_iter()
        .map(|result| result.expect("insert succeeds"))
        .filter(Option::is_some)
        .count();
    assert_eq!(inserted, 1);
}

#[rstest]
fn find_scopes_records_by_route_and_requester(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "find_scopes_records_by_route_and_requester");
    let owner = RequesterId::user(&UserId::random());
    let stranger = RequesterId::user(&UserId::random());
    let record = pending("scoped-key", &owner, instant(0, 0));

    ctx.runtime.block_on(async {
        ctx.store
            .insert_pending(&record)
            .await
            .expect("insert succeeds");

        let other_requester = ctx
            .store
            .find(&record.key, &record.route, &stranger)
            .await
            .expect("find succeeds");
        assert!(other_requester.is_none());

        let other_route = ctx
            .store
            .find(&record.key, &MutationRoute::ChangePassword.template(), &owner)
            .await
            .expect("find succeeds");
        assert!(other_route.is_none());
    });
}

#[rstest]
fn complete_stores_the_response_once(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "complete_stores_the_response_once");
    let requester = RequesterId::user(&UserId::random());
    let record = pending("complete-key", &requester, instant(0, 0));
    let response = StoredResponse::new(201, Some(br#"{"id":"abc"}"#.to_vec()));

    ctx.runtime.block_on(async {
        let inserted = ctx
            .store
            .insert_pending(&record)
            .await
            .expect("insert succeeds")
            .expect("inserted");
        let claim = claim_for(&inserted);

        assert!(
            ctx.store
                .complete(&claim, &response, instant(0, 2))
                .await
                .expect("complete succeeds")
        );
        assert!(
            !ctx.store
                .complete(&claim, &response, instant(0, 3))
                .await
                .expect("second complete runs")
        );
        assert!(
            !ctx.store
                .mark_failed(&claim)
                .await
                .expect("mark_failed runs")
        );

        let stored = ctx
            .store
            .find(&record.key, &record.route, &requester)
            .await
            .expect("find succeeds")
            .expect("record exists");
        assert_eq!(stored.status, RecordStatus::Completed);
        assert_eq!(stored.response, Some(response.clone()));
        assert_eq!(stored.completed_at, Some(instant(0, 2)));
    });
}

#[rstest]
fn bodiless_responses_round_trip(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "bodiless_responses_round_trip");
    let requester = RequesterId::user(&UserId::random());
    let record = pending("empty-body", &requester, instant(0, 0));

    ctx.runtime.block_on(async {
        let inserted = ctx
            .store
            .insert_pending(&record)
            .await
            .expect("insert succeeds")
            .expect("inserted");
        ctx.store
            .complete(&claim_for(&inserted), &StoredResponse::empty(204), instant(0, 1))
            .await
            .expect("complete succeeds");

        let stored = ctx
            .store
            .find(&record.key, &record.route, &requester)
            .await
            .expect("find succeeds")
            .expect("record exists");
        assert_eq!(stored.response, Some(StoredResponse::empty(204)));
    });
}

#[rstest]
fn out_of_range_status_is_rejected_by_the_table(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "out_of_range_status_is_rejected_by_the_table");
    let requester = RequesterId::user(&UserId::random());
    let record = pending("bad-status", &requester, instant(0, 0));

    ctx.runtime.block_on(async {
        let inserted = ctx
            .store
            .insert_pending(&record)
            .await
            .expect("insert succeeds")
            .expect("inserted");
        let err = ctx
            .store
            .complete(&claim_for(&inserted), &StoredResponse::empty(700), instant(0, 1))
            .await
            .expect_err("status outside 100..=599 violates the check");
        assert!(matches!(err, IdempotencyStoreError::Query { .. }));
    });
}

#[rstest]
fn failed_records_are_reclaimed_with_a_new_attempt(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "failed_records_are_reclaimed_with_a_new_attempt");
    let requester = RequesterId::user(&UserId::random());
    let record = pending("failed-key", &requester, instant(0, 0));

    ctx.runtime.block_on(async {
        let inserted = ctx
            .store
            .insert_pending(&record)
            .await
            .expect("insert succeeds")
            .expect("inserted");
        assert!(
            ctx.store
                .mark_failed(&claim_for(&inserted))
                .await
                .expect("mark_failed succeeds")
        );

        let failed = ctx
            .store
            .find(&record.key, &record.route, &requester)
            .await
            .expect("find succeeds")
            .expect("record exists");
        assert_eq!(failed.status, RecordStatus::Failed);

        let reclaimed = ctx
            .store
            .reclaim(&reclaim_request(&failed, instant(0, 10)))
            .await
            .expect("reclaim succeeds")
            .expect("failed record is reclaimable");
        assert_eq!(reclaimed.id, inserted.id);
        assert_eq!(reclaimed.attempt, 2);
        assert_eq!(reclaimed.status, RecordStatus::Pending);
        assert_eq!(reclaimed.fingerprint, fingerprint(2));
        assert_eq!(reclaimed.claimed_at, instant(0, 10));
        assert_eq!(reclaimed.created_at, instant(0, 0));
    });
}

#[rstest]
fn reclaim_respects_liveness_and_observed_attempt(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "reclaim_respects_liveness_and_observed_attempt");
    let requester = RequesterId::user(&UserId::random());
    let record = pending("stale-key", &requester, instant(0, 0));

    ctx.runtime.block_on(async {
        let inserted = ctx
            .store
            .insert_pending(&record)
            .await
            .expect("insert succeeds")
            .expect("inserted");

        let live = ctx
            .store
            .reclaim(&reclaim_request(&inserted, instant(0, 20)))
            .await
            .expect("reclaim runs");
        assert!(live.is_none(), "a live pending claim must not be taken over");

        let stale = reclaim_request(&inserted, instant(1, 0));
        let winner = ctx
            .store
            .reclaim(&stale)
            .await
            .expect("reclaim runs")
            .expect("stale claim is reclaimable");
        assert_eq!(winner.attempt, 2);

        let loser = ctx.store.reclaim(&stale).await.expect("reclaim runs");
        assert!(loser.is_none(), "the observed attempt has moved on");

        let superseded = claim_for(&inserted);
        assert!(
            !ctx.store
                .complete(&superseded, &StoredResponse::empty(200), instant(1, 1))
                .await
                .expect("complete runs")
        );
        assert!(
            !ctx.store
                .mark_failed(&superseded)
                .await
                .expect("mark_failed runs")
        );
    });
}

#[rstest]
fn rows_violating_invariants_surface_as_corrupt(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "rows_violating_invariants_surface_as_corrupt");
    let requester = RequesterId::user(&UserId::random());
    let record = pending("corrupt-key", &requester, instant(0, 0));

    let inserted = ctx.runtime.block_on(async {
        ctx.store
            .insert_pending(&record)
            .await
            .expect("insert succeeds")
            .expect("inserted")
    });
    execute_sql(
        &ctx.database_url,
        &format!(
            "UPDATE idempotency_records \
             SET requester_id = 'not valid', status = 'failed' WHERE id = '{}'",
            record.id
        ),
    )
    .expect("raw update succeeds");

    let err = ctx
        .runtime
        .block_on(ctx.store.reclaim(&reclaim_request(&inserted, instant(0, 5))))
        .expect_err("whitespace in the requester id is rejected");
    assert!(matches!(err, IdempotencyStoreError::Corrupt { .. }));
}

#[rstest]
fn service_replays_completed_requests_from_postgres(context: Option<StoreContext>) {
    let ctx = require_cluster!(context, "service_replays_completed_requests_from_postgres");
    let clock = Arc::new(MutableClock::new(instant(0, 0)));
    let service = IdempotencyService::with_noop_metrics(
        ctx.store.clone(),
        clock.clone(),
        IdempotencyConfig::default().with_staleness_window(Duration::from_secs(30)),
    );
    let request = ResolveRequest {
        key: Some(IdempotencyKey::new("service-key").expect("valid key")),
        route: MutationRoute::UpdateProfile.template(),
        requester: RequesterId::user(&UserId::random()),
        fingerprint: fingerprint(7),
    };
    let response = StoredResponse::new(200, Some(br#"{"displayName":"Ann"}"#.to_vec()));

    ctx.runtime.block_on(async {
        let ResolveOutcome::New(Some(claim)) =
            service.resolve(request.clone()).await.expect("resolve")
        else {
            panic!("first sighting should claim the key");
        };
        assert!(matches!(
            service.resolve(request.clone()).await.expect("resolve"),
            ResolveOutcome::InFlight { .. }
        ));

        service
            .persist(Some(&claim), &response)
            .await
            .expect("persist");
        clock.advance_seconds(3600);
        assert_eq!(
            service.resolve(request.clone()).await.expect("resolve"),
            ResolveOutcome::Replay(response.clone())
        );

        let mut altered = request;
        altered.fingerprint = fingerprint(8);
        assert_eq!(
            service.resolve(altered).await.expect("resolve"),
            ResolveOutcome::Conflict
        );
    });
}
