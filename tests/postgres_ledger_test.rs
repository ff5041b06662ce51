//! Conditional increment against a real Postgres.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use std::sync::Arc;

use chrono::NaiveDate;
use featuregate::{
    db::repository::Repository,
    gate::{
        store::{LedgerWrite, UsageLedger},
        types::{BillingPeriod, Limit},
    },
};
use sqlx::PgPool;

const KEY: &str = "rfq_limit_monthly";

fn june() -> BillingPeriod {
    BillingPeriod {
        start: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    }
}

fn july() -> BillingPeriod {
    BillingPeriod {
        start: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
    }
}

async fn stored(repo: &Repository, period: &BillingPeriod) -> Option<u64> {
    repo.period_usage("sub-1", period)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.key == KEY)
        .map(|c| c.count)
}

#[sqlx::test(migrations = "src/db/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn first_write_over_the_limit_creates_no_row(pool: PgPool) {
    let repo = Repository::new(Arc::new(pool));

    let write = repo
        .increment("sub-1", KEY, &june(), 5, Limit::Bounded(3))
        .await
        .unwrap();
    assert_eq!(write, LedgerWrite::Rejected { total: 0 });
    assert_eq!(stored(&repo, &june()).await, None);

    let write = repo
        .increment("sub-1", KEY, &june(), 3, Limit::Bounded(3))
        .await
        .unwrap();
    assert_eq!(write, LedgerWrite::Applied { total: 3 });
}

#[sqlx::test(migrations = "src/db/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn existing_row_is_guarded_by_the_limit(pool: PgPool) {
    let repo = Repository::new(Arc::new(pool));
    repo.increment("sub-1", KEY, &june(), 2, Limit::Bounded(3))
        .await
        .unwrap();

    let write = repo
        .increment("sub-1", KEY, &june(), 2, Limit::Bounded(3))
        .await
        .unwrap();
    assert_eq!(write, LedgerWrite::Rejected { total: 2 });
    assert_eq!(stored(&repo, &june()).await, Some(2));

    let write = repo
        .increment("sub-1", KEY, &june(), 1, Limit::Bounded(3))
        .await
        .unwrap();
    assert_eq!(write, LedgerWrite::Applied { total: 3 });
}

#[sqlx::test(migrations = "src/db/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn unlimited_always_applies(pool: PgPool) {
    let repo = Repository::new(Arc::new(pool));

    for expected in [1_000, 2_000] {
        let write = repo
            .increment("sub-1", KEY, &june(), 1_000, Limit::Unlimited)
            .await
            .unwrap();
        assert_eq!(write, LedgerWrite::Applied { total: expected });
    }
}

#[sqlx::test(migrations = "src/db/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn periods_are_counted_apart(pool: PgPool) {
    let repo = Repository::new(Arc::new(pool));
    repo.increment("sub-1", KEY, &june(), 3, Limit::Bounded(3))
        .await
        .unwrap();

    let write = repo
        .increment("sub-1", KEY, &july(), 1, Limit::Bounded(3))
        .await
        .unwrap();
    assert_eq!(write, LedgerWrite::Applied { total: 1 });
    assert_eq!(stored(&repo, &june()).await, Some(3));
}

#[sqlx::test(migrations = "src/db/migrations")]
#[ignore = "needs DATABASE_URL"]
async fn concurrent_increments_stop_at_the_limit(pool: PgPool) {
    let repo = Arc::new(Repository::new(Arc::new(pool)));

    let writes = futures::future::join_all((0..12).map(|_| {
        let repo = repo.clone();
        async move {
            repo.increment("sub-1", KEY, &june(), 1, Limit::Bounded(5))
                .await
                .unwrap()
        }
    }))
    .await;

    let applied = writes
        .iter()
        .filter(|w| matches!(w, LedgerWrite::Applied { .. }))
        .count();
    assert_eq!(applied, 5);
    assert_eq!(stored(&repo, &june()).await, Some(5));
}
