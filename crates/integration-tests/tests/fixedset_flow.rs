//! FixedSet end-to-end: linear order, seek permissions, idempotent serves
//! and the coder-deterministic shuffle.

use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;

use corpora_core::application::create_job::{self, CreateJobRequest, UnitDraft};
use corpora_core::application::unit_server::{self, random_indices};
use corpora_core::application::{annotate, progress};
use corpora_core::domain::{AnnotationStatus, AnnotationValue, Rules, Ruleset, User};
use corpora_core::port::{SystemTimeProvider, TransactionalStore};
use corpora_infra_sqlite::{create_pool, run_migrations, SqliteEngineStore};

async fn setup() -> (SqlitePool, Arc<SqliteEngineStore>) {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqliteEngineStore::new(pool.clone()));
    (pool, store)
}

async fn add_user(store: &SqliteEngineStore, name: &str, is_admin: bool) -> User {
    let mut tx = store.begin().await.unwrap();
    let mut user = User {
        id: 0,
        name: name.to_string(),
        email: Some(format!("{name}@example.org")),
        is_admin,
        restricted_job: None,
        password: None,
    };
    user.id = tx.insert_user(&user).await.unwrap();
    tx.commit().await.unwrap();
    user
}

fn fixedset_rules(randomize: bool) -> Rules {
    Rules {
        ruleset: Ruleset::Fixedset { randomize },
        can_seek_backwards: true,
        can_seek_forwards: false,
        show_damage: false,
        heal_damage: false,
        max_damage: None,
    }
}

fn unit_draft(id: &str) -> UnitDraft {
    UnitDraft {
        id: id.to_string(),
        unit: json!({"text_fields": [{"name": "body", "value": format!("text of {id}")}]}),
        unit_type: None,
        position: None,
        conditionals: None,
        gold: None,
    }
}

fn answer(value: &str) -> Vec<AnnotationValue> {
    vec![AnnotationValue {
        variable: "Q".to_string(),
        field: None,
        offset: None,
        length: None,
        value: json!(value),
    }]
}

async fn make_job(store: &SqliteEngineStore, admin: &User, rules: Rules, n_units: usize) -> i64 {
    let units = (1..=n_units).map(|i| unit_draft(&format!("u{i}"))).collect();
    let request = CreateJobRequest {
        title: "fixedset job".to_string(),
        codebook: Some(json!({
            "type": "questions",
            "questions": [{"name": "Q", "codes": ["yes", "no"]}]
        })),
        units,
        rules,
        jobsets: None,
        authorization: None,
        debriefing: None,
    };
    create_job::create_job(store, &SystemTimeProvider, admin, request)
        .await
        .unwrap()
}

#[tokio::test]
async fn linear_walkthrough_serves_insertion_order() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;
    let coder = add_user(&store, "coder", false).await;
    let time = SystemTimeProvider;

    let job_id = make_job(&store, &admin, fixedset_rules(false), 3).await;

    for (i, expected) in ["u1", "u2", "u3"].iter().enumerate() {
        let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, None)
            .await
            .unwrap();
        let unit = served.unit.expect("unit should be served");
        assert_eq!(unit.external_id, *expected);
        assert_eq!(served.index, i as i64);
        assert_eq!(served.status, Some(AnnotationStatus::InProgress));

        annotate::submit_annotation(
            store.as_ref(),
            &time,
            job_id,
            unit.id,
            &coder,
            answer("yes"),
            AnnotationStatus::Done,
        )
        .await
        .unwrap();
    }

    let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, None)
        .await
        .unwrap();
    assert!(served.unit.is_none());
    assert_eq!(served.index, 3);

    let report = progress::get_progress(store.as_ref(), job_id, &coder)
        .await
        .unwrap();
    assert_eq!(report.n_total, 3);
    assert_eq!(report.n_coded, 3);
    assert!(report.last_modified.is_some());
    assert!(report.damage.is_none());
}

#[tokio::test]
async fn serving_twice_without_posting_is_idempotent() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;
    let coder = add_user(&store, "coder", false).await;
    let time = SystemTimeProvider;

    let job_id = make_job(&store, &admin, fixedset_rules(false), 3).await;

    let first = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, None)
        .await
        .unwrap();
    let second = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, None)
        .await
        .unwrap();

    assert_eq!(
        first.unit.as_ref().unwrap().id,
        second.unit.as_ref().unwrap().id
    );
    assert_eq!(first.index, second.index);
}

#[tokio::test]
async fn seeking_backwards_returns_the_started_unit() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;
    let coder = add_user(&store, "coder", false).await;
    let time = SystemTimeProvider;

    let job_id = make_job(&store, &admin, fixedset_rules(false), 3).await;

    for _ in 0..2 {
        let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, None)
            .await
            .unwrap();
        annotate::submit_annotation(
            store.as_ref(),
            &time,
            job_id,
            served.unit.unwrap().id,
            &coder,
            answer("yes"),
            AnnotationStatus::Done,
        )
        .await
        .unwrap();
    }

    let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, Some(0))
        .await
        .unwrap();
    let unit = served.unit.expect("backward seek should find the unit");
    assert_eq!(unit.external_id, "u1");
    assert_eq!(served.index, 0);
    // the prior answer comes back with the unit
    assert_eq!(served.annotation.unwrap(), answer("yes"));
    assert_eq!(served.status, Some(AnnotationStatus::Done));
}

#[tokio::test]
async fn seek_backwards_can_be_disabled() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;
    let coder = add_user(&store, "coder", false).await;
    let time = SystemTimeProvider;

    let mut rules = fixedset_rules(false);
    rules.can_seek_backwards = false;
    let job_id = make_job(&store, &admin, rules, 3).await;

    for _ in 0..2 {
        let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, None)
            .await
            .unwrap();
        annotate::submit_annotation(
            store.as_ref(),
            &time,
            job_id,
            served.unit.unwrap().id,
            &coder,
            answer("yes"),
            AnnotationStatus::Done,
        )
        .await
        .unwrap();
    }

    let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, Some(0))
        .await
        .unwrap();
    assert!(served.unit.is_none());
    assert_eq!(served.index, 0);
}

#[tokio::test]
async fn seeking_past_coded_units_falls_back_to_next() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;
    let coder = add_user(&store, "coder", false).await;
    let time = SystemTimeProvider;

    let job_id = make_job(&store, &admin, fixedset_rules(false), 3).await;

    // nothing coded yet, so seeking to 2 serves the next unit instead
    let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, Some(2))
        .await
        .unwrap();
    assert_eq!(served.unit.unwrap().external_id, "u1");
    assert_eq!(served.index, 0);
}

#[tokio::test]
async fn randomized_order_is_deterministic_per_coder_and_covers_all_units() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;
    let alice = add_user(&store, "alice", false).await;
    let bob = add_user(&store, "bob", false).await;
    let time = SystemTimeProvider;

    let n = 5usize;
    let job_id = make_job(&store, &admin, fixedset_rules(true), n).await;

    for coder in [&alice, &bob] {
        let expected: Vec<String> = random_indices(coder.id as u64, n)
            .into_iter()
            .map(|i| format!("u{}", i + 1))
            .collect();

        let mut served_order = Vec::new();
        loop {
            let served = unit_server::serve_unit(store.as_ref(), &time, job_id, coder, None)
                .await
                .unwrap();
            let Some(unit) = served.unit else { break };
            served_order.push(unit.external_id.clone());
            annotate::submit_annotation(
                store.as_ref(),
                &time,
                job_id,
                unit.id,
                coder,
                answer("yes"),
                AnnotationStatus::Done,
            )
            .await
            .unwrap();
        }

        // the served order is exactly the seeded permutation of the upload order
        assert_eq!(served_order, expected);

        let mut covered = served_order;
        covered.sort();
        assert_eq!(covered, vec!["u1", "u2", "u3", "u4", "u5"]);
    }
}
