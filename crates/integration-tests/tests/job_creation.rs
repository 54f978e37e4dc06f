//! Job creation: atomicity, validation and the pre/post fixed slots.

use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;

use corpora_core::application::create_job::{self, CreateJobRequest, JobSetDraft, UnitDraft};
use corpora_core::application::{annotate, unit_server};
use corpora_core::domain::{
    AnnotationStatus, AnnotationValue, Condition, Conditional, Operator, Rules, Ruleset, User,
};
use corpora_core::port::{SystemTimeProvider, TransactionalStore};
use corpora_core::AppError;
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

fn fixedset_rules() -> Rules {
    Rules {
        ruleset: Ruleset::Fixedset { randomize: false },
        can_seek_backwards: true,
        can_seek_forwards: false,
        show_damage: false,
        heal_damage: false,
        max_damage: None,
    }
}

fn draft(id: &str, unit_type: Option<&str>, position: Option<&str>) -> UnitDraft {
    UnitDraft {
        id: id.to_string(),
        unit: json!({"text": id}),
        unit_type: unit_type.map(str::to_string),
        position: position.map(str::to_string),
        conditionals: None,
        gold: None,
    }
}

fn codebook() -> serde_json::Value {
    json!({
        "type": "questions",
        "questions": [{"name": "Q", "codes": ["yes", "no"]}]
    })
}

fn base_request(units: Vec<UnitDraft>) -> CreateJobRequest {
    CreateJobRequest {
        title: "job".to_string(),
        codebook: Some(codebook()),
        units,
        rules: fixedset_rules(),
        jobsets: None,
        authorization: None,
        debriefing: None,
    }
}

#[tokio::test]
async fn impossible_conditionals_fail_creation_and_roll_back() {
    let (pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;

    let mut bad_unit = draft("u1", Some("train"), None);
    bad_unit.conditionals = Some(vec![Conditional {
        variable: "unknown_variable".to_string(),
        conditions: vec![Condition {
            value: json!("yes"),
            operator: Operator::Eq,
            field: None,
            offset: None,
            length: None,
            damage: None,
            submessage: None,
        }],
        on_success: None,
        on_fail: None,
        message: None,
        damage: None,
    }]);

    let err = create_job::create_job(
        store.as_ref(),
        &SystemTimeProvider,
        &admin,
        base_request(vec![bad_unit]),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("unknown_variable"));

    // nothing of the failed upload sticks
    let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM codingjobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    let units: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM units")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(jobs, 0);
    assert_eq!(units, 0);
}

#[tokio::test]
async fn invalid_unit_types_and_positions_are_rejected() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;

    let err = create_job::create_job(
        store.as_ref(),
        &SystemTimeProvider,
        &admin,
        base_request(vec![draft("u1", Some("bogus"), None)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Domain(_)));

    let err = create_job::create_job(
        store.as_ref(),
        &SystemTimeProvider,
        &admin,
        base_request(vec![draft("u1", None, Some("middle"))]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Domain(_)));
}

#[tokio::test]
async fn only_admins_can_create_jobs() {
    let (_pool, store) = setup().await;
    let coder = add_user(&store, "coder", false).await;

    let err = create_job::create_job(
        store.as_ref(),
        &SystemTimeProvider,
        &coder,
        base_request(vec![draft("u1", None, None)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AuthorizationDenied(_)));
}

#[tokio::test]
async fn jobset_names_must_be_unique_and_need_a_codebook() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;

    let jobset = |name: &str| JobSetDraft {
        name: name.to_string(),
        codebook: None,
        rules: None,
        ids: None,
        pre_ids: None,
        post_ids: None,
        debriefing: None,
    };

    let mut request = base_request(vec![draft("u1", None, None)]);
    request.jobsets = Some(vec![jobset("A"), jobset("A")]);
    let err = create_job::create_job(store.as_ref(), &SystemTimeProvider, &admin, request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut request = base_request(vec![draft("u1", None, None)]);
    request.codebook = None;
    request.jobsets = Some(vec![jobset("A")]);
    let err = create_job::create_job(store.as_ref(), &SystemTimeProvider, &admin, request)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn pre_and_post_units_are_pinned_to_the_edges() {
    let (pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;
    let coder = add_user(&store, "coder", false).await;
    let time = SystemTimeProvider;

    let request = base_request(vec![
        draft("intake", Some("survey"), Some("pre")),
        draft("u1", None, None),
        draft("u2", None, None),
        draft("debrief", Some("survey"), Some("post")),
    ]);
    let job_id = create_job::create_job(store.as_ref(), &time, &admin, request)
        .await
        .unwrap();

    // the membership rows carry the pinned ordinals
    let fixed: Vec<(String, Option<i64>)> = sqlx::query_as(
        r#"
        SELECT u.external_id, jsu.fixed_index
        FROM jobset_units jsu JOIN units u ON u.id = jsu.unit_id
        ORDER BY jsu.id
        "#,
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        fixed,
        vec![
            ("intake".to_string(), Some(0)),
            ("u1".to_string(), None),
            ("u2".to_string(), None),
            ("debrief".to_string(), Some(-1)),
        ]
    );

    // and the coder walks pre, middle, middle, post
    let mut order = Vec::new();
    loop {
        let served = unit_server::serve_unit(store.as_ref(), &time, job_id, &coder, None)
            .await
            .unwrap();
        let Some(unit) = served.unit else { break };
        order.push(unit.external_id.clone());
        annotate::submit_annotation(
            store.as_ref(),
            &time,
            job_id,
            unit.id,
            &coder,
            vec![AnnotationValue {
                variable: "Q".to_string(),
                field: None,
                offset: None,
                length: None,
                value: json!("yes"),
            }],
            AnnotationStatus::Done,
        )
        .await
        .unwrap();
    }
    assert_eq!(order, vec!["intake", "u1", "u2", "debrief"]);
}

#[tokio::test]
async fn screen_units_are_accepted() {
    let (_pool, store) = setup().await;
    let admin = add_user(&store, "admin", true).await;

    create_job::create_job(
        store.as_ref(),
        &SystemTimeProvider,
        &admin,
        base_request(vec![draft("u1", Some("screen"), None)]),
    )
    .await
    .unwrap();
}
