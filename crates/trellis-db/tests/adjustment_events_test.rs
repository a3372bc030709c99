//! Integration tests for the `adjustment_events` queries, in particular the
//! guarded `pending -> terminal` transition.

use trellis_db::models::{AdjustmentStatus, PlanStatus};
use trellis_db::queries::{adjustments, plans};
use trellis_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn pending_event_has_expected_defaults() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, "user-a", "idea", PlanStatus::Generating)
        .await
        .unwrap();
    let event = adjustments::insert_pending_event(&pool, plan.id, "the prompt", "thread-1")
        .await
        .expect("insert should succeed");

    assert_eq!(event.status, AdjustmentStatus::Pending);
    assert_eq!(event.prompt, "the prompt");
    assert_eq!(event.thread_id, "thread-1");
    assert!(event.summary.is_none());
    assert!(event.error.is_none());
    assert!(event.applied_at.is_none());
    assert!(event.latency_ms.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn mark_applied_sets_terminal_fields() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, "user-a", "idea", PlanStatus::Generating)
        .await
        .unwrap();
    let event = adjustments::insert_pending_event(&pool, plan.id, "p", "t")
        .await
        .unwrap();

    let rows = adjustments::mark_applied_pending(&pool, event.id, "3 outcomes", 1234)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let fetched = adjustments::get_event(&pool, event.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, AdjustmentStatus::Applied);
    assert_eq!(fetched.summary.as_deref(), Some("3 outcomes"));
    assert_eq!(fetched.latency_ms, Some(1234));
    assert!(fetched.applied_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn terminal_events_cannot_transition_again() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, "user-a", "idea", PlanStatus::Generating)
        .await
        .unwrap();
    let event = adjustments::insert_pending_event(&pool, plan.id, "p", "t")
        .await
        .unwrap();

    let rows = adjustments::mark_error_pending(&pool, event.id, "boom").await.unwrap();
    assert_eq!(rows, 1);

    // Neither transition matches a non-pending row.
    let rows = adjustments::mark_applied_pending(&pool, event.id, "late win", 1).await.unwrap();
    assert_eq!(rows, 0);
    let rows = adjustments::mark_error_pending(&pool, event.id, "double boom").await.unwrap();
    assert_eq!(rows, 0);

    let fetched = adjustments::get_event(&pool, event.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, AdjustmentStatus::Error);
    assert_eq!(fetched.error.as_deref(), Some("boom"));
    assert!(fetched.summary.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_events_is_newest_first_and_capped() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, "user-a", "idea", PlanStatus::Generating)
        .await
        .unwrap();
    for i in 0..4 {
        adjustments::insert_pending_event(&pool, plan.id, &format!("prompt {i}"), "t")
            .await
            .unwrap();
    }

    let events = adjustments::list_events_for_plan(&pool, plan.id, 3).await.unwrap();
    assert_eq!(events.len(), 3);
    assert!(events[0].created_at >= events[1].created_at);
    assert!(events[1].created_at >= events[2].created_at);

    pool.close().await;
    drop_test_db(&db_name).await;
}
