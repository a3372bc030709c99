//! Integration tests for the full-tree replace.

use trellis_core::draft::{ActionDraft, DeliverableDraft, OutcomeDraft, PlanDraft};
use trellis_core::error::EngineError;
use trellis_core::replace::{self, ReplaceMode};
use trellis_core::resolve;
use trellis_db::models::{NodeStatus, PlanStatus};
use trellis_db::queries::plans;
use trellis_test_utils::{create_test_db, drop_test_db};

const USER: &str = "user-a";

fn sample_draft(idea: &str) -> PlanDraft {
    PlanDraft {
        idea: idea.to_string(),
        title: "Bakery launch".to_string(),
        summary: "Everything needed to open the doors.".to_string(),
        outcomes: vec![
            OutcomeDraft {
                title: "Premises secured".to_string(),
                summary: "A signed lease on a fitted space.".to_string(),
                status: NodeStatus::Todo,
                deliverables: vec![DeliverableDraft {
                    title: "Shortlist of locations".to_string(),
                    done_when: "Three viable sites visited and compared.".to_string(),
                    notes: Some("Favor foot traffic over floor space.".to_string()),
                    status: NodeStatus::Todo,
                    actions: vec![
                        ActionDraft {
                            title: "Walk the high street".to_string(),
                            status: NodeStatus::Todo,
                        },
                        ActionDraft {
                            title: "Call two agents".to_string(),
                            status: NodeStatus::Todo,
                        },
                    ],
                }],
            },
            OutcomeDraft {
                title: "Recipes finalized".to_string(),
                summary: String::new(),
                status: NodeStatus::Doing,
                deliverables: vec![DeliverableDraft {
                    title: "Core menu".to_string(),
                    done_when: "Six breads bake consistently.".to_string(),
                    notes: None,
                    status: NodeStatus::Doing,
                    actions: vec![],
                }],
            },
        ],
    }
}

/// Structural shape: titles, orders, statuses per level, ignoring IDs.
async fn shape(pool: &sqlx::PgPool, plan_id: uuid::Uuid) -> Vec<(String, i32, String, Vec<(String, i32, Vec<(String, i32)>)>)> {
    let details = resolve::resolve_plan_details(pool, USER, plan_id).await.unwrap();
    details
        .outcomes
        .iter()
        .map(|o| {
            (
                o.outcome.title.clone(),
                o.outcome.ord,
                o.outcome.status.to_string(),
                o.deliverables
                    .iter()
                    .map(|d| {
                        (
                            d.deliverable.title.clone(),
                            d.deliverable.ord,
                            d.actions
                                .iter()
                                .map(|a| (a.title.clone(), a.ord))
                                .collect(),
                        )
                    })
                    .collect(),
            )
        })
        .collect()
}

#[tokio::test]
async fn replace_builds_subtree_in_draft_order() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, USER, "open a bakery", PlanStatus::Generating)
        .await
        .unwrap();

    replace::apply_draft(&pool, plan.id, &sample_draft("open a bakery"), ReplaceMode::Generation)
        .await
        .expect("apply should succeed");

    let details = resolve::resolve_plan_details(&pool, USER, plan.id).await.unwrap();
    assert_eq!(details.plan.status, PlanStatus::Ready);
    assert_eq!(details.plan.title, "Bakery launch");
    assert_eq!(details.outcomes.len(), 2);
    assert_eq!(details.outcomes[0].outcome.ord, 0);
    assert_eq!(details.outcomes[1].outcome.ord, 1);
    assert_eq!(details.outcomes[1].outcome.status, NodeStatus::Doing);
    let actions = &details.outcomes[0].deliverables[0].actions;
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].title, "Walk the high street");
    assert_eq!(actions[0].ord, 0);
    assert_eq!(actions[1].ord, 1);

    // One shared timestamp across the whole insert.
    let first = &details.outcomes[0].outcome;
    let last_action = &details.outcomes[0].deliverables[0].actions[1];
    assert_eq!(first.created_at, last_action.created_at);
    assert_eq!(details.plan.updated_at, first.created_at);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reapplying_the_same_draft_is_structurally_idempotent() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, USER, "open a bakery", PlanStatus::Generating)
        .await
        .unwrap();
    let draft = sample_draft("open a bakery");

    replace::apply_draft(&pool, plan.id, &draft, ReplaceMode::Generation).await.unwrap();
    let first_shape = shape(&pool, plan.id).await;

    replace::apply_draft(&pool, plan.id, &draft, ReplaceMode::Adjustment).await.unwrap();
    let second_shape = shape(&pool, plan.id).await;

    // New identifiers are fine; the structure is not allowed to drift.
    assert_eq!(first_shape, second_shape);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn adjustment_with_mismatched_idea_is_rejected_untouched() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, USER, "open a bakery", PlanStatus::Generating)
        .await
        .unwrap();
    replace::apply_draft(&pool, plan.id, &sample_draft("open a bakery"), ReplaceMode::Generation)
        .await
        .unwrap();
    let before = shape(&pool, plan.id).await;

    let stale = sample_draft("open a coffee shop");
    let err = replace::apply_draft(&pool, plan.id, &stale, ReplaceMode::Adjustment)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IdeaMismatch), "got {err}");

    // The subtree is exactly as it was.
    assert_eq!(shape(&pool, plan.id).await, before);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn generation_mode_skips_idea_guard() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, USER, "open a bakery", PlanStatus::Generating)
        .await
        .unwrap();

    // Initial generation tolerates a drifted echo; only adjustments are
    // consistency-checked.
    replace::apply_draft(&pool, plan.id, &sample_draft("rephrased idea"), ReplaceMode::Generation)
        .await
        .expect("generation should not check the idea");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn invalid_draft_is_rejected_before_any_write() {
    let (pool, db_name) = create_test_db().await;

    let plan = plans::insert_plan_shell(&pool, USER, "open a bakery", PlanStatus::Generating)
        .await
        .unwrap();
    replace::apply_draft(&pool, plan.id, &sample_draft("open a bakery"), ReplaceMode::Generation)
        .await
        .unwrap();
    let before = shape(&pool, plan.id).await;

    // A draft that claims to be pre-validated but is not.
    let mut bad = sample_draft("open a bakery");
    bad.outcomes[0].deliverables.clear();

    let err = replace::apply_draft(&pool, plan.id, &bad, ReplaceMode::Adjustment)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "got {err}");
    assert_eq!(shape(&pool, plan.id).await, before);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn replace_on_missing_plan_is_not_found() {
    let (pool, db_name) = create_test_db().await;

    let missing = uuid::Uuid::new_v4();
    let err = replace::apply_draft(&pool, missing, &sample_draft("idea"), ReplaceMode::Generation)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PlanNotFound(id) if id == missing), "got {err}");

    pool.close().await;
    drop_test_db(&db_name).await;
}
