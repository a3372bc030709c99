//! End-to-end tests for the background generation worker, using a scripted
//! model client in place of the external service.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use trellis_core::generate::{self, Job, JobQueue, WorkerConfig};
use trellis_core::model::ModelClient;
use trellis_core::{audit, resolve};
use trellis_db::models::{AdjustmentStatus, PlanStatus};
use trellis_db::queries::{plans, threads};
use trellis_test_utils::{create_test_db, drop_test_db};

const USER: &str = "user-a";

/// Model client that replays a scripted sequence of outputs.
struct ScriptedModelClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
    threads_created: AtomicUsize,
}

impl ScriptedModelClient {
    fn new(responses: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            threads_created: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create_thread(&self) -> Result<String> {
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("scripted-thread-{n}"))
    }

    async fn generate(
        &self,
        _thread_handle: &str,
        _prompt: &str,
        _api_key: Option<&str>,
    ) -> Result<String> {
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted client ran out of responses");
        next.map_err(|msg| anyhow::anyhow!(msg))
    }
}

fn draft_json(idea: &str, outcome_title: &str) -> String {
    serde_json::json!({
        "idea": idea,
        "title": "Scripted plan",
        "summary": "Produced by the scripted client.",
        "outcomes": [{
            "title": outcome_title,
            "summary": "",
            "status": "todo",
            "deliverables": [{
                "title": "First deliverable",
                "done_when": "It is demonstrably done.",
                "status": "todo",
                "actions": [
                    {"title": "Step one", "status": "todo"},
                    {"title": "Step two", "status": "todo"}
                ]
            }]
        }]
    })
    .to_string()
}

fn spawn(pool: &sqlx::PgPool, client: Arc<dyn ModelClient>) -> (JobQueue, JoinHandle<()>) {
    generate::spawn_worker(
        pool.clone(),
        client,
        WorkerConfig::default(),
        CancellationToken::new(),
    )
}

/// Close the queue and wait for the worker to drain and exit.
async fn drain(queue: JobQueue, handle: JoinHandle<()>) {
    drop(queue);
    handle.await.expect("worker should not panic");
}

#[tokio::test]
async fn generation_happy_path_builds_ready_plan() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![Ok(format!(
        "Here you go:\n```json\n{}\n```",
        draft_json("learn welding", "Safety first")
    ))]);

    let (queue, handle) = spawn(&pool, client);
    let plan = generate::request_generation(&pool, &queue, USER, "learn welding", None)
        .await
        .expect("request should succeed");
    assert_eq!(plan.status, PlanStatus::Generating);
    drain(queue, handle).await;

    let details = resolve::resolve_plan_details(&pool, USER, plan.id).await.unwrap();
    assert_eq!(details.plan.status, PlanStatus::Ready);
    assert_eq!(details.plan.title, "Scripted plan");
    assert_eq!(details.outcomes.len(), 1);
    assert_eq!(details.outcomes[0].outcome.title, "Safety first");
    assert_eq!(details.outcomes[0].deliverables[0].actions.len(), 2);

    // The audit trail shows one applied event with latency and summary.
    let history = audit::list_history(&pool, USER, plan.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AdjustmentStatus::Applied);
    assert_eq!(
        history[0].summary.as_deref(),
        Some("1 outcomes, 1 deliverables, 2 actions")
    );
    assert!(history[0].latency_ms.is_some());

    // Thread affinity was persisted before first use.
    let thread = threads::get_thread(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(thread.thread_handle, "scripted-thread-0");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn upstream_failure_is_recorded_and_plan_errors() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![Err("model unavailable".to_string())]);

    let (queue, handle) = spawn(&pool, client);
    let plan = generate::request_generation(&pool, &queue, USER, "learn welding", None)
        .await
        .unwrap();
    drain(queue, handle).await;

    let plan = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Error);
    let message = plan.generation_error.expect("error should be recorded");
    assert!(message.contains("model unavailable"), "got {message}");

    let history = audit::list_history(&pool, USER, plan.id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AdjustmentStatus::Error);
    assert!(
        history[0].error.as_deref().unwrap_or("").contains("model unavailable"),
        "audit should carry the upstream message"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unparseable_output_is_a_recorded_failure() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![Ok("I would rather chat than plan.".to_string())]);

    let (queue, handle) = spawn(&pool, client);
    let plan = generate::request_generation(&pool, &queue, USER, "learn welding", None)
        .await
        .unwrap();
    drain(queue, handle).await;

    let plan = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Error);

    let history = audit::list_history(&pool, USER, plan.id, 10).await.unwrap();
    assert_eq!(history[0].status, AdjustmentStatus::Error);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn generation_prompt_quotes_attached_research() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![Ok(draft_json("learn welding", "Safety first"))]);

    let research = serde_json::json!([{"source": "weld.example", "text": "TIG beats MIG for thin stock"}]);
    let (queue, handle) = spawn(&pool, client);
    let plan =
        generate::request_generation(&pool, &queue, USER, "learn welding", Some(&research))
            .await
            .unwrap();
    drain(queue, handle).await;

    // The recorded prompt (audit event) carries the snippet text.
    let history = audit::list_history(&pool, USER, plan.id, 10).await.unwrap();
    assert!(
        history[0].prompt.contains("TIG beats MIG"),
        "prompt should quote the research snippets"
    );

    let plan = plans::get_plan(&pool, plan.id).await.unwrap().unwrap();
    assert!(plan.research.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn adjustment_reuses_the_plan_thread() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![
        Ok(draft_json("learn welding", "Safety first")),
        Ok(draft_json("learn welding", "Safety and joints")),
    ]);

    let (queue, handle) = spawn(&pool, client.clone());
    let plan = generate::request_generation(&pool, &queue, USER, "learn welding", None)
        .await
        .unwrap();
    drain(queue, handle).await;

    let (queue, handle) = spawn(&pool, client.clone());
    generate::request_adjustment(&pool, &queue, USER, plan.id, "rename the outcome")
        .await
        .unwrap();
    drain(queue, handle).await;

    let details = resolve::resolve_plan_details(&pool, USER, plan.id).await.unwrap();
    assert_eq!(details.outcomes[0].outcome.title, "Safety and joints");

    // One thread for the plan's whole lifetime, both events addressed to it.
    assert_eq!(client.threads_created.load(Ordering::SeqCst), 1);
    let history = audit::list_history(&pool, USER, plan.id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].thread_id, history[1].thread_id);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn adjustment_against_drifted_idea_fails_closed() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![
        Ok(draft_json("learn welding", "Safety first")),
        // The model echoes a different idea back on adjustment.
        Ok(draft_json("learn plumbing", "Pipes")),
    ]);

    let (queue, handle) = spawn(&pool, client.clone());
    let plan = generate::request_generation(&pool, &queue, USER, "learn welding", None)
        .await
        .unwrap();
    drain(queue, handle).await;

    let (queue, handle) = spawn(&pool, client);
    generate::request_adjustment(&pool, &queue, USER, plan.id, "change everything")
        .await
        .unwrap();
    drain(queue, handle).await;

    // The subtree from generation survives; the failure is on record.
    let details = resolve::resolve_plan_details(&pool, USER, plan.id).await.unwrap();
    assert_eq!(details.plan.status, PlanStatus::Error);
    assert_eq!(details.outcomes[0].outcome.title, "Safety first");

    let history = audit::list_history(&pool, USER, plan.id, 10).await.unwrap();
    assert_eq!(history[0].status, AdjustmentStatus::Error);
    assert!(
        history[0]
            .error
            .as_deref()
            .unwrap_or("")
            .contains("does not match"),
        "audit error should name the consistency failure"
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn empty_idea_is_rejected_synchronously() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![]);
    let (queue, handle) = spawn(&pool, client);

    let err = generate::request_generation(&pool, &queue, USER, "   ", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must not be empty"), "got {err}");
    drain(queue, handle).await;

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn adjustment_of_foreign_plan_is_denied_synchronously() {
    let (pool, db_name) = create_test_db().await;

    let foreign = plans::insert_plan_shell(&pool, "user-b", "their idea", PlanStatus::Ready)
        .await
        .unwrap();

    let client = ScriptedModelClient::new(vec![]);
    let (queue, handle) = spawn(&pool, client);

    let err = generate::request_adjustment(&pool, &queue, USER, foreign.id, "steal it")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("access denied"), "got {err}");
    drain(queue, handle).await;

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn enqueue_after_shutdown_fails_fast() {
    let (pool, db_name) = create_test_db().await;

    let client = ScriptedModelClient::new(vec![]);
    let cancel = CancellationToken::new();
    let (queue, handle) = generate::spawn_worker(
        pool.clone(),
        client,
        WorkerConfig::default(),
        cancel.clone(),
    );

    cancel.cancel();
    handle.await.unwrap();

    let err = queue
        .enqueue(Job::Generate {
            plan_id: uuid::Uuid::new_v4(),
            user_id: USER.to_string(),
        })
        .unwrap_err();
    assert!(err.to_string().contains("not running"), "got {err}");

    pool.close().await;
    drop_test_db(&db_name).await;
}
