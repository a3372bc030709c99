//! The background generation/adjustment worker.
//!
//! User-facing entry points stay fast: `request_generation` inserts the
//! plan shell and enqueues a job; `request_adjustment` verifies ownership
//! and enqueues. A single worker task drains the queue, so mutations to
//! one plan's subtree are applied sequentially. Each job runs under a
//! timeout -- a model call that never returns fails the job instead of
//! holding the plan in `generating` forever -- and every failure is
//! recorded twice (audit event, plan error) before being re-raised to the
//! worker loop where it is logged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use trellis_db::models::{Plan, PlanStatus};
use trellis_db::queries::plans;

use crate::audit;
use crate::draft::{self, DraftError, MAX_IDEA_LEN, PlanDraft};
use crate::error::{EngineError, EngineResult};
use crate::generate::prompt;
use crate::model::ModelClient;
use crate::ownership;
use crate::replace::{self, ReplaceMode};
use crate::secret;
use crate::thread;

/// A unit of background work.
#[derive(Debug, Clone)]
pub enum Job {
    /// Populate a freshly created plan shell.
    Generate { plan_id: Uuid, user_id: String },
    /// Revise an existing plan per the user's instruction.
    Adjust {
        plan_id: Uuid,
        user_id: String,
        instruction: String,
    },
}

impl Job {
    pub fn plan_id(&self) -> Uuid {
        match self {
            Self::Generate { plan_id, .. } | Self::Adjust { plan_id, .. } => *plan_id,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Wall-time limit per job (model call + parse + apply).
    pub job_timeout: Duration,
    /// Bounded queue depth; enqueue fails fast when full.
    pub queue_depth: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(300),
            queue_depth: 64,
        }
    }
}

/// Sending half of the worker's job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Enqueue a job without blocking.
    pub fn enqueue(&self, job: Job) -> EngineResult<()> {
        use mpsc::error::TrySendError;
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(anyhow::anyhow!("generation queue is full").into())
            }
            Err(TrySendError::Closed(_)) => {
                Err(anyhow::anyhow!("generation worker is not running").into())
            }
        }
    }
}

/// Spawn the worker task. Returns the queue handle and the join handle.
///
/// The worker exits when `cancel` fires or every `JobQueue` clone has been
/// dropped and the queue is drained.
pub fn spawn_worker(
    pool: PgPool,
    client: Arc<dyn ModelClient>,
    config: WorkerConfig,
    cancel: CancellationToken,
) -> (JobQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Job>(config.queue_depth);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("generation worker cancelled");
                    break;
                }
                job = rx.recv() => {
                    let Some(job) = job else { break };
                    let plan_id = job.plan_id();
                    if let Err(err) = run_job(&pool, client.as_ref(), &config, job).await {
                        // Already recorded on the audit event and the plan;
                        // re-raised here so the failed unit stays visible.
                        tracing::error!(plan_id = %plan_id, error = %err, "background job failed");
                    }
                }
            }
        }
    });

    (JobQueue { tx }, handle)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Fast synchronous half of generation: validate the idea, insert the plan
/// shell in `generating`, enqueue the background unit, return the shell.
///
/// `research`, when present, is a JSON array of snippets from the research
/// collaborator, attached to the shell so the prompt can quote it.
/// The caller observes progress through the plan's lifecycle status.
pub async fn request_generation(
    pool: &PgPool,
    queue: &JobQueue,
    user_id: &str,
    idea: &str,
    research: Option<&serde_json::Value>,
) -> EngineResult<Plan> {
    if idea.trim().is_empty() {
        return Err(DraftError::EmptyField { field: "idea" }.into());
    }
    let len = idea.chars().count();
    if len > MAX_IDEA_LEN {
        return Err(DraftError::TooLong {
            field: "idea",
            max: MAX_IDEA_LEN,
            len,
        }
        .into());
    }

    let plan = plans::insert_plan_shell(pool, user_id, idea, PlanStatus::Generating).await?;
    if let Some(research) = research {
        plans::set_plan_research(pool, plan.id, research).await?;
    }
    queue.enqueue(Job::Generate {
        plan_id: plan.id,
        user_id: user_id.to_string(),
    })?;

    tracing::info!(plan_id = %plan.id, user_id, "generation requested");
    Ok(plan)
}

/// Fast synchronous half of adjustment: verify ownership and enqueue.
pub async fn request_adjustment(
    pool: &PgPool,
    queue: &JobQueue,
    user_id: &str,
    plan_id: Uuid,
    instruction: &str,
) -> EngineResult<()> {
    if instruction.trim().is_empty() {
        return Err(DraftError::EmptyField {
            field: "adjustment instruction",
        }
        .into());
    }
    let plan = ownership::verify_plan(pool, plan_id, user_id).await?;

    queue.enqueue(Job::Adjust {
        plan_id: plan.id,
        user_id: user_id.to_string(),
        instruction: instruction.to_string(),
    })?;

    tracing::info!(plan_id = %plan.id, user_id, "adjustment requested");
    Ok(())
}

// ---------------------------------------------------------------------------
// Job execution
// ---------------------------------------------------------------------------

async fn run_job(
    pool: &PgPool,
    client: &dyn ModelClient,
    config: &WorkerConfig,
    job: Job,
) -> EngineResult<()> {
    match job {
        Job::Generate { plan_id, user_id } => {
            execute(pool, client, config, plan_id, &user_id, None).await
        }
        Job::Adjust {
            plan_id,
            user_id,
            instruction,
        } => execute(pool, client, config, plan_id, &user_id, Some(instruction)).await,
    }
}

/// Run one generation/adjustment attempt end to end.
async fn execute(
    pool: &PgPool,
    client: &dyn ModelClient,
    config: &WorkerConfig,
    plan_id: Uuid,
    user_id: &str,
    instruction: Option<String>,
) -> EngineResult<()> {
    // Re-verify at point of mutation; the plan may have been deleted or
    // reassigned between enqueue and execution.
    let plan = ownership::verify_plan(pool, plan_id, user_id).await?;
    let api_key = secret::get_model_key(pool, user_id).await?;
    let conversation = thread::get_or_create(pool, plan.id, user_id, client).await?;

    let (prompt_text, mode) = match &instruction {
        None => (
            prompt::build_generation_prompt(&plan.idea, plan.research.as_ref()),
            ReplaceMode::Generation,
        ),
        Some(instr) => (
            prompt::build_adjustment_prompt(&plan.idea, instr),
            ReplaceMode::Adjustment,
        ),
    };

    // The pending event is written before the model is invoked.
    let event = audit::open(pool, plan.id, &prompt_text, &conversation.thread_handle).await?;
    let started = Instant::now();

    let result = generate_and_apply(
        pool,
        client,
        config,
        &plan,
        &conversation.thread_handle,
        &prompt_text,
        api_key.as_deref(),
        mode,
    )
    .await;

    match result {
        Ok(applied) => {
            let latency_ms = started.elapsed().as_millis() as i64;
            let (outcomes, deliverables, actions) = applied.counts();
            let summary =
                format!("{outcomes} outcomes, {deliverables} deliverables, {actions} actions");
            audit::mark_applied(pool, event.id, &summary, latency_ms).await?;
            tracing::info!(
                plan_id = %plan.id,
                latency_ms,
                %summary,
                "adjustment applied"
            );
            Ok(())
        }
        Err(err) => {
            let message = audit::cap_error(&err.to_string());
            if let Err(audit_err) = audit::mark_error(pool, event.id, &message).await {
                tracing::error!(event_id = %event.id, error = %audit_err, "failed to record audit error");
            }
            if let Err(plan_err) = plans::set_plan_error(pool, plan.id, &message).await {
                tracing::error!(plan_id = %plan.id, error = %plan_err, "failed to record plan error");
            }
            // The audit write never swallows the failure.
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn generate_and_apply(
    pool: &PgPool,
    client: &dyn ModelClient,
    config: &WorkerConfig,
    plan: &Plan,
    thread_handle: &str,
    prompt_text: &str,
    api_key: Option<&str>,
    mode: ReplaceMode,
) -> EngineResult<PlanDraft> {
    let attempt = async {
        let output = client
            .generate(thread_handle, prompt_text, api_key)
            .await
            .map_err(|e| EngineError::Upstream(format!("{e:#}")))?;

        let json = draft::extract_json_object(&output)?;
        let parsed = draft::parse_draft(json)?;
        replace::apply_draft(pool, plan.id, &parsed, mode).await?;
        Ok(parsed)
    };

    match tokio::time::timeout(config.job_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Upstream(format!(
            "model call exceeded {}s timeout",
            config.job_timeout.as_secs()
        ))),
    }
}
