//! Implementation of the `trellis plan` subcommands.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use trellis_core::generate;
use trellis_core::{audit, resolve, tree};
use trellis_db::models::{AdjustmentStatus, PlanStatus};
use trellis_db::queries::plans;

use crate::PlanCommands;
use crate::config::ModelSection;

pub async fn run_plan_command(
    command: PlanCommands,
    pool: &PgPool,
    model: &ModelSection,
    user: &str,
) -> Result<()> {
    match command {
        PlanCommands::New { idea, research } => {
            cmd_new(pool, model, user, &idea, research.as_deref()).await
        }
        PlanCommands::List => cmd_list(pool, user).await,
        PlanCommands::Show { plan_id } => cmd_show(pool, user, &plan_id).await,
        PlanCommands::Next { plan_id } => cmd_next(pool, user, &plan_id).await,
        PlanCommands::Adjust {
            plan_id,
            instruction,
        } => cmd_adjust(pool, model, user, &plan_id, &instruction).await,
        PlanCommands::History { plan_id, limit } => cmd_history(pool, user, &plan_id, limit).await,
        PlanCommands::Delete { plan_id } => cmd_delete(pool, user, &plan_id).await,
    }
}

fn parse_plan_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid plan ID: {raw}"))
}

/// Run the worker inline until the queue is drained, then report the
/// plan's final state.
async fn drive_worker_and_report(
    pool: &PgPool,
    plan_id: Uuid,
    queue: generate::JobQueue,
    handle: tokio::task::JoinHandle<()>,
) -> Result<()> {
    // Dropping the queue closes the channel; the worker exits once the
    // enqueued job is processed.
    drop(queue);
    handle.await.context("generation worker panicked")?;

    let plan = plans::get_plan(pool, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;

    match plan.status {
        PlanStatus::Ready => {
            println!("Plan {} is ready: {}", plan.id, plan.title);
            if !plan.summary.is_empty() {
                println!("  {}", plan.summary);
            }
        }
        PlanStatus::Error => {
            println!(
                "Plan {} failed: {}",
                plan.id,
                plan.generation_error.as_deref().unwrap_or("unknown error")
            );
        }
        other => {
            println!("Plan {} is still {}", plan.id, other);
        }
    }

    Ok(())
}

async fn cmd_new(
    pool: &PgPool,
    model: &ModelSection,
    user: &str,
    idea: &str,
    research_path: Option<&str>,
) -> Result<()> {
    let research = match research_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read research file {path}"))?;
            let value: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("research file {path} is not valid JSON"))?;
            Some(value)
        }
        None => None,
    };

    let cancel = CancellationToken::new();
    let (queue, handle) = generate::spawn_worker(
        pool.clone(),
        model.client(),
        model.worker_config(),
        cancel.clone(),
    );

    let plan = generate::request_generation(pool, &queue, user, idea, research.as_ref()).await?;
    println!("Plan {} created, generating...", plan.id);

    drive_worker_and_report(pool, plan.id, queue, handle).await
}

async fn cmd_adjust(
    pool: &PgPool,
    model: &ModelSection,
    user: &str,
    plan_id: &str,
    instruction: &str,
) -> Result<()> {
    let id = parse_plan_id(plan_id)?;

    let cancel = CancellationToken::new();
    let (queue, handle) = generate::spawn_worker(
        pool.clone(),
        model.client(),
        model.worker_config(),
        cancel.clone(),
    );

    generate::request_adjustment(pool, &queue, user, id, instruction).await?;
    println!("Adjustment queued for plan {id}...");

    drive_worker_and_report(pool, id, queue, handle).await
}

async fn cmd_list(pool: &PgPool, user: &str) -> Result<()> {
    let plans = plans::list_recent_plans(pool, user, 50).await?;

    if plans.is_empty() {
        println!("No plans yet. Create one with `trellis plan new \"<idea>\"`.");
        return Ok(());
    }

    for plan in &plans {
        let title = if plan.title.is_empty() {
            plan.idea.as_str()
        } else {
            plan.title.as_str()
        };
        println!(
            "{}  [{}]  {}  (updated {})",
            plan.id,
            plan.status,
            title,
            plan.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

async fn cmd_show(pool: &PgPool, user: &str, plan_id: &str) -> Result<()> {
    let id = parse_plan_id(plan_id)?;
    let details = resolve::resolve_plan_details(pool, user, id).await?;

    println!("{} [{}]", details.plan.title, details.plan.status);
    println!("Idea: {}", details.plan.idea);
    if !details.plan.summary.is_empty() {
        println!("{}", details.plan.summary);
    }
    if let Some(err) = &details.plan.generation_error {
        println!("Last error: {err}");
    }
    println!();

    for outcome in &details.outcomes {
        println!(
            "[{}] {} {}",
            outcome.outcome.status, outcome.outcome.id, outcome.outcome.title
        );
        for deliverable in &outcome.deliverables {
            println!(
                "  [{}] {} {}",
                deliverable.deliverable.status,
                deliverable.deliverable.id,
                deliverable.deliverable.title
            );
            println!("        done when: {}", deliverable.deliverable.done_when);
            for action in &deliverable.actions {
                println!("    [{}] {} {}", action.status, action.id, action.title);
            }
        }
    }

    Ok(())
}

async fn cmd_next(pool: &PgPool, user: &str, plan_id: &str) -> Result<()> {
    let id = parse_plan_id(plan_id)?;
    let pending = resolve::resolve_pending_work(pool, user, id).await?;

    for line in &pending.summary_lines {
        println!("{line}");
    }

    Ok(())
}

async fn cmd_history(pool: &PgPool, user: &str, plan_id: &str, limit: i64) -> Result<()> {
    let id = parse_plan_id(plan_id)?;
    let events = audit::list_history(pool, user, id, limit).await?;

    if events.is_empty() {
        println!("No adjustment history for plan {id}.");
        return Ok(());
    }

    for event in &events {
        let detail = match event.status {
            AdjustmentStatus::Applied => format!(
                "{} ({} ms)",
                event.summary.as_deref().unwrap_or("applied"),
                event.latency_ms.unwrap_or(0)
            ),
            AdjustmentStatus::Error => event.error.clone().unwrap_or_default(),
            AdjustmentStatus::Pending => "in flight".to_string(),
        };
        println!(
            "{}  [{}]  {}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.status,
            detail
        );
    }

    Ok(())
}

async fn cmd_delete(pool: &PgPool, user: &str, plan_id: &str) -> Result<()> {
    let id = parse_plan_id(plan_id)?;
    tree::delete_plan(pool, user, id).await?;
    println!("Plan {id} deleted.");
    Ok(())
}
