//! Implementation of the `trellis outcome|deliverable|action` subcommands.

use anyhow::{Context, Result};
use clap::Subcommand;
use sqlx::PgPool;
use uuid::Uuid;

use trellis_core::tree;
use trellis_db::models::NodeStatus;

#[derive(Subcommand)]
pub enum OutcomeCommands {
    /// Append an outcome to a plan
    Add {
        /// Plan ID to add the outcome to
        plan_id: String,
        /// Outcome title
        title: String,
        /// Outcome summary
        #[arg(long, default_value = "")]
        summary: String,
    },
    /// Edit an outcome's fields
    Edit {
        /// Outcome ID
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New summary
        #[arg(long)]
        summary: Option<String>,
    },
    /// Set an outcome's status (done cascades to all descendants)
    Status {
        /// Outcome ID
        id: String,
        /// New status: todo, doing, or done
        status: String,
    },
    /// Delete an outcome and its whole subtree
    Rm {
        /// Outcome ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum DeliverableCommands {
    /// Append a deliverable to an outcome
    Add {
        /// Outcome ID to add the deliverable to
        outcome_id: String,
        /// Deliverable title
        title: String,
        /// Acceptance sentence
        #[arg(long)]
        done_when: String,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Edit a deliverable's fields
    Edit {
        /// Deliverable ID
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New acceptance sentence
        #[arg(long)]
        done_when: Option<String>,
        /// New notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Set a deliverable's status (done cascades to its actions)
    Status {
        /// Deliverable ID
        id: String,
        /// New status: todo, doing, or done
        status: String,
    },
    /// Delete a deliverable and its actions
    Rm {
        /// Deliverable ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ActionCommands {
    /// Append an action to a deliverable
    Add {
        /// Deliverable ID to add the action to
        deliverable_id: String,
        /// Action title
        title: String,
    },
    /// Rename an action
    Edit {
        /// Action ID
        id: String,
        /// New title
        #[arg(long)]
        title: String,
    },
    /// Set an action's status
    Status {
        /// Action ID
        id: String,
        /// New status: todo, doing, or done
        status: String,
    },
    /// Delete an action
    Rm {
        /// Action ID
        id: String,
    },
}

fn parse_id(kind: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid {kind} ID: {raw}"))
}

fn parse_status(raw: &str) -> Result<NodeStatus> {
    raw.parse::<NodeStatus>()
        .map_err(|e| anyhow::anyhow!("{e} (expected todo, doing, or done)"))
}

pub async fn run_outcome_command(
    command: OutcomeCommands,
    pool: &PgPool,
    user: &str,
) -> Result<()> {
    match command {
        OutcomeCommands::Add {
            plan_id,
            title,
            summary,
        } => {
            let plan_id = parse_id("plan", &plan_id)?;
            let outcome = tree::add_outcome(pool, user, plan_id, &title, &summary).await?;
            println!("Outcome {} added at position {}.", outcome.id, outcome.ord);
        }
        OutcomeCommands::Edit { id, title, summary } => {
            let id = parse_id("outcome", &id)?;
            tree::update_outcome(pool, user, id, title.as_deref(), summary.as_deref()).await?;
            println!("Outcome {id} updated.");
        }
        OutcomeCommands::Status { id, status } => {
            let id = parse_id("outcome", &id)?;
            let status = parse_status(&status)?;
            tree::set_outcome_status(pool, user, id, status).await?;
            println!("Outcome {id} set to {status}.");
        }
        OutcomeCommands::Rm { id } => {
            let id = parse_id("outcome", &id)?;
            tree::delete_outcome(pool, user, id).await?;
            println!("Outcome {id} deleted.");
        }
    }
    Ok(())
}

pub async fn run_deliverable_command(
    command: DeliverableCommands,
    pool: &PgPool,
    user: &str,
) -> Result<()> {
    match command {
        DeliverableCommands::Add {
            outcome_id,
            title,
            done_when,
            notes,
        } => {
            let outcome_id = parse_id("outcome", &outcome_id)?;
            let deliverable = tree::add_deliverable(
                pool,
                user,
                outcome_id,
                &title,
                &done_when,
                notes.as_deref(),
            )
            .await?;
            println!(
                "Deliverable {} added at position {}.",
                deliverable.id, deliverable.ord
            );
        }
        DeliverableCommands::Edit {
            id,
            title,
            done_when,
            notes,
        } => {
            let id = parse_id("deliverable", &id)?;
            tree::update_deliverable(
                pool,
                user,
                id,
                title.as_deref(),
                done_when.as_deref(),
                notes.as_deref(),
            )
            .await?;
            println!("Deliverable {id} updated.");
        }
        DeliverableCommands::Status { id, status } => {
            let id = parse_id("deliverable", &id)?;
            let status = parse_status(&status)?;
            tree::set_deliverable_status(pool, user, id, status).await?;
            println!("Deliverable {id} set to {status}.");
        }
        DeliverableCommands::Rm { id } => {
            let id = parse_id("deliverable", &id)?;
            tree::delete_deliverable(pool, user, id).await?;
            println!("Deliverable {id} deleted.");
        }
    }
    Ok(())
}

pub async fn run_action_command(command: ActionCommands, pool: &PgPool, user: &str) -> Result<()> {
    match command {
        ActionCommands::Add {
            deliverable_id,
            title,
        } => {
            let deliverable_id = parse_id("deliverable", &deliverable_id)?;
            let action = tree::add_action(pool, user, deliverable_id, &title).await?;
            println!("Action {} added at position {}.", action.id, action.ord);
        }
        ActionCommands::Edit { id, title } => {
            let id = parse_id("action", &id)?;
            tree::update_action(pool, user, id, &title).await?;
            println!("Action {id} renamed.");
        }
        ActionCommands::Status { id, status } => {
            let id = parse_id("action", &id)?;
            let status = parse_status(&status)?;
            tree::set_action_status(pool, user, id, status).await?;
            println!("Action {id} set to {status}.");
        }
        ActionCommands::Rm { id } => {
            let id = parse_id("action", &id)?;
            tree::delete_action(pool, user, id).await?;
            println!("Action {id} deleted.");
        }
    }
    Ok(())
}
