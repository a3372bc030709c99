mod config;
mod key_cmd;
mod node_cmds;
mod plan_cmds;
mod serve_cmd;

use clap::{Parser, Subcommand};

use trellis_db::pool;

use config::TrellisConfig;

#[derive(Parser)]
#[command(name = "trellis", about = "Idea-to-execution plan engine")]
struct Cli {
    /// Database URL (overrides TRELLIS_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Acting user ID (defaults to TRELLIS_USER env var, then "local")
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a trellis config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/trellis")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the trellis database (requires config file or env vars)
    DbInit,
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Outcome editing
    Outcome {
        #[command(subcommand)]
        command: node_cmds::OutcomeCommands,
    },
    /// Deliverable editing
    Deliverable {
        #[command(subcommand)]
        command: node_cmds::DeliverableCommands,
    },
    /// Action editing
    Action {
        #[command(subcommand)]
        command: node_cmds::ActionCommands,
    },
    /// Integration and model key management
    Key {
        #[command(subcommand)]
        command: key_cmd::KeyCommands,
    },
    /// Serve the read-only integration API
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 7315)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Generate a new plan from a free-text idea
    New {
        /// The idea to turn into a plan
        idea: String,
        /// Path to a JSON file of research snippets to ground the plan
        #[arg(long)]
        research: Option<String>,
    },
    /// List your plans, newest first
    List,
    /// Show a plan's full hierarchy
    Show {
        /// Plan ID to show
        plan_id: String,
    },
    /// Show the next actionable step for a plan
    Next {
        /// Plan ID to resolve
        plan_id: String,
    },
    /// Revise a plan via the model
    Adjust {
        /// Plan ID to adjust
        plan_id: String,
        /// What to change
        instruction: String,
    },
    /// Show a plan's adjustment history, newest first
    History {
        /// Plan ID to show history for
        plan_id: String,
        /// Maximum number of events
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Delete a plan and everything under it
    Delete {
        /// Plan ID to delete
        plan_id: String,
    },
}

/// Resolve the acting user ID: flag > `TRELLIS_USER` env > "local".
fn resolve_user(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var("TRELLIS_USER").ok())
        .unwrap_or_else(|| "local".to_string())
}

/// Execute the `trellis init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        model: config::ModelSection::default(),
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  model.command = {}", cfg.model.command);
    println!();
    println!("Next: run `trellis db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `trellis db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = TrellisConfig::resolve(cli_db_url)?;

    println!("Initializing trellis database...");

    // 1. Create the database if it does not exist.
    pool::ensure_database_exists(&resolved.db_config).await?;

    // 2. Connect to the target database.
    let db_pool = pool::create_pool(&resolved.db_config).await?;

    // 3. Run migrations.
    pool::run_migrations(&db_pool).await?;

    // 4. Print success with table counts.
    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    // 5. Clean shutdown.
    db_pool.close().await;

    println!("trellis db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let user = resolve_user(cli.user.clone());

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Plan { command } => {
            let resolved = TrellisConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool, &resolved.model, &user).await;
            db_pool.close().await;
            result?;
        }
        Commands::Outcome { command } => {
            let resolved = TrellisConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = node_cmds::run_outcome_command(command, &db_pool, &user).await;
            db_pool.close().await;
            result?;
        }
        Commands::Deliverable { command } => {
            let resolved = TrellisConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = node_cmds::run_deliverable_command(command, &db_pool, &user).await;
            db_pool.close().await;
            result?;
        }
        Commands::Action { command } => {
            let resolved = TrellisConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = node_cmds::run_action_command(command, &db_pool, &user).await;
            db_pool.close().await;
            result?;
        }
        Commands::Key { command } => {
            let resolved = TrellisConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = key_cmd::run_key_command(command, &db_pool, &user).await;
            db_pool.close().await;
            result?;
        }
        Commands::Serve { bind, port } => {
            let resolved = TrellisConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = serve_cmd::run_serve(db_pool.clone(), &bind, port).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_user_prefers_flag() {
        assert_eq!(resolve_user(Some("alice".to_string())), "alice");
    }

    #[test]
    fn resolve_user_defaults_to_local() {
        // TRELLIS_USER is not set in the test environment by default; the
        // flag path above covers the override.
        if std::env::var("TRELLIS_USER").is_err() {
            assert_eq!(resolve_user(None), "local");
        }
    }
}
