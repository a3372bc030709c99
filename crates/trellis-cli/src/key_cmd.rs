//! Implementation of the `trellis key` subcommands.

use anyhow::Result;
use clap::Subcommand;
use sqlx::PgPool;

use trellis_core::secret;

#[derive(Subcommand)]
pub enum KeyCommands {
    /// Issue a new integration key for the acting user
    Issue,
    /// Revoke an integration key by its public ID
    Revoke {
        /// Key ID (the first segment of the issued key)
        key_id: String,
    },
    /// Store the acting user's model API key
    SetModel {
        /// The API key value to store
        api_key: String,
    },
}

pub async fn run_key_command(command: KeyCommands, pool: &PgPool, user: &str) -> Result<()> {
    match command {
        KeyCommands::Issue => {
            let issued = secret::issue_key(pool, user).await?;
            println!("Integration key issued (key ID {}):", issued.key_id);
            println!();
            println!("  {}", issued.key);
            println!();
            println!("Store it now -- only a salted digest is kept server-side.");
        }
        KeyCommands::Revoke { key_id } => {
            if secret::revoke_key(pool, &key_id).await? {
                println!("Key {key_id} revoked.");
            } else {
                println!("Key {key_id} not found or already revoked.");
            }
        }
        KeyCommands::SetModel { api_key } => {
            secret::set_model_key(pool, user, &api_key).await?;
            println!("Model API key stored for user {user}.");
        }
    }
    Ok(())
}
