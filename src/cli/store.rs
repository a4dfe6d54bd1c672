//! `numng store`: inspect and prune the content store.

use super::CommandContext;
use crate::store::ContentStore;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct StoreCommand {
    #[command(subcommand)]
    action: StoreAction,
}

#[derive(Subcommand, Debug)]
enum StoreAction {
    /// List store entries
    List,

    /// Remove entries that were not used recently
    Gc {
        /// Remove entries unused for this many days
        #[arg(long, default_value_t = 30)]
        max_age_days: u64,
    },

    /// Remove every entry and clone
    Clean,
}

impl StoreCommand {
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let store = ContentStore::new(&context.paths.store_dir);
        match self.action {
            StoreAction::List => {
                let entries = store.list().await?;
                if entries.is_empty() {
                    println!("Store at {} is empty", store.dir().display());
                }
                for (key, record) in entries {
                    println!(
                        "{}  {:<8} {}@{}  {}",
                        &key[..key.len().min(12)],
                        record.state.to_string(),
                        record.identity,
                        record.git_ref,
                        record.last_used.format("%Y-%m-%d").to_string().dimmed()
                    );
                }
            }
            StoreAction::Gc {
                max_age_days,
            } => {
                let max_age = Duration::from_secs(max_age_days.saturating_mul(24 * 60 * 60));
                let removed = store.gc(max_age).await?;
                if !context.quiet {
                    println!("{} Removed {} store entries", "✓".green(), removed.len());
                }
            }
            StoreAction::Clean => {
                store.clean().await?;
                if !context.quiet {
                    println!("{} Cleaned store at {}", "✓".green(), store.dir().display());
                }
            }
        }
        Ok(())
    }
}
