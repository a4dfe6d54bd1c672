//! `numng build`: run the whole pipeline for one package file.

use super::{CommandContext, user_path};
use crate::config::GlobalConfig;
use crate::engine::{Engine, EngineOptions, EngineReport};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Fetch new commits for every package and registry before building
    #[arg(short = 'u', long)]
    pull_updates: bool,

    /// Write `source`-able registrations to this file
    #[arg(short, long)]
    script_file: Option<String>,

    /// Write `overlay use`-able registrations to this file
    #[arg(short, long)]
    overlay_file: Option<String>,

    /// Link bin entries and modules into this directory
    #[arg(long)]
    nupm_home: Option<String>,

    /// Replace files that are in the way of links
    #[arg(long)]
    force: bool,

    /// Maximum concurrent fetches
    #[arg(short = 'j', long)]
    max_parallel: Option<usize>,
}

impl BuildCommand {
    pub async fn execute(self, context: &CommandContext) -> Result<()> {
        let options = self.options(context).await?;
        let report = Engine::new(options).run().await?;
        if !context.quiet {
            print_summary(&report);
        }
        report.into_result()?;
        Ok(())
    }

    async fn options(&self, context: &CommandContext) -> Result<EngineOptions> {
        let config = GlobalConfig::load_or_default(&context.paths.config_file()).await?;
        let mut options = EngineOptions::new(&context.package_file, &context.paths.store_dir, &config);

        options.home = match &self.nupm_home {
            Some(raw) => Some(user_path(raw)?),
            None if context.nu_config => Some(context.paths.nu_config_home()),
            None => None,
        };
        options.script_file = match &self.script_file {
            Some(raw) => Some(user_path(raw)?),
            None if context.nu_config => Some(context.paths.nu_config_script_file()),
            None => None,
        };
        options.overlay_file = self.overlay_file.as_deref().map(user_path).transpose()?;
        options.pull_updates = self.pull_updates;
        options.force = self.force;
        if let Some(max_parallel) = self.max_parallel {
            options.max_parallel = max_parallel.max(1);
        }
        options.show_progress = !context.quiet;
        Ok(options)
    }
}

fn print_summary(report: &EngineReport) {
    for (node, status) in report.graph.nodes().iter().zip(&report.statuses) {
        if !status.is_ready() {
            println!("  {} {}: {status}", "✗".red(), node.name);
        }
    }
    let ready = report.statuses.iter().filter(|s| s.is_ready()).count();
    let summary = format!("{ready}/{} packages ready", report.statuses.len());
    if report.is_success() {
        println!("{} {summary}", "✓".green());
    } else {
        println!("{} {summary}", "!".yellow());
    }
    if report.link_changes > 0 {
        println!("  {} link changes", report.link_changes);
    }
}
