use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use cpci_config::{resources, rules};

use crate::feeds;

#[derive(Args, Debug, Clone)]
#[command(about = "Validate a configuration against catalog and rules")]
pub struct CheckArgs {
    /// Configuration document to check
    #[arg(value_name = "CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Product catalog feed
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub catalog: PathBuf,

    /// Rule feed
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub rules: Option<PathBuf>,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    let catalog = feeds::load_catalog(&args.catalog)?;
    let rule_set = feeds::load_rules(args.rules.as_deref())?;
    let config = feeds::load_config(&args.config)?;

    // Budget overruns are advisory; only rule violations fail the check.
    for warning in resources::advisories(&config, &catalog) {
        println!("{} {warning}", "warning:".yellow().bold());
    }

    let violations = rules::validate(&rule_set, &config, &catalog);
    if violations.is_empty() {
        println!(
            "{} configuration satisfies all {} rule(s)",
            "ok:".green().bold(),
            rule_set.len()
        );
        Ok(())
    } else {
        for violation in &violations {
            eprintln!("{} {violation}", "violation:".red().bold());
        }
        anyhow::bail!("{} rule violation(s)", violations.len())
    }
}
