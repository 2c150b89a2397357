use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use cpci_config::pricing::QuantityTracks;
use cpci_config::{Quote, rules};

use crate::feeds;

#[derive(Args, Debug, Clone)]
#[command(about = "Price a configuration and emit the quote payload")]
pub struct QuoteArgs {
    /// Configuration document to quote
    #[arg(value_name = "CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Product catalog feed
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub catalog: PathBuf,

    /// Rule feed; a violating configuration is refused
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub rules: Option<PathBuf>,

    /// Registered article feed for part-number matching
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub articles: Option<PathBuf>,

    /// Prototype quantity
    #[arg(long, default_value_t = 1)]
    pub prototype: u32,

    /// Series quantity
    #[arg(long, default_value_t = 0)]
    pub series: u32,

    /// Write the payload here instead of stdout
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

pub fn execute(args: QuoteArgs) -> Result<()> {
    let catalog = feeds::load_catalog(&args.catalog)?;
    let rule_set = feeds::load_rules(args.rules.as_deref())?;
    let articles = feeds::load_articles(args.articles.as_deref(), &catalog)?;
    let config = feeds::load_config(&args.config)?;

    let violations = rules::validate(&rule_set, &config, &catalog);
    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("{} {violation}", "violation:".red().bold());
        }
        anyhow::bail!("refusing to quote a configuration with rule violations");
    }

    let quote = Quote::build(
        &config,
        &catalog,
        &articles,
        QuantityTracks::new(args.prototype, args.series),
    );
    let payload = serde_json::to_string_pretty(&quote)?;

    match &args.output {
        Some(path) => {
            fs::write(path, payload)?;
            println!(
                "{} wrote quote for {} line(s) to {} (total {})",
                "ok:".green().bold(),
                quote.lines.len(),
                path.display(),
                quote.grand_total
            );
        }
        None => println!("{payload}"),
    }
    Ok(())
}
