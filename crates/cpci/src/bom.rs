use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use cpci_config::Quote;
use cpci_config::pricing::QuantityTracks;

use crate::feeds;

#[derive(ValueEnum, Debug, Clone, Default)]
pub enum BomFormat {
    #[default]
    Table,
    Json,
}

impl std::fmt::Display for BomFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BomFormat::Table => write!(f, "table"),
            BomFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Args, Debug, Clone)]
#[command(about = "Generate Bill of Materials (BOM) for a configuration")]
pub struct BomArgs {
    /// Configuration document to process
    #[arg(value_name = "CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Product catalog feed
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub catalog: PathBuf,

    /// Registered article feed for part-number matching
    #[arg(short, long, value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub articles: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value_t = BomFormat::Table)]
    pub format: BomFormat,
}

pub fn execute(args: BomArgs) -> Result<()> {
    let catalog = feeds::load_catalog(&args.catalog)?;
    let articles = feeds::load_articles(args.articles.as_deref(), &catalog)?;
    let config = feeds::load_config(&args.config)?;

    let quote = Quote::build(&config, &catalog, &articles, QuantityTracks::default());

    let mut writer = io::stdout().lock();
    match args.format {
        BomFormat::Json => writeln!(writer, "{}", serde_json::to_string_pretty(&quote.lines)?)?,
        BomFormat::Table => quote.write_table(writer)?,
    };

    Ok(())
}
