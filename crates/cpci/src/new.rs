use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use cpci_config::{Configuration, SystemSide};

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum Side {
    #[default]
    Left,
    Right,
}

impl From<Side> for SystemSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => SystemSide::Left,
            Side::Right => SystemSide::Right,
        }
    }
}

#[derive(Args, Debug, Clone)]
#[command(about = "Create a new configuration document")]
pub struct NewArgs {
    /// Where to write the document
    #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    /// Number of backplane slots
    #[arg(long, default_value_t = 21)]
    pub slots: u32,

    /// End of the rack carrying the system slot
    #[arg(long, value_enum, default_value_t = Side::Left)]
    pub side: Side,
}

pub fn execute(args: NewArgs) -> Result<()> {
    let config = Configuration::new(args.slots, args.side.into());
    let doc = serde_json::to_string_pretty(&config)?;
    fs::write(&args.output, doc)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "{} created {} with {} slots (system slot {:?})",
        "ok:".green().bold(),
        args.output.display(),
        args.slots,
        args.side
    );
    Ok(())
}
