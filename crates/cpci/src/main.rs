use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;

mod bom;
mod check;
mod feeds;
mod new;
mod quote;

#[derive(Parser)]
#[command(name = "cpci")]
#[command(about = "Configuration and quoting tool for modular chassis systems", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long = "debug", global = true, hide = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new configuration document
    New(new::NewArgs),

    /// Validate a configuration against catalog and rules
    #[command(alias = "c")]
    Check(check::CheckArgs),

    /// Generate Bill of Materials (BOM)
    Bom(bom::BomArgs),

    /// Price a configuration and emit the quote payload
    #[command(alias = "q")]
    Quote(quote::QuoteArgs),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e}", "Error:".red());
        for cause in e.chain().skip(1) {
            eprintln!("  {cause}");
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger with default level depending on --debug (overridden by RUST_LOG)
    let env = if cli.debug {
        Env::default().default_filter_or("debug")
    } else {
        Env::default().default_filter_or("error")
    };
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Commands::New(args) => new::execute(args),
        Commands::Check(args) => check::execute(args),
        Commands::Bom(args) => bom::execute(args),
        Commands::Quote(args) => quote::execute(args),
    }
}
