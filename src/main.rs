//! Galley CLI — run data-transformation recipes.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "galley",
    version,
    about = "Recipe execution engine — typed dishes, operation registry, flow-controlled bakes"
)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: galley::cli::Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    galley::cli::logging::init(&cli.log_level);
    if let Err(e) = galley::cli::dispatch(cli.command).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
