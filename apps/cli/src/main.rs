mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "webloom")]
#[command(about = "An incremental static site generator", long_about = None)]
struct Cli {
    /// Site root containing webloom.toml
    #[arg(long, short, global = true, default_value = ".")]
    root: PathBuf,

    /// Log every build decision
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate pages and files whose sources changed
    Build,
    /// Regenerate everything
    Rebuild,
    /// Build, then rebuild on every change while serving the output
    Autobuild {
        #[arg(long, default_value = "4331")]
        port: u16,

        #[arg(long)]
        open: bool,
    },
    /// Create a new page from a template
    Create {
        page: PathBuf,

        #[arg(long, short)]
        template: Option<String>,
    },
}

fn init_logging(trace: bool) {
    let default_level = if trace { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.trace);

    let result = match cli.command {
        Commands::Build => commands::build_site(&cli.root, false),
        Commands::Rebuild => commands::build_site(&cli.root, true),
        Commands::Autobuild { port, open } => commands::autobuild(&cli.root, port, open).await,
        Commands::Create { page, template } => {
            commands::create_page(&cli.root, &page, template.as_deref())
        }
    };

    if let Err(error) = result {
        tracing::error!("{error}");
        std::process::exit(1);
    }
}
