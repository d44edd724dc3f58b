use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "chronoception", version, about = "Chronoception reaction-timing game")]
struct Cli {
    /// Server URL (defaults to server.url from the config)
    #[arg(long, global = true)]
    url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the round server
    Serve {
        /// Address to bind (defaults to server.bind from the config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Drive the current round directly
    Round {
        #[command(subcommand)]
        action: commands::round::RoundAction,
    },
    /// Round statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Run the timeout watchdog and print every signal
    Watch,
    /// Play in the terminal: Enter clicks, "q" quits
    Play {
        /// Round length in minutes
        #[arg(long)]
        interval: Option<f64>,
        /// Success window in seconds before the end of the round
        #[arg(long)]
        window: Option<f64>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let url = cli.url.as_deref();
    let result = match cli.command {
        Commands::Serve { bind } => commands::serve::run(bind),
        Commands::Round { action } => commands::round::run(action, url),
        Commands::Stats { action } => commands::stats::run(action, url),
        Commands::Watch => commands::watch::run(url),
        Commands::Play { interval, window } => commands::play::run(interval, window, url),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
