use anyhow::Result;
use clap::{Parser, Subcommand};
use minuted::app;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minuted", about = "Meeting minutes processing daemon")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Print version information
    Version,
    /// Probe the AI service health endpoint
    Health,
    /// Run one meeting through the pipeline and wait for completion
    Process {
        meeting_id: String,
        /// Acting user (must be the meeting owner)
        #[arg(long)]
        user_id: String,
    },
    /// Print the persisted processing status of a meeting
    Status { meeting_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("minuted {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Health) => {
            if app::check_ai_health().await? {
                println!("AI service is healthy");
                Ok(())
            } else {
                anyhow::bail!("AI service is unavailable");
            }
        }
        Some(CliCommand::Process {
            meeting_id,
            user_id,
        }) => app::process_meeting_once(&meeting_id, &user_id).await,
        Some(CliCommand::Status { meeting_id }) => app::print_status(&meeting_id).await,
        None => app::run_service().await,
    }
}
