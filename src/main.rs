use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "snapcam")]
#[command(about = "Take photos and record short clips from your webcam")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    #[command(flatten)]
    capture: cli::CaptureArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive capture prompt (default)
    Interactive,

    /// List available cameras and microphones
    List,

    /// Take a photo
    Photo,

    /// Record a video clip
    Record {
        /// Recording duration in seconds (Ctrl-C stops early)
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },

    /// Print the effective configuration
    Config {
        /// Also write it to this file
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=snapcam=debug
    snapcam::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List) => cli::list_devices(),
        Some(Commands::Config { write }) => cli::show_config(&cli.capture, write),
        Some(Commands::Photo) => cli::take_photo(&cli.capture.resolve()?).await,
        Some(Commands::Record { duration }) => {
            cli::record_video(&cli.capture.resolve()?, duration).await
        }
        Some(Commands::Interactive) | None => cli::interactive(&cli.capture.resolve()?).await,
    }
}
