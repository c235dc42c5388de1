use crate::demo::{run_demo, run_sweep, DemoArgs, SweepArgs};
use crate::server;
use circulation::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "circulation",
    about = "Run and inspect the library circulation desk from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk through checkout, limits, returns, penalties and notifications
    Demo(DemoArgs),
    /// Classify loans into due-soon, overdue and recently-returned buckets
    Sweep(SweepArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Book catalog CSV export (defaults to the bundled sample catalog)
    #[arg(long)]
    pub(crate) books_csv: Option<PathBuf>,
    /// Student directory CSV export (defaults to the bundled sample students)
    #[arg(long)]
    pub(crate) students_csv: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Sweep(args) => run_sweep(args),
    }
}
