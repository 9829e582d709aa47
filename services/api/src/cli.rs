use crate::demo::{run_demo, run_grade_report, DemoArgs, GradeArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use fieldwork::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Fieldwork",
    about = "Grade contractors and escalate urgent-job fees from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and escalation jobs (default command)
    Serve(ServeArgs),
    /// Classify contractors from a CSV evaluation export without persisting anything
    Grade(GradeArgs),
    /// Walk through grading and fee escalation on the in-memory store
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Do not start the background escalation jobs
    #[arg(long)]
    pub(crate) no_escalation: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Grade(args) => run_grade_report(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
