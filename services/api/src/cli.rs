use crate::server;
use crate::terminal::{print_schema, run_questionnaire, run_submit, QuestionnaireArgs, SubmitArgs};
use clap::{Args, Parser, Subcommand};
use credit_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Credit Risk Intake",
    about = "Collect credit-risk questionnaire answers and submit them for scoring",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP questionnaire service (default command)
    Serve(ServeArgs),
    /// Answer the questionnaire interactively in the terminal
    Questionnaire(QuestionnaireArgs),
    /// Submit a JSON file of answers in one step
    Submit(SubmitArgs),
    /// Print the questionnaire fields as JSON
    Schema,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Questionnaire(args) => run_questionnaire(args).await,
        Command::Submit(args) => run_submit(args).await,
        Command::Schema => print_schema(),
    }
}
