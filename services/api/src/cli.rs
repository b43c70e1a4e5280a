use crate::demo::{run_demo, run_fee_quote, DemoArgs, FeeQuoteArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use homestay_registry::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Homestay Registry",
    about = "Run the homestay registration service and its fee tools from the command line",
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
    /// Registration fee tools
    Fee {
        #[command(subcommand)]
        command: FeeCommand,
    },
    /// Walk a demo application from draft to approval, printing each stage
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum FeeCommand {
    /// Quote the registration fee for a room tariff and location
    Quote(FeeQuoteArgs),
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
        Command::Fee {
            command: FeeCommand::Quote(args),
        } => run_fee_quote(args),
        Command::Demo(args) => run_demo(args),
    }
}
