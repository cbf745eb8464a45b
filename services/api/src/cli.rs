use crate::demo::{run_demo, DemoArgs};
use crate::infra::{open_store, TRACING_SENDER};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dastaavej::config::{AppConfig, ConfigError};
use dastaavej::error::AppError;
use dastaavej::notify::TracingNotifier;
use dastaavej::telemetry;
use dastaavej::workflows::accounts::{AccountService, AccountSettings};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "Dastaavej",
    about = "Run and operate the Dastaavej identity-document application portal",
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
    /// Walk a passport application from registration to approval against in-memory collaborators
    Demo(DemoArgs),
    /// Verify an agency account by redeeming its verification token
    VerifyAgency(VerifyAgencyArgs),
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

#[derive(Args, Debug)]
pub(crate) struct VerifyAgencyArgs {
    /// Token from the verification request mailed to the administrator
    #[arg(long)]
    pub(crate) token: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::VerifyAgency(args) => verify_agency(args).await,
    }
}

async fn verify_agency(args: VerifyAgencyArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    // An in-memory database would never hold the account being verified.
    if config.portal.data_path.is_none() {
        return Err(ConfigError::MissingDataPath.into());
    }
    let store = open_store(&config.portal).await?;

    let service = AccountService::new(
        store,
        Arc::new(TracingNotifier::new(TRACING_SENDER)),
        AccountSettings::from(&config.portal),
    );
    let token = args.token.trim().to_string();
    let account = tokio::task::spawn_blocking(move || service.verify_agency(&token))
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))??;
    println!(
        "Verified agency account {} <{}>",
        account.username, account.email
    );
    Ok(())
}
