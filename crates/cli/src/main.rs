use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod args;
mod checksfile;
mod client;
mod cmd;

use args::{Args, Command};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    match &args.command {
        Command::Start(start) => cmd::start::run(start).await,
        Command::Check(check) => cmd::check::run_global(args.server, &check.file).await,
        Command::LocalCheck(check) => cmd::check::run_local(args.server, &check.file).await,
        Command::ListMembers => cmd::check::list_members(args.server).await,
    }
}
