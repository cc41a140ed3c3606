use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use questshelf::cli::{Command, ImagesCommand};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = questshelf::cli::Cli::parse();
    questshelf::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Build(args) => {
            questshelf::build::run(args).await.context("build")?;
        }
        Command::Fetch(args) => {
            questshelf::fetch::run(args).await.context("fetch")?;
        }
        Command::Segment(args) => {
            questshelf::segment::run(args).context("segment")?;
        }
        Command::Images {
            command: ImagesCommand::Rewrite(args),
        } => {
            questshelf::images::run_rewrite(args).context("images rewrite")?;
        }
        Command::Images {
            command: ImagesCommand::Download(args),
        } => {
            questshelf::images::run_download(args)
                .await
                .context("images download")?;
        }
        Command::Site(args) => {
            questshelf::site::run(args).context("site")?;
        }
        Command::Stats(args) => {
            questshelf::stats::run(args).context("stats")?;
        }
    }

    Ok(())
}
