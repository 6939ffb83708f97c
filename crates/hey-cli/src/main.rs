// hey-cli: CLI frontend for hey
// Argument parsing, terminal output, exit codes

mod cli;
mod output;
mod sink;

use clap::Parser;
use hey_core::api::OpenAiProvider;
use hey_core::execution::execute_command;
use hey_core::{Hey, LoadOptions};
use log::debug;
use std::io::{self, IsTerminal, Read};

use cli::Cli;
use output::OutputHandler;
use sink::CliResponseSink;

const LOG_ENV: &str = "HEY_LOG";

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, default_filter))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();
}

fn read_prompt_from_pipe() -> io::Result<String> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        debug!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run(cli: Cli) -> hey_core::Result<()> {
    let stdin_is_pipe = !io::stdin().is_terminal();
    let invocation = cli.to_invocation(stdin_is_pipe, read_prompt_from_pipe)?;

    let hey = Hey::load_with_options(LoadOptions {
        home: cli.home.clone(),
        config_path: cli.config.clone(),
    })?;
    debug!("using home {}", hey.home_dir().display());

    let output = OutputHandler::new(cli.verbose);
    let mut sink = CliResponseSink::new(io::stdout(), cli.verbose);
    let provider = OpenAiProvider::new();

    execute_command(
        &hey,
        &invocation,
        &provider,
        &output,
        &mut sink,
        interrupted(),
    )
    .await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}
