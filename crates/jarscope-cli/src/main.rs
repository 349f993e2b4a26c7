//! jarscope CLI binary.
//!
//! This is the entry point for the `jarscope` command-line tool. It
//! initializes logging via `tracing`, parses arguments with `clap`, and
//! dispatches to the appropriate stage handler. The process exits with the
//! highest-severity code the stage observed: 0 ok, 1 partial/I-O, 2 config,
//! 3 transport, 4 decompile failures.

mod cli;
mod commands;

use jarscope_util::errors::JarscopeError;

#[tokio::main]
async fn main() {
    let args = cli::parse();

    // RUST_LOG wins when set; otherwise --verbose raises the default level.
    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match commands::dispatch(args).await {
        Ok(code) => std::process::exit(code),
        Err(report) => {
            eprintln!("{report:?}");
            std::process::exit(exit_code_for(&report));
        }
    }
}

fn exit_code_for(report: &miette::Report) -> i32 {
    match report.downcast_ref::<JarscopeError>() {
        Some(JarscopeError::Config { .. }) => 2,
        Some(JarscopeError::Transport { .. }) => 3,
        Some(JarscopeError::Decompile { .. }) => 4,
        _ => 1,
    }
}
