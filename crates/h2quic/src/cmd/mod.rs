use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay captured header-stream frames through a server and print the responses.
    Replay(ReplayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Replay(args) => replay::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Built-in handler used by `replay`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Respond {
    /// Default router: 404 for everything.
    #[default]
    NotFound,
    /// Send the request body back.
    Echo,
    /// Describe the request as JSON.
    Summary,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// File holding raw HTTP/2 frames as written by a client on the header stream.
    pub capture: PathBuf,
    /// Server config (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Handler answering the replayed requests.
    #[arg(long, value_enum, default_value = "not-found")]
    pub respond: Respond,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
