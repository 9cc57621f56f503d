mod cli;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli::check::{cmd_check, CheckArgs};
use cli::hash::{cmd_hash, HashArgs};
use cli::kernels::cmd_kernels;
use cli::lower::{cmd_lower, LowerArgs};
use cli::run::{cmd_run, RunArgs};
use cli::stream::{cmd_stream, StreamArgs};

#[derive(Parser)]
#[command(
    name = "dxtc",
    version,
    about = "Lower partitioned tensor functions to packed-call C kernels"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lower an IR document to C source
    Lower(LowerArgs),
    /// Match and validate every function without writing output
    Check(CheckArgs),
    /// Show the content hash of the emitted module (BLAKE3)
    Hash(HashArgs),
    /// List the registered kernels and status codes
    Kernels,
    /// Call an entry point of a lowered module in the Rust runtime
    Run(RunArgs),
    /// Feed values through a single rolling-mean series
    Stream(StreamArgs),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Lower(args) => cmd_lower(args),
        Command::Check(args) => cmd_check(args),
        Command::Hash(args) => cmd_hash(args),
        Command::Kernels => cmd_kernels(),
        Command::Run(args) => cmd_run(args),
        Command::Stream(args) => cmd_stream(args),
    }
}
