//! Demo CLI for the invocation engine: drives a toy in-process cluster
//! through a handful of counter invocations and prints what happened.

use clap::Parser;

/// Runs a toy cellmesh cluster and invokes a handful of counter
/// operations against it.
#[derive(Parser)]
#[command(name = "cellmesh-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// How many counter invocations to dispatch.
    #[arg(short, long, default_value_t = 6)]
    rounds: usize,

    /// How many backup acknowledgements each invocation should wait for
    /// before its future completes.
    #[arg(short, long, default_value_t = 1)]
    backups: u32,

    /// How many times each invocation's first attempts should fail with
    /// a simulated transient fault before succeeding.
    #[arg(short, long, default_value_t = 0)]
    fail_times: u32,
}

fn main() {
    let cli = Cli::parse();
    cellmesh::demo::run(cli.rounds, cli.backups, cli.fail_times);
}
