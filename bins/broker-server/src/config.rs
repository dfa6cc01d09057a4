use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "broker-server", about = "In-memory message broker host")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Host an engine with the topics declared in a config file.
    Serve(ServeArgs),
    /// Run an in-process produce/consume load and print a JSON report.
    Bench(BenchArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file.
    #[arg(long, default_value = "broker.toml", env = "BROKER_CONFIG")]
    pub config: String,

    /// Seconds between stats log lines (0 disables).
    #[arg(long, default_value_t = 30, env = "BROKER_STATS_INTERVAL")]
    pub stats_interval: u64,
}

#[derive(Args, Clone, Debug)]
pub struct BenchArgs {
    #[arg(long, default_value_t = 4)]
    pub partitions: u32,

    /// Concurrent producer tasks.
    #[arg(long, default_value_t = 4)]
    pub producers: usize,

    /// Records written by each producer.
    #[arg(long, default_value_t = 10_000)]
    pub records: u64,

    /// Independent consumer groups, each reading every record.
    #[arg(long, default_value_t = 2)]
    pub groups: usize,

    #[arg(long, default_value_t = 128)]
    pub value_size: usize,

    /// Use a per-producer key instead of round-robin placement.
    #[arg(long)]
    pub keyed: bool,
}
