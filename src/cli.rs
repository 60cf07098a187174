// Command-line interface for `ledger-node`

use clap::{Args, Parser, Subcommand, ValueEnum};
use lamport_ledger::ledger::Operation;
use lamport_ledger::logging::LogFormat;
use std::path::PathBuf;

/// One participant in a Lamport-mutex transfer ledger
#[derive(Parser, Debug)]
#[command(name = "ledger-node", version, propagate_version = true)]
pub struct LedgerNodeCli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "lamport_ledger=info,ledger_node=info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one node over TCP and read commands from stdin
    Run(RunArgs),
    /// Start every configured node in this process and submit transfers
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Cluster file: JSON array of {name, host, port, id?}
    #[arg(long, short = 'c', env = "LEDGER_CLUSTER")]
    pub config: PathBuf,

    /// Which member of the cluster this process is
    #[arg(long, short = 'n', env = "LEDGER_NODE_NAME")]
    pub name: String,

    /// Opening balance of every account
    #[arg(long, default_value_t = 10)]
    pub initial_balance: u64,

    /// Milliseconds to wait for acks before striking silent peers
    #[arg(long, default_value_t = 2000)]
    pub ack_timeout_ms: u64,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Cluster file: JSON array of {name, host, port, id?}
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Transfers to submit, as FROM:TO:AMOUNT
    #[arg(long = "transfer", short = 't', value_parser = parse_transfer)]
    pub transfers: Vec<Operation>,

    /// Opening balance of every account
    #[arg(long, default_value_t = 10)]
    pub initial_balance: u64,

    /// Milliseconds to wait for every link to come up before submitting
    #[arg(long, default_value_t = 5000)]
    pub settle_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Parse `FROM:TO:AMOUNT`
pub fn parse_transfer(s: &str) -> Result<Operation, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [from, to, amount] = parts.as_slice() else {
        return Err(format!("expected FROM:TO:AMOUNT, got {:?}", s));
    };
    if from.is_empty() || to.is_empty() {
        return Err("account names cannot be empty".to_string());
    }
    let amount: u64 = amount
        .parse()
        .map_err(|e| format!("bad amount {:?}: {}", amount, e))?;
    Ok(Operation::new(*from, *to, amount))
}
