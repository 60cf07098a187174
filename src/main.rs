// ledger-node - run one ledger participant, or a whole cluster in-process

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use lamport_ledger::ledger::{Block, Operation};
use lamport_ledger::logging;
use lamport_ledger::node::{spawn_tcp_node, ClusterConfig, NodeError, NodeHandle, TcpNode};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use cli::{Commands, LedgerNodeCli, RunArgs, SimulateArgs};

/// How long `simulate` waits for replays to reach every node
const REPLAY_SETTLE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LedgerNodeCli::parse();
    logging::init_logging(&cli.log_level, cli.log_format.into());

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Simulate(args) => simulate(args).await,
    }
}

// ============================================================================
// RUN
// ============================================================================

async fn run_node(args: RunArgs) -> Result<()> {
    let cluster = ClusterConfig::from_file(&args.config)
        .with_context(|| format!("failed to load cluster file {}", args.config.display()))?;
    let config = cluster
        .node_config(&args.name)?
        .with_initial_balance(args.initial_balance)
        .with_ack_timeout_ms(args.ack_timeout_ms);

    let node = spawn_tcp_node(config)
        .await
        .with_context(|| format!("failed to start node {}", args.name))?;
    info!(node = %args.name, address = %node.local_addr(), "ledger-node running");
    println!("{} ready. Type 'help' for commands.", args.name);

    let handle = node.handle().clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !execute(&handle, &line).await {
                        break;
                    }
                }
                Ok(None) => {
                    // Detached from a terminal; keep serving peers until interrupted
                    stdin_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    node.stop().await;
    Ok(())
}

/// Run one REPL line. Returns false when the user asked to quit.
async fn execute(handle: &NodeHandle, line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    let me = handle.name();

    let outcome = match words.as_slice() {
        [] => Ok(()),
        ["quit"] | ["exit"] => return false,
        ["help"] => {
            println!("transfer [from] <to> <amount> | balance [account] | balances | chain | peers | remote <peer> [account] | quit");
            Ok(())
        }
        ["transfer", to, amount] => submit(handle, me, to, amount).await,
        ["transfer", from, to, amount] => submit(handle, from, to, amount).await,
        ["balance"] => print_balance(handle, me).await,
        ["balance", account] => print_balance(handle, account).await,
        ["balances"] => handle.balances().await.map(|balances| {
            for (account, balance) in balances {
                println!("{:>12} {}", account, balance);
            }
        }),
        ["chain"] => print_chain(handle).await,
        ["peers"] => handle.snapshot().await.map(|snapshot| {
            for peer in &snapshot.peers {
                println!(
                    "{:>12} {:?} missed={}",
                    peer.name(),
                    peer.state(),
                    peer.missed_deadlines()
                );
            }
        }),
        ["remote", peer] => print_remote(handle, peer, me).await,
        ["remote", peer, account] => print_remote(handle, peer, account).await,
        _ => {
            println!("unknown command: {}", line.trim());
            Ok(())
        }
    };

    match outcome {
        Ok(()) => true,
        Err(NodeError::Stopped) => false,
        Err(e) => {
            println!("error: {}", e);
            true
        }
    }
}

async fn submit(handle: &NodeHandle, from: &str, to: &str, amount: &str) -> Result<(), NodeError> {
    let Ok(amount) = amount.parse::<u64>() else {
        println!("amount must be a non-negative integer");
        return Ok(());
    };
    let block = handle.transfer(Operation::new(from, to, amount)).await?;
    println!("committed {} as {}", block.operation(), block.hash());
    Ok(())
}

async fn print_balance(handle: &NodeHandle, account: &str) -> Result<(), NodeError> {
    let balance = handle.balance(account).await?;
    println!("{}: {}", account, balance);
    Ok(())
}

async fn print_remote(handle: &NodeHandle, peer: &str, account: &str) -> Result<(), NodeError> {
    let balance = handle.remote_balance(peer, account).await?;
    println!("{} says {}: {}", peer, account, balance);
    Ok(())
}

async fn print_chain(handle: &NodeHandle) -> Result<(), NodeError> {
    let chain = handle.chain().await?;
    print_blocks(&chain);
    println!("valid: {}", handle.chain_is_valid().await?);
    Ok(())
}

fn print_blocks(chain: &[Block]) {
    for (index, block) in chain.iter().enumerate() {
        println!(
            "#{:<3} {:<24} prev={:.12} hash={:.12}",
            index,
            block.operation().to_string(),
            block.prev_hash(),
            block.hash()
        );
    }
}

// ============================================================================
// SIMULATE
// ============================================================================

async fn simulate(args: SimulateArgs) -> Result<()> {
    let cluster = ClusterConfig::from_file(&args.config)
        .with_context(|| format!("failed to load cluster file {}", args.config.display()))?;

    let mut nodes: Vec<TcpNode> = Vec::new();
    for member in cluster.members() {
        let config = cluster
            .node_config(&member.name)?
            .with_initial_balance(args.initial_balance);
        let node = spawn_tcp_node(config)
            .await
            .with_context(|| format!("failed to start node {}", member.name))?;
        nodes.push(node);
    }

    wait_for_links(&nodes, Duration::from_millis(args.settle_ms)).await;

    let mut submitted = Vec::new();
    for operation in args.transfers {
        let node = nodes
            .iter()
            .find(|n| n.handle().name() == operation.sender())
            .or_else(|| nodes.first())
            .context("cluster has no members")?;
        let handle = node.handle().clone();
        submitted.push(tokio::spawn(async move {
            let result = handle.transfer(operation.clone()).await;
            (handle.name().to_string(), operation, result)
        }));
    }

    for task in submitted {
        let (via, operation, result) = task.await.context("transfer task panicked")?;
        match result {
            Ok(block) => println!("[{}] committed {} -> {}", via, operation, block.hash()),
            Err(e) => println!("[{}] rejected {}: {}", via, operation, e),
        }
    }

    wait_for_replays(&nodes, REPLAY_SETTLE).await;

    for node in &nodes {
        let handle = node.handle();
        println!("== {} ==", handle.name());
        for (account, balance) in handle.balances().await? {
            println!("{:>12} {}", account, balance);
        }
        print_blocks(&handle.chain().await?);
        println!("valid: {}", handle.chain_is_valid().await?);
    }

    for node in nodes {
        node.stop().await;
    }
    Ok(())
}

/// Poll until every node sees every peer as live, or `limit` passes
async fn wait_for_links(nodes: &[TcpNode], limit: Duration) {
    let deadline = Instant::now() + limit;
    let expected = nodes.len().saturating_sub(1);

    while Instant::now() < deadline {
        let mut ready = true;
        for node in nodes {
            match node.handle().snapshot().await {
                Ok(snapshot) if snapshot.live_peers.len() == expected => {}
                _ => ready = false,
            }
        }
        if ready {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    warn!("not every link came up; continuing with a partial live set");
}

/// Poll until every node holds the same number of blocks, or `limit` passes
async fn wait_for_replays(nodes: &[TcpNode], limit: Duration) {
    let deadline = Instant::now() + limit;

    while Instant::now() < deadline {
        let mut lengths = Vec::with_capacity(nodes.len());
        for node in nodes {
            if let Ok(snapshot) = node.handle().snapshot().await {
                lengths.push(snapshot.chain_len);
            }
        }
        if lengths.windows(2).all(|w| w[0] == w[1]) {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
}
