// Transfer Tests
// End-to-end transfers through the mutex over the in-memory network

use crate::common::{wait_for, MemoryCluster};
use lamport_ledger::ledger::{Ledger, Operation, GENESIS_PREV_HASH};
use lamport_ledger::mutex::MutexPhase;
use lamport_ledger::node::NodeError;
use sha2::{Digest, Sha256};

const ABC: [&str; 3] = ["A", "B", "C"];

#[tokio::test]
async fn test_transfer_commits_and_replicates() {
    let cluster = MemoryCluster::start(&ABC).await;

    let block = cluster
        .node("A")
        .transfer(Operation::new("A", "B", 5))
        .await
        .unwrap();

    assert_eq!(block.prev_hash(), GENESIS_PREV_HASH);
    assert_eq!(block.hash(), hex::encode(Sha256::digest(b"AB50")));

    let chains = cluster.settled_chains(1).await;
    for chain in &chains {
        assert_eq!(chain, &vec![block.clone()]);
    }

    for handle in &cluster.handles {
        assert_eq!(handle.balance("A").await.unwrap(), 5);
        assert_eq!(handle.balance("B").await.unwrap(), 15);
        assert_eq!(handle.balance("C").await.unwrap(), 10);
        assert!(handle.chain_is_valid().await.unwrap());
    }

    let stats = cluster.node("A").stats().await.unwrap();
    assert_eq!(stats.transfers_committed, 1);
    assert_eq!(stats.mutex_acquisitions, 1);
    let stats = cluster.node("B").stats().await.unwrap();
    assert_eq!(stats.transactions_replayed, 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_insufficient_funds_rejected_without_side_effects() {
    let cluster = MemoryCluster::start(&ABC).await;
    let a = cluster.node("A");

    let err = a.transfer(Operation::new("A", "B", 100)).await.unwrap_err();

    assert!(matches!(
        err,
        NodeError::InsufficientFunds {
            available: 10,
            required: 100,
            ..
        }
    ));
    assert!(err.is_rejection());

    let snapshot = a.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, MutexPhase::Idle);
    assert_eq!(snapshot.chain_len, 0);
    assert_eq!(snapshot.balances.get("A"), Some(&10));
    assert_eq!(snapshot.stats.transfers_rejected, 1);

    // Peers saw the request and the release but no transaction
    for peer in ["B", "C"] {
        let snapshot = wait_for(cluster.node(peer), "release", |s| {
            s.stats.messages_received >= 2 && s.queue.is_empty()
        })
        .await;
        assert_eq!(snapshot.chain_len, 0);
        assert_eq!(snapshot.stats.transactions_replayed, 0);
    }

    // The mutex was released: the next transfer goes through
    a.transfer(Operation::new("A", "B", 1)).await.unwrap();

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_zero_amount_rejected_locally() {
    let cluster = MemoryCluster::start(&ABC).await;

    let result = cluster.node("A").transfer(Operation::new("A", "B", 0)).await;

    assert_eq!(result, Err(NodeError::InvalidAmount));
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_transfers_yield_identical_ledgers() {
    let cluster = MemoryCluster::start(&ABC).await;
    let rounds = 5;

    let mut tasks = Vec::new();
    for (from, to) in [("A", "B"), ("B", "C"), ("C", "A")] {
        for _ in 0..rounds {
            let handle = cluster.node(from).clone();
            let operation = Operation::new(from, to, 1);
            tasks.push(tokio::spawn(async move { handle.transfer(operation).await }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let chains = cluster.settled_chains(3 * rounds).await;
    assert!(chains.windows(2).all(|w| w[0] == w[1]));
    assert!(Ledger::from_blocks(chains[0].clone()).is_valid());

    let first = cluster.handles[0].balances().await.unwrap();
    for handle in &cluster.handles {
        let balances = handle.balances().await.unwrap();
        assert_eq!(balances, first);
        assert_eq!(balances.values().sum::<u64>(), 30);
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_queued_transfers_commit_in_submission_order() {
    let cluster = MemoryCluster::start(&ABC).await;
    let a = cluster.node("A").clone();

    let first = tokio::spawn({
        let a = a.clone();
        async move { a.transfer(Operation::new("A", "B", 1)).await }
    });
    let second = tokio::spawn({
        let a = a.clone();
        async move { a.transfer(Operation::new("A", "C", 2)).await }
    });
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let chain = a.chain().await.unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].prev_hash(), chain[0].hash());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_spending_received_funds_replays_everywhere() {
    let cluster = MemoryCluster::start(&ABC).await;

    cluster
        .node("A")
        .transfer(Operation::new("A", "B", 10))
        .await
        .unwrap();
    // B can only afford this after A's transfer
    cluster
        .node("B")
        .transfer(Operation::new("B", "C", 15))
        .await
        .unwrap();

    cluster.settled_chains(2).await;
    for handle in &cluster.handles {
        let balances = handle.balances().await.unwrap();
        assert_eq!(balances.get("A"), Some(&0));
        assert_eq!(balances.get("B"), Some(&5));
        assert_eq!(balances.get("C"), Some(&25));
        assert_eq!(handle.stats().await.unwrap().replay_failures, 0);
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_single_node_cluster_needs_no_acks() {
    let cluster = MemoryCluster::start(&["Solo"]).await;

    let block = cluster
        .node("Solo")
        .transfer(Operation::new("Solo", "Elsewhere", 4))
        .await
        .unwrap();

    assert_eq!(block.operation().amount(), 4);
    assert_eq!(cluster.node("Solo").balance("Elsewhere").await.unwrap(), 4);
    cluster.shutdown().await;
}
