// Node - one participant in the ledger network
//
// A single task owns the coordinator, ledger, balances and peer registry.
// Local callers reach it through a NodeHandle; peers reach it through the
// transport's event channel. Every mutation happens on that task, so no lock
// guards protocol state.

use crate::clock::{QueueEntry, Timestamp};
use crate::ledger::{Block, Ledger, Operation};
use crate::mutex::{MutexCoordinator, MutexPhase, Outbound};
use crate::node::config::NodeConfig;
use crate::node::error::NodeError;
use crate::node::handle::{Command, NodeHandle};
use crate::sync::{Message, PeerInfo, PeerRegistry};
use crate::transport::{PeerLink, TransportError, TransportEvent};
use crate::vault::AccountBalances;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

// ============================================================================
// STATS AND SNAPSHOTS
// ============================================================================

/// Counters describing what a node has done since it started
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub transfers_committed: u64,
    pub transfers_rejected: u64,
    pub transactions_replayed: u64,
    pub replay_failures: u64,
    pub mutex_acquisitions: u64,
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub send_failures: u64,
    pub peers_demoted: u64,
}

/// Point-in-time view of a node's protocol and ledger state
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub name: String,
    pub clock: Timestamp,
    pub phase: MutexPhase,
    pub pending_acks: usize,
    pub expected_acks: usize,
    /// Request queue, earliest first
    pub queue: Vec<QueueEntry>,
    pub balances: BTreeMap<String, u64>,
    pub chain_len: usize,
    pub head_hash: String,
    pub chain_valid: bool,
    pub peers: Vec<PeerInfo>,
    pub live_peers: Vec<String>,
    pub pending_transfers: usize,
    /// Peer transactions waiting for earlier requests to clear
    pub held_back: usize,
    pub stats: NodeStats,
}

struct PendingTransfer {
    operation: Operation,
    reply: oneshot::Sender<Result<Block, NodeError>>,
}

/// A peer's committed transfer, ordered by the request that won it the mutex
struct HeldTransaction {
    request: Option<Timestamp>,
    operation: Operation,
    sender: String,
}

struct BalanceQuery {
    account: String,
    reply: oneshot::Sender<Result<u64, NodeError>>,
}

// ============================================================================
// NODE
// ============================================================================

/// The actor. Build with [`Node::new`] and drive with [`Node::run`].
pub struct Node {
    config: NodeConfig,
    coordinator: MutexCoordinator,
    ledger: Ledger,
    balances: AccountBalances,
    peers: PeerRegistry,
    link: Arc<dyn PeerLink>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Receiver<TransportEvent>,
    /// Transfers waiting for the mutex, oldest first
    pending: VecDeque<PendingTransfer>,
    /// Outstanding remote balance queries per peer
    queries: HashMap<String, VecDeque<BalanceQuery>>,
    /// Latest mutex request seen from each peer
    last_request: HashMap<String, Timestamp>,
    /// Replays waiting for every earlier request to be released
    held_back: Vec<HeldTransaction>,
    /// When silent peers next get a strike, while requesting
    ack_deadline: Option<Instant>,
    stats: NodeStats,
}

impl Node {
    /// Create a node speaking through `link` and fed by `events`
    pub fn new(
        config: NodeConfig,
        link: Arc<dyn PeerLink>,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Result<(Self, NodeHandle), NodeError> {
        config.validate()?;

        let mut peers = PeerRegistry::new(config.name.clone());
        for peer in &config.peers {
            // validate() already rejected self-references
            let _ = peers.add_peer(&peer.name, Some(peer.address()));
        }

        let balances = AccountBalances::with_initial(config.account_names(), config.initial_balance);
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let handle = NodeHandle::new(&config.name, tx, config.query_timeout());

        let node = Self {
            coordinator: MutexCoordinator::new(config.name.clone(), config.id),
            ledger: Ledger::new(),
            balances,
            peers,
            link,
            commands: rx,
            events,
            pending: VecDeque::new(),
            queries: HashMap::new(),
            last_request: HashMap::new(),
            held_back: Vec::new(),
            ack_deadline: None,
            stats: NodeStats::default(),
            config,
        };
        Ok((node, handle))
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Process commands and transport events until shut down or every
    /// handle is dropped
    pub async fn run(mut self) {
        info!(node = %self.config.name, id = self.config.id, peers = self.peers.peer_count(), "node started");
        let mut transport_open = true;

        loop {
            let deadline = self.ack_deadline;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = self.events.recv(), if transport_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!(node = %self.config.name, "transport event stream closed");
                        transport_open = false;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_ack_deadline().await;
                }
            }
            self.replay_ready();
            self.drive().await;
        }

        self.stop().await;
    }

    async fn stop(&mut self) {
        let out = self.coordinator.abandon_request();
        self.flush(out).await;

        for transfer in self.pending.drain(..) {
            let _ = transfer.reply.send(Err(NodeError::Stopped));
        }
        for (_, queries) in self.queries.drain() {
            for query in queries {
                let _ = query.reply.send(Err(NodeError::Stopped));
            }
        }
        info!(node = %self.config.name, blocks = self.ledger.len(), "node stopped");
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Transfer { operation, reply } => {
                if operation.amount() == 0 {
                    self.stats.transfers_rejected += 1;
                    let _ = reply.send(Err(NodeError::InvalidAmount));
                    return;
                }
                debug!(node = %self.config.name, operation = %operation, queued = self.pending.len(), "transfer submitted");
                self.pending.push_back(PendingTransfer { operation, reply });
            }
            Command::Balance { account, reply } => {
                let _ = reply.send(self.balances.get(&account));
            }
            Command::Balances { reply } => {
                let _ = reply.send(self.balances.snapshot());
            }
            Command::Chain { reply } => {
                let _ = reply.send(self.ledger.blocks().to_vec());
            }
            Command::RemoteBalance { peer, account, reply } => {
                self.query_balance(peer, account, reply).await;
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats.clone());
            }
            // handled by run()
            Command::Shutdown => {}
        }
    }

    async fn query_balance(
        &mut self,
        peer: String,
        account: String,
        reply: oneshot::Sender<Result<u64, NodeError>>,
    ) {
        let request = Message::balance_request(&self.config.name, Some(&account));
        match self.link.send(&peer, &request).await {
            Ok(()) => {
                self.queries
                    .entry(peer)
                    .or_default()
                    .push_back(BalanceQuery { account, reply });
            }
            Err(e) => {
                self.stats.send_failures += 1;
                let _ = reply.send(Err(e.into()));
            }
        }
    }

    fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            name: self.config.name.clone(),
            clock: self.coordinator.clock().get_time(),
            phase: self.coordinator.phase(),
            pending_acks: self.coordinator.pending_acks(),
            expected_acks: self.coordinator.expected_acks(),
            queue: self.coordinator.queue().to_sorted_vec(),
            balances: self.balances.snapshot(),
            chain_len: self.ledger.len(),
            head_hash: self.ledger.head_hash().to_string(),
            chain_valid: self.ledger.is_valid(),
            peers: self.peers.peers().cloned().collect(),
            live_peers: self.peers.live_peers(),
            pending_transfers: self.pending.len(),
            held_back: self.held_back.len(),
            stats: self.stats.clone(),
        }
    }

    // ========================================================================
    // TRANSPORT EVENTS
    // ========================================================================

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerConnected { peer } => {
                if self.peers.mark_connected(&peer) {
                    info!(node = %self.config.name, peer = %peer, "peer joined live set");
                }
                let out = self.coordinator.on_peer_connected(&peer);
                self.flush(out).await;
            }
            TransportEvent::PeerDisconnected { peer, reason } => {
                if self.peers.mark_disconnected(&peer) {
                    warn!(node = %self.config.name, peer = %peer, reason = %reason, "peer left live set");
                    let out = self.coordinator.drop_peer(&peer);
                    self.flush(out).await;
                }
                self.fail_queries(&peer, NodeError::PeerUnreachable(peer.clone()));
            }
            TransportEvent::MessageReceived { message } => {
                self.stats.messages_received += 1;
                self.handle_message(message).await;
            }
            TransportEvent::MalformedMessage { error } => {
                self.stats.malformed_messages += 1;
                warn!(node = %self.config.name, error = %error, "discarded malformed message");
            }
        }
    }

    async fn handle_message(&mut self, message: Message) {
        if message.sender() == self.config.name {
            debug!(node = %self.config.name, kind = %message.message_type(), "ignoring own message");
            return;
        }
        if self.peers.record_activity(message.sender()) {
            info!(node = %self.config.name, peer = %message.sender(), "unresponsive peer re-admitted");
        }

        match message {
            Message::MutexRequest { lamport_time, sender } => {
                debug!(node = %self.config.name, peer = %sender, lamport = %lamport_time, "mutex request");
                self.last_request.insert(sender.clone(), lamport_time);
                let out = self.coordinator.on_request(lamport_time, &sender);
                self.flush(out).await;
            }
            Message::MutexAck { lamport_time, sender } => {
                let acquired = self.coordinator.on_ack(lamport_time, &sender);
                debug!(
                    node = %self.config.name,
                    peer = %sender,
                    acks = self.coordinator.pending_acks(),
                    expected = self.coordinator.expected_acks(),
                    "mutex ack"
                );
                if acquired {
                    info!(node = %self.config.name, lamport = %self.coordinator.clock().get_time(), "mutex acquired");
                }
            }
            Message::MutexRelease { lamport_time, sender } => {
                debug!(node = %self.config.name, peer = %sender, lamport = %lamport_time, "mutex release");
                let out = self.coordinator.on_release(lamport_time, &sender);
                self.flush(out).await;
            }
            Message::Transaction {
                operation,
                lamport_time,
                sender,
            } => {
                self.coordinator.observe(lamport_time);
                let request = self.last_request.get(&sender).copied();
                self.held_back.push(HeldTransaction {
                    request,
                    operation,
                    sender,
                });
            }
            Message::BalanceRequest { sender, account } => {
                let account = account.unwrap_or_else(|| sender.clone());
                let balance = self.balances.get(&account);
                let response = Message::balance_response(&self.config.name, &account, balance);
                self.flush(vec![Outbound::Send {
                    to: sender,
                    message: response,
                }])
                .await;
            }
            Message::BalanceResponse {
                sender,
                account,
                balance,
            } => {
                self.resolve_query(&sender, &account, balance);
            }
        }
    }

    /// Replay held transactions in request order.
    ///
    /// A transaction is committed under the request that won its sender the
    /// mutex. It waits while any other peer's earlier request is still
    /// queued, since that holder's transaction arrives on another link and
    /// its release follows it on that link.
    fn replay_ready(&mut self) {
        self.held_back.sort_by_key(|held| held.request);

        while let Some(held) = self.held_back.first() {
            let blocked = held.request.is_some_and(|request| {
                self.coordinator
                    .queue()
                    .has_request_before(request, &self.config.name)
            });
            if blocked {
                debug!(node = %self.config.name, peer = %held.sender, waiting = self.held_back.len(), "replay held back");
                return;
            }

            let held = self.held_back.remove(0);
            self.replay(held.operation, &held.sender);
        }
    }

    /// Apply a transfer another node already committed
    fn replay(&mut self, operation: Operation, from: &str) {
        match self.balances.apply(&operation) {
            Ok(()) => {
                let block = self.ledger.add_block(operation);
                self.stats.transactions_replayed += 1;
                info!(
                    node = %self.config.name,
                    peer = %from,
                    operation = %block.operation(),
                    hash = %block.hash(),
                    "replayed transaction"
                );
            }
            Err(e) => {
                self.stats.replay_failures += 1;
                error!(node = %self.config.name, peer = %from, operation = %operation, error = %e, "replay rejected, ledger diverges");
            }
        }
    }

    fn resolve_query(&mut self, peer: &str, account: &str, balance: u64) {
        let Some(queries) = self.queries.get_mut(peer) else {
            debug!(node = %self.config.name, peer = %peer, "unsolicited balance response");
            return;
        };
        // Callers that timed out have dropped their receiver
        queries.retain(|q| !q.reply.is_closed());
        if let Some(pos) = queries.iter().position(|q| q.account == account) {
            if let Some(query) = queries.remove(pos) {
                let _ = query.reply.send(Ok(balance));
            }
        }
        if queries.is_empty() {
            self.queries.remove(peer);
        }
    }

    fn fail_queries(&mut self, peer: &str, error: NodeError) {
        if let Some(queries) = self.queries.remove(peer) {
            for query in queries {
                let _ = query.reply.send(Err(error.clone()));
            }
        }
    }

    // ========================================================================
    // MUTEX DRIVER
    // ========================================================================

    /// Advance the pending-transfer pipeline as far as it can go without
    /// waiting on a peer
    async fn drive(&mut self) {
        loop {
            match self.coordinator.phase() {
                MutexPhase::Held => self.critical_section().await,
                MutexPhase::Idle if !self.pending.is_empty() => {
                    let live = self.peers.live_peers();
                    match self.coordinator.request_mutex(live) {
                        Ok(out) => {
                            info!(
                                node = %self.config.name,
                                lamport = %self.coordinator.clock().get_time(),
                                expected = self.coordinator.expected_acks(),
                                "mutex requested"
                            );
                            self.ack_deadline = Some(Instant::now() + self.config.ack_timeout());
                            self.flush(out).await;
                        }
                        Err(e) => {
                            error!(node = %self.config.name, error = %e, "mutex request refused");
                            return;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    /// Commit the oldest pending transfer, then release unconditionally
    async fn critical_section(&mut self) {
        self.ack_deadline = None;
        self.stats.mutex_acquisitions += 1;

        if let Some(transfer) = self.pending.pop_front() {
            let result = self.commit(transfer.operation).await;
            let _ = transfer.reply.send(result);
        }

        match self.coordinator.release_mutex() {
            Ok(out) => {
                debug!(node = %self.config.name, "mutex released");
                self.flush(out).await;
            }
            Err(e) => error!(node = %self.config.name, error = %e, "release failed"),
        }
    }

    async fn commit(&mut self, operation: Operation) -> Result<Block, NodeError> {
        if let Err(e) = self.balances.apply(&operation) {
            self.stats.transfers_rejected += 1;
            warn!(node = %self.config.name, operation = %operation, error = %e, "transfer rejected");
            return Err(e.into());
        }

        let block = self.ledger.add_block(operation.clone());
        self.stats.transfers_committed += 1;
        let ts = self.coordinator.stamp();
        info!(
            node = %self.config.name,
            operation = %operation,
            lamport = %ts,
            hash = %block.hash(),
            "transfer committed"
        );

        let message = Message::transaction(operation, ts, &self.config.name);
        self.flush(vec![Outbound::Broadcast(message)]).await;
        Ok(block)
    }

    /// Strike every peer that still owes an ack; demote repeat offenders
    async fn on_ack_deadline(&mut self) {
        if !self.coordinator.is_requesting() {
            self.ack_deadline = None;
            return;
        }

        let silent: Vec<String> = self.coordinator.awaiting().map(str::to_string).collect();
        let mut out = Vec::new();
        for peer in silent {
            let missed = self.peers.record_missed(&peer).unwrap_or(u32::MAX);
            warn!(node = %self.config.name, peer = %peer, missed, "ack deadline missed");

            if missed >= self.config.max_missed_acks {
                self.peers.demote(&peer);
                self.stats.peers_demoted += 1;
                warn!(node = %self.config.name, peer = %peer, "peer demoted to unresponsive");
                out.extend(self.coordinator.drop_peer(&peer));
            }
        }

        self.ack_deadline = Some(Instant::now() + self.config.ack_timeout());
        self.flush(out).await;
    }

    // ========================================================================
    // OUTBOUND
    // ========================================================================

    /// Deliver coordinator output. A peer that cannot be reached leaves the
    /// live set, which may produce further output.
    async fn flush(&mut self, outbound: Vec<Outbound>) {
        let mut queue: VecDeque<Outbound> = outbound.into();

        while let Some(item) = queue.pop_front() {
            let failed = match item {
                Outbound::Send { to, message } => match self.link.send(&to, &message).await {
                    Ok(()) => Vec::new(),
                    Err(e) => vec![(to, e)],
                },
                Outbound::Broadcast(message) => {
                    // Demoted peers no longer owe acks but still follow the ledger
                    let reachable = self.peers.reachable_peers();
                    self.link.broadcast(&reachable, &message).await.failed
                }
            };

            for (peer, error) in failed {
                self.stats.send_failures += 1;
                warn!(node = %self.config.name, peer = %peer, error = %error, "send failed");

                let was_live = match error {
                    TransportError::PeerUnreachable(_) => self.peers.mark_disconnected(&peer),
                    _ => self.peers.demote(&peer),
                };
                if was_live {
                    queue.extend(self.coordinator.drop_peer(&peer));
                }
            }
        }
    }
}
