//! Single-task driver that wires the connection state machine, the eager
//! policy, the event reconciler and the derived data tracker to a
//! [`ProviderGateway`].
//!
//! Every provider call is a local future polled by the session task, so
//! completions interleave freely with commands and provider events. Each
//! transition is handed to the tracker, the policy and the reconciler
//! before the next message is processed; the view only ever reads the
//! published [`SessionSnapshot`].

use std::collections::VecDeque;
use std::rc::Rc;

use alloy::primitives::{Address, U256};
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{
    ActivationOrigin, ConnectError, Connector, Derived, ProviderEvent, ProviderEventKind,
};
use crate::eager::{EagerConnectPolicy, EagerPhase};
use crate::ports::{PortError, ProviderGateway, Subscription, SubscriptionId};
use crate::reconciler::{EventReconciler, ListenerAction, ReconcileCommand};
use crate::state_machine::{
    ActivationTicket, ConnectionState, ConnectionStateMachine, StateTransition,
};
use crate::tracker::{BalanceRequest, DerivedDataTracker, TrackerCommand};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Try a silent reconnect as soon as the session starts.
    pub eager_connect: bool,
    /// Number of transitions kept in the snapshot history.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            eager_connect: true,
            history_limit: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Activate,
    Deactivate,
    EagerConnect,
    Refresh,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub block_number: Derived<u64>,
    pub balance: Derived<U256>,
    pub eager_phase: EagerPhase,
    pub listening: bool,
    pub history: Vec<StateTransition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wallet session has shut down")]
pub struct SessionClosed;

/// Cloneable front door to a running [`WalletSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn activate(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Activate)
    }

    pub fn deactivate(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Deactivate)
    }

    pub fn eager_connect(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::EagerConnect)
    }

    pub fn refresh(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Refresh)
    }

    pub fn shutdown(&self) -> Result<(), SessionClosed> {
        self.send(SessionCommand::Shutdown)
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).map_err(|_| SessionClosed)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, SessionClosed> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| SessionClosed)?;
        Ok(snapshot.clone())
    }
}

enum Completion {
    EagerProbe(Result<bool, PortError>),
    Activation {
        ticket: ActivationTicket,
        outcome: Result<(Address, u64), ConnectError>,
    },
    BlockNumber {
        epoch: u64,
        result: Result<u64, PortError>,
    },
    Balance {
        request: BalanceRequest,
        result: Result<U256, PortError>,
    },
}

pub struct WalletSession<P> {
    gateway: Rc<P>,
    config: SessionConfig,
    machine: ConnectionStateMachine,
    eager: EagerConnectPolicy,
    reconciler: EventReconciler,
    tracker: DerivedDataTracker,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    snapshot: watch::Sender<SessionSnapshot>,
    history: VecDeque<StateTransition>,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    events: Option<Subscription<ProviderEvent>>,
    blocks: Option<(u64, Subscription<u64>)>,
}

impl<P> WalletSession<P>
where
    P: ProviderGateway + 'static,
{
    pub fn new(gateway: P, config: SessionConfig) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let session = Self {
            gateway: Rc::new(gateway),
            config,
            machine: ConnectionStateMachine::new(),
            eager: EagerConnectPolicy::new(),
            reconciler: EventReconciler::new(),
            tracker: DerivedDataTracker::new(),
            commands: command_rx,
            snapshot: snapshot_tx,
            history: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            events: None,
            blocks: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        };
        (session, handle)
    }

    /// Run until every handle is dropped or `Shutdown` is received. All
    /// provider subscriptions are released before returning.
    pub async fn run(mut self) {
        info!(eager_connect = self.config.eager_connect, "wallet session started");
        if self.config.eager_connect {
            self.start_eager_connect();
        }
        self.sync_reconciler();
        self.publish_snapshot();

        loop {
            tokio::select! {
                biased;
                Some(completion) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    self.complete(completion);
                }
                Some(event) = next_event(&mut self.events) => {
                    self.handle_event(event);
                }
                Some((epoch, number)) = next_block(&mut self.blocks) => {
                    if self.tracker.on_new_block(epoch, number) {
                        self.publish_snapshot();
                    }
                }
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
            }
        }

        self.teardown();
        info!("wallet session stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Activate => self.activate(ActivationOrigin::User),
            SessionCommand::Deactivate => self.deactivate(),
            SessionCommand::EagerConnect => {
                self.start_eager_connect();
                self.sync_reconciler();
            }
            SessionCommand::Refresh => {
                let commands = self.tracker.refresh();
                self.run_tracker_commands(commands);
            }
            SessionCommand::Shutdown => {}
        }
        self.publish_snapshot();
    }

    fn start_eager_connect(&mut self) {
        if !self.eager.start() {
            debug!(phase = ?self.eager.phase(), "eager connect already attempted");
            return;
        }
        let gateway = Rc::clone(&self.gateway);
        self.in_flight.push(
            async move { Completion::EagerProbe(probe_authorization(gateway.as_ref()).await) }
                .boxed_local(),
        );
    }

    fn activate(&mut self, origin: ActivationOrigin) {
        if origin == ActivationOrigin::User {
            self.eager.preempt();
        }
        if matches!(
            self.machine.state().error(),
            Some(ConnectError::ProviderUnavailable)
        ) && !self.gateway.is_available()
        {
            debug!(?origin, "no injected provider yet, activation is a no-op");
            return;
        }
        match self.machine.begin_activate(Connector::Injected, origin) {
            Ok((ticket, transition)) => {
                self.publish_transition(transition);
                self.spawn_activation(ticket);
            }
            Err(rejected) => debug!(%rejected, ?origin, "activation ignored"),
        }
    }

    fn spawn_activation(&mut self, ticket: ActivationTicket) {
        let gateway = Rc::clone(&self.gateway);
        self.in_flight.push(
            async move {
                let outcome = connect(gateway.as_ref(), ticket.origin).await;
                Completion::Activation { ticket, outcome }
            }
            .boxed_local(),
        );
    }

    fn deactivate(&mut self) {
        if let Some(transition) = self.machine.deactivate() {
            info!("wallet deactivated");
            self.publish_transition(transition);
        }
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::EagerProbe(result) => self.finish_eager_probe(result),
            Completion::Activation { ticket, outcome } => {
                match &outcome {
                    Ok((account, chain_id)) => {
                        info!(%account, chain_id, origin = ?ticket.origin, "wallet connected")
                    }
                    Err(cause) => info!(%cause, origin = ?ticket.origin, "wallet activation failed"),
                }
                if let Some(transition) = self.machine.complete_activate(ticket, outcome) {
                    self.publish_transition(transition);
                }
                if ticket.origin == ActivationOrigin::Eager {
                    self.eager.finish();
                    self.sync_reconciler();
                }
            }
            Completion::BlockNumber { epoch, result } => {
                self.tracker.apply_block_number(epoch, result);
            }
            Completion::Balance { request, result } => {
                self.tracker.apply_balance(&request, result);
            }
        }
        self.publish_snapshot();
    }

    fn finish_eager_probe(&mut self, result: Result<bool, PortError>) {
        match result {
            Ok(true) => {
                match self
                    .machine
                    .begin_activate(Connector::Injected, ActivationOrigin::Eager)
                {
                    Ok((ticket, transition)) => {
                        // The policy stays in flight until the activation settles.
                        self.publish_transition(transition);
                        self.spawn_activation(ticket);
                        return;
                    }
                    Err(rejected) => debug!(%rejected, "eager connect superseded"),
                }
            }
            Ok(false) => debug!("no prior authorization, skipping eager connect"),
            Err(err) => debug!(%err, "eager connect probe failed"),
        }
        self.eager.finish();
        self.sync_reconciler();
    }

    fn handle_event(&mut self, event: ProviderEvent) {
        let Some(command) = self.reconciler.reconcile(&event, self.machine.state()) else {
            debug!(?event, "provider event needs no reconciliation");
            return;
        };
        debug!(?event, ?command, "reconciling provider event");
        match command {
            ReconcileCommand::Activate => self.activate(ActivationOrigin::ProviderEvent),
            ReconcileCommand::Deactivate => self.deactivate(),
            ReconcileCommand::SwitchChain(chain_id) => {
                if let Some(transition) = self.machine.switch_chain(chain_id) {
                    self.publish_transition(transition);
                }
            }
            ReconcileCommand::SwitchAccount(account) => {
                if let Some(transition) = self.machine.switch_account(account) {
                    self.publish_transition(transition);
                }
            }
        }
        self.publish_snapshot();
    }

    fn publish_transition(&mut self, transition: StateTransition) {
        self.eager.observe(&transition.to);
        let commands = self.tracker.on_state(&transition.to);
        self.run_tracker_commands(commands);
        while self.history.len() >= self.config.history_limit.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(transition);
        self.sync_reconciler();
    }

    fn run_tracker_commands(&mut self, commands: Vec<TrackerCommand>) {
        for command in commands {
            match command {
                TrackerCommand::UnsubscribeBlocks => {
                    if let Some((_, subscription)) = self.blocks.take() {
                        self.release(subscription.id);
                    }
                }
                TrackerCommand::SubscribeBlocks { epoch } => {
                    if let Some((_, previous)) = self.blocks.take() {
                        self.release(previous.id);
                    }
                    match self.gateway.subscribe_blocks() {
                        Ok(subscription) => self.blocks = Some((epoch, subscription)),
                        Err(err) => warn!(%err, epoch, "block subscription failed"),
                    }
                }
                TrackerCommand::FetchBlockNumber { epoch } => {
                    let gateway = Rc::clone(&self.gateway);
                    self.in_flight.push(
                        async move {
                            let result = gateway.block_number().await;
                            Completion::BlockNumber { epoch, result }
                        }
                        .boxed_local(),
                    );
                }
                TrackerCommand::FetchBalance(request) => {
                    let gateway = Rc::clone(&self.gateway);
                    self.in_flight.push(
                        async move {
                            let result = gateway.balance(request.account).await;
                            Completion::Balance { request, result }
                        }
                        .boxed_local(),
                    );
                }
            }
        }
    }

    fn sync_reconciler(&mut self) {
        let suppressed = EventReconciler::is_suppressed(&self.eager, self.machine.state());
        match self.reconciler.plan(suppressed) {
            ListenerAction::Keep => {}
            ListenerAction::Unsubscribe(id) => {
                self.reconciler.detach();
                self.events = None;
                self.release(id);
            }
            ListenerAction::Subscribe => {
                match self.gateway.subscribe_events(&ProviderEventKind::ALL) {
                    Ok(subscription) => {
                        self.reconciler.attach(subscription.id);
                        self.events = Some(subscription);
                    }
                    Err(err) => debug!(%err, "provider events unavailable"),
                }
            }
        }
    }

    fn release(&self, id: SubscriptionId) {
        if let Err(err) = self.gateway.unsubscribe(id) {
            warn!(%err, %id, "failed to release provider subscription");
        }
    }

    fn teardown(&mut self) {
        if let Some(id) = self.reconciler.detach() {
            self.events = None;
            self.release(id);
        }
        let commands = self.tracker.reset();
        self.run_tracker_commands(commands);
        if let Some((_, subscription)) = self.blocks.take() {
            self.release(subscription.id);
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(SessionSnapshot {
            connection: self.machine.state().clone(),
            block_number: self.tracker.block_number().clone(),
            balance: self.tracker.balance().clone(),
            eager_phase: self.eager.phase(),
            listening: self.reconciler.is_listening(),
            history: self.history.iter().cloned().collect(),
        });
    }
}

async fn probe_authorization<P: ProviderGateway>(gateway: &P) -> Result<bool, PortError> {
    if !gateway.is_available() {
        return Ok(false);
    }
    gateway.is_authorized().await
}

async fn connect<P: ProviderGateway>(
    gateway: &P,
    origin: ActivationOrigin,
) -> Result<(Address, u64), ConnectError> {
    if !gateway.is_available() {
        return Err(ConnectError::ProviderUnavailable);
    }
    let accounts = if origin.prompts() {
        gateway.request_accounts().await?
    } else {
        gateway.accounts().await?
    };
    let account = accounts.first().copied().ok_or(ConnectError::NoAccounts)?;
    let chain_id = gateway.chain_id().await?;
    Ok((account, chain_id))
}

async fn next_event(events: &mut Option<Subscription<ProviderEvent>>) -> Option<ProviderEvent> {
    match events {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_block(blocks: &mut Option<(u64, Subscription<u64>)>) -> Option<(u64, u64)> {
    match blocks {
        Some((epoch, subscription)) => {
            let epoch = *epoch;
            subscription.recv().await.map(|number| (epoch, number))
        }
        None => std::future::pending().await,
    }
}
