use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::debug;

use crate::domain::Derived;
use crate::ports::PortError;
use crate::state_machine::ConnectionState;

/// Shared flag carried by an in-flight request. Once marked, the
/// request's result must be dropped instead of applied.
#[derive(Debug, Clone, Default)]
pub struct StaleGuard(Arc<AtomicBool>);

impl StaleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_stale(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stale(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn same_as(&self, other: &StaleGuard) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone)]
pub struct BalanceRequest {
    pub account: Address,
    pub chain_id: u64,
    guard: StaleGuard,
}

impl BalanceRequest {
    pub fn is_stale(&self) -> bool {
        self.guard.is_stale()
    }
}

/// The connected `(account, chain)` pair being tracked. `epoch` increases
/// every time the pair changes; block results are tagged with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedContext {
    pub account: Address,
    pub chain_id: u64,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
pub enum TrackerCommand {
    FetchBlockNumber { epoch: u64 },
    SubscribeBlocks { epoch: u64 },
    UnsubscribeBlocks,
    FetchBalance(BalanceRequest),
}

#[derive(Debug, Default)]
pub struct DerivedDataTracker {
    context: Option<TrackedContext>,
    epoch: u64,
    block_number: Derived<u64>,
    balance: Derived<U256>,
    pending_balance: Option<StaleGuard>,
}

impl DerivedDataTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> Option<TrackedContext> {
        self.context
    }

    pub fn block_number(&self) -> &Derived<u64> {
        &self.block_number
    }

    pub fn balance(&self) -> &Derived<U256> {
        &self.balance
    }

    pub fn has_pending_balance(&self) -> bool {
        self.pending_balance.is_some()
    }

    /// React to the connection state after a transition. Returns the
    /// subscriptions and fetches the owner must perform, in order.
    pub fn on_state(&mut self, state: &ConnectionState) -> Vec<TrackerCommand> {
        let next = state.context();
        let current = self.context.map(|c| (c.account, c.chain_id));
        if next == current {
            return Vec::new();
        }

        let mut commands = self.reset();
        if let Some((account, chain_id)) = next {
            self.epoch = self.epoch.saturating_add(1);
            let epoch = self.epoch;
            self.context = Some(TrackedContext {
                account,
                chain_id,
                epoch,
            });
            commands.push(TrackerCommand::FetchBlockNumber { epoch });
            commands.push(TrackerCommand::SubscribeBlocks { epoch });
            commands.push(TrackerCommand::FetchBalance(
                self.begin_balance(account, chain_id),
            ));
        }
        commands
    }

    /// Re-issue both fetches for the current context, e.g. after a failure.
    pub fn refresh(&mut self) -> Vec<TrackerCommand> {
        let Some(ctx) = self.context else {
            return Vec::new();
        };
        vec![
            TrackerCommand::FetchBlockNumber { epoch: ctx.epoch },
            TrackerCommand::FetchBalance(self.begin_balance(ctx.account, ctx.chain_id)),
        ]
    }

    /// Drop the tracked context: values go back to `Unknown` and any
    /// in-flight balance is marked stale.
    pub fn reset(&mut self) -> Vec<TrackerCommand> {
        let Some(previous) = self.context.take() else {
            return Vec::new();
        };
        debug!(
            account = %previous.account,
            chain_id = previous.chain_id,
            epoch = previous.epoch,
            "releasing derived data context"
        );
        self.block_number = Derived::Unknown;
        self.balance = Derived::Unknown;
        if let Some(guard) = self.pending_balance.take() {
            guard.mark_stale();
        }
        vec![TrackerCommand::UnsubscribeBlocks]
    }

    pub fn apply_block_number(&mut self, epoch: u64, result: Result<u64, PortError>) -> bool {
        if !self.is_current(epoch) {
            debug!(epoch, "discarding block number from previous context");
            return false;
        }
        match result {
            // A block notification may already have filled the value in.
            Ok(number) => match self.block_number {
                Derived::Ready(current) if current >= number => {
                    debug!(number, current, "block number fetch older than latest notification")
                }
                _ => self.block_number = Derived::Ready(number),
            },
            Err(err) if self.block_number.is_unknown() => {
                self.block_number = Derived::Failed(err.to_string())
            }
            Err(err) => debug!(%err, "block number fetch failed after a newer notification"),
        }
        true
    }

    /// Latest delivered notification wins; no reordering.
    pub fn on_new_block(&mut self, epoch: u64, number: u64) -> bool {
        if !self.is_current(epoch) {
            debug!(epoch, number, "discarding block notification from previous context");
            return false;
        }
        self.block_number = Derived::Ready(number);
        true
    }

    pub fn apply_balance(
        &mut self,
        request: &BalanceRequest,
        result: Result<U256, PortError>,
    ) -> bool {
        if request.is_stale() {
            debug!(
                account = %request.account,
                chain_id = request.chain_id,
                "discarding stale balance"
            );
            return false;
        }
        if self
            .pending_balance
            .as_ref()
            .is_some_and(|guard| guard.same_as(&request.guard))
        {
            self.pending_balance = None;
        }
        self.balance = match result {
            Ok(wei) => Derived::Ready(wei),
            Err(err) => Derived::Failed(err.to_string()),
        };
        true
    }

    fn begin_balance(&mut self, account: Address, chain_id: u64) -> BalanceRequest {
        if let Some(previous) = self.pending_balance.take() {
            previous.mark_stale();
        }
        let guard = StaleGuard::new();
        self.pending_balance = Some(guard.clone());
        BalanceRequest {
            account,
            chain_id,
            guard,
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.context.is_some_and(|ctx| ctx.epoch == epoch)
    }
}
