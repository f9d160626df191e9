use alloy::primitives::Address;

use crate::domain::ProviderEvent;
use crate::eager::EagerConnectPolicy;
use crate::ports::SubscriptionId;
use crate::state_machine::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileCommand {
    Activate,
    Deactivate,
    SwitchChain(u64),
    SwitchAccount(Address),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAction {
    Subscribe,
    Unsubscribe(SubscriptionId),
    Keep,
}

/// Turns provider-level events into state machine commands.
///
/// Holds at most one event subscription. The owner asks `plan` after every
/// state change and applies the returned action so no listener outlives
/// the period it is allowed to run in.
#[derive(Debug, Default)]
pub struct EventReconciler {
    listener: Option<SubscriptionId>,
}

impl EventReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quiet while an eager attempt or any activation is in flight.
    pub fn is_suppressed(eager: &EagerConnectPolicy, state: &ConnectionState) -> bool {
        eager.in_flight() || state.is_connecting()
    }

    pub fn plan(&self, suppressed: bool) -> ListenerAction {
        match (suppressed, self.listener) {
            (true, Some(id)) => ListenerAction::Unsubscribe(id),
            (false, None) => ListenerAction::Subscribe,
            _ => ListenerAction::Keep,
        }
    }

    pub fn attach(&mut self, id: SubscriptionId) {
        self.listener = Some(id);
    }

    pub fn detach(&mut self) -> Option<SubscriptionId> {
        self.listener.take()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn listener(&self) -> Option<SubscriptionId> {
        self.listener
    }

    pub fn reconcile(
        &self,
        event: &ProviderEvent,
        state: &ConnectionState,
    ) -> Option<ReconcileCommand> {
        if let Some((account, chain_id)) = state.context() {
            return match event {
                ProviderEvent::Connect { .. } => None,
                ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                    None => Some(ReconcileCommand::Deactivate),
                    Some(first) if *first != account => {
                        Some(ReconcileCommand::SwitchAccount(*first))
                    }
                    Some(_) => None,
                },
                ProviderEvent::ChainChanged(next) if *next != chain_id => {
                    Some(ReconcileCommand::SwitchChain(*next))
                }
                ProviderEvent::ChainChanged(_) => None,
                ProviderEvent::Disconnect => Some(ReconcileCommand::Deactivate),
            };
        }

        if state.is_connecting() {
            return None;
        }

        let errored = state.error().is_some();
        match event {
            ProviderEvent::Connect { .. } | ProviderEvent::ChainChanged(_) => {
                Some(ReconcileCommand::Activate)
            }
            ProviderEvent::AccountsChanged(accounts) if !accounts.is_empty() => {
                Some(ReconcileCommand::Activate)
            }
            ProviderEvent::AccountsChanged(_) | ProviderEvent::Disconnect if errored => {
                Some(ReconcileCommand::Deactivate)
            }
            ProviderEvent::AccountsChanged(_) | ProviderEvent::Disconnect => None,
        }
    }
}
