pub mod display;
pub mod domain;
pub mod eager;
pub mod ports;
pub mod reconciler;
pub mod session;
pub mod state_machine;
pub mod tracker;

pub use display::{StatusLight, WalletView};
pub use domain::{
    ActivationOrigin, ConnectError, Connector, Derived, ProviderEvent, ProviderEventKind,
};
pub use eager::{EagerConnectPolicy, EagerPhase};
pub use ports::{PortError, ProviderGateway, Subscription, SubscriptionId};
pub use reconciler::{EventReconciler, ListenerAction, ReconcileCommand};
pub use session::{
    SessionClosed, SessionCommand, SessionConfig, SessionHandle, SessionSnapshot, WalletSession,
};
pub use state_machine::{
    connection_transition, ActivationRejected, ActivationTicket, ConnectionAction,
    ConnectionState, ConnectionStateMachine, ConnectionStatus, StateTransition, TransitionError,
};
pub use tracker::{BalanceRequest, DerivedDataTracker, StaleGuard, TrackedContext, TrackerCommand};
