mod common;

use eth_wallet_core::{
    connection_transition, ActivationOrigin, ActivationRejected, ConnectError, ConnectionAction,
    ConnectionState, ConnectionStateMachine, ConnectionStatus, Connector,
};

use common::{account_a, account_b};

#[test]
fn connection_happy_path_transitions() {
    let (s1, _) = connection_transition(ConnectionStatus::Idle, ConnectionAction::Activate)
        .expect("idle -> activate");
    assert_eq!(s1, ConnectionStatus::Connecting);
    let (s2, _) = connection_transition(s1, ConnectionAction::Succeed).expect("connecting -> ok");
    assert_eq!(s2, ConnectionStatus::Connected);
    let (s3, _) = connection_transition(s2, ConnectionAction::Refresh).expect("refresh");
    assert_eq!(s3, ConnectionStatus::Connected);
    let (s4, _) = connection_transition(s3, ConnectionAction::Deactivate).expect("deactivate");
    assert_eq!(s4, ConnectionStatus::Disconnected);
    let (s5, _) = connection_transition(s4, ConnectionAction::Activate).expect("retry");
    assert_eq!(s5, ConnectionStatus::Connecting);
}

#[test]
fn connection_illegal_transition_is_rejected() {
    let err = connection_transition(ConnectionStatus::Idle, ConnectionAction::Succeed)
        .expect_err("must fail");
    assert!(err.to_string().contains("illegal connection transition"));
    let err = connection_transition(ConnectionStatus::Connected, ConnectionAction::Activate)
        .expect_err("must fail");
    assert_eq!(err.from, ConnectionStatus::Connected);
}

#[test]
fn error_state_can_retry_and_deactivate() {
    let (next, _) = connection_transition(ConnectionStatus::Error, ConnectionAction::Activate)
        .expect("error -> retry");
    assert_eq!(next, ConnectionStatus::Connecting);
    let (next, _) = connection_transition(ConnectionStatus::Error, ConnectionAction::Deactivate)
        .expect("error -> deactivate");
    assert_eq!(next, ConnectionStatus::Disconnected);
}

#[test]
fn second_activation_while_connecting_is_rejected() {
    let mut machine = ConnectionStateMachine::new();
    let (ticket, transition) = machine
        .begin_activate(Connector::Injected, ActivationOrigin::User)
        .expect("first activation");
    assert_eq!(transition.from, ConnectionState::Idle);
    assert!(machine.state().is_prompting());

    let rejected = machine
        .begin_activate(Connector::Injected, ActivationOrigin::User)
        .expect_err("second activation");
    assert_eq!(rejected, ActivationRejected::InFlight);
    assert!(machine.state().is_connecting());

    let done = machine
        .complete_activate(ticket, Ok((account_a(), 1)))
        .expect("first ticket settles");
    assert_eq!(done.to.context(), Some((account_a(), 1)));

    let rejected = machine
        .begin_activate(Connector::Injected, ActivationOrigin::User)
        .expect_err("already connected");
    assert_eq!(rejected, ActivationRejected::AlreadyConnected);
}

#[test]
fn deactivate_supersedes_in_flight_activation() {
    let mut machine = ConnectionStateMachine::new();
    let (ticket, _) = machine
        .begin_activate(Connector::Injected, ActivationOrigin::User)
        .expect("activate");
    let transition = machine.deactivate().expect("deactivate while connecting");
    assert_eq!(transition.to, ConnectionState::Disconnected);

    assert!(machine.complete_activate(ticket, Ok((account_a(), 1))).is_none());
    assert_eq!(machine.state(), &ConnectionState::Disconnected);
}

#[test]
fn deactivate_is_noop_when_idle_or_disconnected() {
    let mut machine = ConnectionStateMachine::new();
    assert!(machine.deactivate().is_none());
    let (ticket, _) = machine
        .begin_activate(Connector::Injected, ActivationOrigin::User)
        .expect("activate");
    machine.complete_activate(ticket, Ok((account_a(), 1)));
    assert!(machine.deactivate().is_some());
    assert!(machine.deactivate().is_none());
    assert_eq!(machine.state().account(), None);
    assert_eq!(machine.state().chain_id(), None);
}

#[test]
fn rejected_prompt_enters_error_and_retry_succeeds() {
    let mut machine = ConnectionStateMachine::new();
    let (ticket, _) = machine
        .begin_activate(Connector::Injected, ActivationOrigin::User)
        .expect("activate");
    let failed = machine
        .complete_activate(ticket, Err(ConnectError::UserRejected))
        .expect("failure transition");
    assert_eq!(
        failed.to,
        ConnectionState::Error {
            cause: ConnectError::UserRejected
        }
    );

    let (retry, _) = machine
        .begin_activate(Connector::Injected, ActivationOrigin::User)
        .expect("retry from error");
    let connected = machine
        .complete_activate(retry, Ok((account_a(), 1)))
        .expect("retry succeeds");
    assert!(connected.to.is_connected());
}

#[test]
fn chain_and_account_switch_stay_connected() {
    let mut machine = ConnectionStateMachine::new();
    let (ticket, _) = machine
        .begin_activate(Connector::Injected, ActivationOrigin::Eager)
        .expect("activate");
    assert!(!machine.state().is_prompting());
    machine.complete_activate(ticket, Ok((account_a(), 1)));

    assert!(machine.switch_chain(1).is_none());
    let switched = machine.switch_chain(137).expect("chain switch");
    assert_eq!(switched.reason, "refresh");
    assert_eq!(switched.to.context(), Some((account_a(), 137)));

    let switched = machine.switch_account(account_b()).expect("account switch");
    assert_eq!(switched.to.context(), Some((account_b(), 137)));
}

#[test]
fn switches_are_ignored_when_not_connected() {
    let mut machine = ConnectionStateMachine::new();
    assert!(machine.switch_chain(5).is_none());
    assert!(machine.switch_account(account_b()).is_none());
    assert_eq!(machine.state(), &ConnectionState::Idle);
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Activate,
    Succeed,
    Fail,
    Deactivate,
}

// Walk every sequence of four operations (with stale tickets kept around)
// and check the machine never leaves its single-state contract.
#[test]
fn arbitrary_sequences_keep_a_single_consistent_state() {
    let ops = [Op::Activate, Op::Succeed, Op::Fail, Op::Deactivate];
    let mut sequences: Vec<Vec<Op>> = vec![vec![]];
    for _ in 0..4 {
        sequences = sequences
            .into_iter()
            .flat_map(|seq| {
                ops.iter().map(move |op| {
                    let mut next = seq.clone();
                    next.push(*op);
                    next
                })
            })
            .collect();
    }

    for sequence in sequences {
        let mut machine = ConnectionStateMachine::new();
        let mut tickets = Vec::new();
        let mut last_sequence = 0;
        for op in &sequence {
            let transition = match op {
                Op::Activate => machine
                    .begin_activate(Connector::Injected, ActivationOrigin::User)
                    .ok()
                    .map(|(ticket, transition)| {
                        tickets.push(ticket);
                        transition
                    }),
                Op::Succeed => tickets
                    .first()
                    .copied()
                    .and_then(|t| machine.complete_activate(t, Ok((account_a(), 1)))),
                Op::Fail => tickets
                    .last()
                    .copied()
                    .and_then(|t| machine.complete_activate(t, Err(ConnectError::UserRejected))),
                Op::Deactivate => machine.deactivate(),
            };
            if let Some(transition) = transition {
                assert!(transition.sequence > last_sequence, "{sequence:?}");
                last_sequence = transition.sequence;
                assert_eq!(&transition.to, machine.state(), "{sequence:?}");
            }
            if let ConnectionState::Connected {
                account, chain_id, ..
            } = machine.state()
            {
                assert_eq!(*account, account_a());
                assert_eq!(*chain_id, 1);
            }
        }
    }
}

#[test]
fn connection_state_serializes_with_its_context() {
    let state = ConnectionState::Connected {
        account: account_a(),
        chain_id: 137,
        connector: Connector::Injected,
    };
    let value = serde_json::to_value(&state).expect("serialize");
    assert_eq!(value["Connected"]["chain_id"], 137);
    assert_eq!(value["Connected"]["connector"], "Injected");

    let error = ConnectionState::Error {
        cause: ConnectError::UserRejected,
    };
    let value = serde_json::to_value(&error).expect("serialize");
    assert_eq!(value["Error"]["cause"], "UserRejected");
}
