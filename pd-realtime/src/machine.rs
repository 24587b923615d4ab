//! Connection state machine.
//!
//! Pure and synchronous: every [`Input`] runs to completion and returns the
//! [`Action`]s the driver must perform. The machine never touches a socket
//! or a clock, which keeps every transition testable without IO.

use std::time::Duration;

use tracing::{debug, warn};

use crate::backoff::ReconnectConfig;
use crate::events::ConnectionState;

/// Identifies one scheduled timer. Firings with a stale id are ignored.
pub type TimerId = u64;

/// What a pending timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Start the next connection attempt.
    Reconnect,
    /// Give up waiting for `authAck`.
    AuthTimeout,
}

/// Everything that can happen to a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Connect,
    TransportOpen,
    TransportError(String),
    TransportClosed { code: u16, reason: String },
    AuthAck,
    AuthError(String),
    TimerFired(TimerId),
    Unbind,
}

impl Input {
    fn label(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::TransportOpen => "transportOpen",
            Self::TransportError(_) => "transportError",
            Self::TransportClosed { .. } => "transportClosed",
            Self::AuthAck => "authAck",
            Self::AuthError(_) => "authError",
            Self::TimerFired(_) => "timerFired",
            Self::Unbind => "unbind",
        }
    }
}

/// Side effects requested by the machine, executed in order by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenTransport,
    SendAuth,
    CloseTransport,
    ScheduleTimer {
        id: TimerId,
        kind: TimerKind,
        delay: Duration,
    },
    CancelTimer {
        id: TimerId,
    },
    Publish(ConnectionState),
    ReportAuthRejected {
        reason: String,
        consecutive: u32,
    },
}

/// Tunables for one machine.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub backoff: ReconnectConfig,
    pub auth_timeout: Duration,
    pub auth_failure_threshold: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            backoff: ReconnectConfig::default(),
            auth_timeout: Duration::from_millis(pd_core::constants::AUTH_TIMEOUT_MS),
            auth_failure_threshold: pd_core::constants::AUTH_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTimer {
    id: TimerId,
    kind: TimerKind,
}

/// Connection lifecycle for one bound identity.
#[derive(Debug)]
pub struct ConnectionMachine {
    config: MachineConfig,
    state: ConnectionState,
    attempt: u32,
    auth_failures: u32,
    pending: Option<PendingTimer>,
    next_timer_id: TimerId,
}

impl ConnectionMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            attempt: 0,
            auth_failures: 0,
            pending: None,
            next_timer_id: 1,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful auth.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The single pending timer, if any.
    pub fn pending_timer(&self) -> Option<(TimerId, TimerKind)> {
        self.pending.map(|p| (p.id, p.kind))
    }

    /// Feed one input and collect the resulting actions.
    pub fn handle(&mut self, input: Input) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.state == ConnectionState::Closed {
            debug!("machine closed, ignoring {}", input.label());
            return actions;
        }

        match (self.state, input) {
            (_, Input::Unbind) => {
                self.cancel_timer(&mut actions);
                actions.push(Action::CloseTransport);
                self.transition(ConnectionState::Closed, &mut actions);
            }

            (ConnectionState::Disconnected, Input::Connect) => {
                self.transition(ConnectionState::Connecting, &mut actions);
                actions.push(Action::OpenTransport);
            }

            (ConnectionState::Connecting, Input::TransportOpen) => {
                self.transition(ConnectionState::Authenticating, &mut actions);
                actions.push(Action::SendAuth);
                self.schedule_timer(TimerKind::AuthTimeout, self.config.auth_timeout, &mut actions);
            }

            (
                ConnectionState::Connecting
                | ConnectionState::Authenticating
                | ConnectionState::Connected,
                Input::TransportError(reason),
            ) => {
                warn!("transport error in {}: {reason}", self.state);
                self.fail(&mut actions);
            }

            (
                ConnectionState::Connecting
                | ConnectionState::Authenticating
                | ConnectionState::Connected,
                Input::TransportClosed { code, reason },
            ) => {
                debug!("transport closed in {} (code {code}): {reason}", self.state);
                self.fail(&mut actions);
            }

            (ConnectionState::Authenticating, Input::AuthAck) => {
                self.cancel_timer(&mut actions);
                self.attempt = 0;
                self.auth_failures = 0;
                self.transition(ConnectionState::Connected, &mut actions);
            }

            (ConnectionState::Authenticating, Input::AuthError(reason)) => {
                self.auth_failures += 1;
                warn!("auth rejected ({} consecutive): {reason}", self.auth_failures);
                if self.auth_failures >= self.config.auth_failure_threshold {
                    actions.push(Action::ReportAuthRejected {
                        reason,
                        consecutive: self.auth_failures,
                    });
                }
                self.fail(&mut actions);
            }

            (state, Input::TimerFired(id)) => {
                let Some(pending) = self.pending.filter(|p| p.id == id) else {
                    debug!("ignoring stale timer {id}");
                    return actions;
                };
                self.pending = None;

                match (state, pending.kind) {
                    (ConnectionState::Reconnecting { .. }, TimerKind::Reconnect) => {
                        self.transition(ConnectionState::Connecting, &mut actions);
                        actions.push(Action::OpenTransport);
                    }
                    (ConnectionState::Authenticating, TimerKind::AuthTimeout) => {
                        warn!("no authAck within {:?}", self.config.auth_timeout);
                        self.fail(&mut actions);
                    }
                    (state, kind) => {
                        debug!("timer {kind:?} fired in {state}, ignoring");
                    }
                }
            }

            (state, input) => {
                debug!("ignoring {} in {state}", input.label());
            }
        }

        actions
    }

    /// Give up on the current connection and schedule the next attempt.
    fn fail(&mut self, actions: &mut Vec<Action>) {
        actions.push(Action::CloseTransport);
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.config.backoff.delay_for(self.attempt);
        self.schedule_timer(TimerKind::Reconnect, delay, actions);
        self.transition(
            ConnectionState::Reconnecting {
                attempt: self.attempt,
                delay,
            },
            actions,
        );
    }

    fn schedule_timer(&mut self, kind: TimerKind, delay: Duration, actions: &mut Vec<Action>) {
        self.cancel_timer(actions);
        let id = self.next_timer_id;
        self.next_timer_id += 1;
        self.pending = Some(PendingTimer { id, kind });
        actions.push(Action::ScheduleTimer { id, kind, delay });
    }

    fn cancel_timer(&mut self, actions: &mut Vec<Action>) {
        if let Some(pending) = self.pending.take() {
            actions.push(Action::CancelTimer { id: pending.id });
        }
    }

    fn transition(&mut self, next: ConnectionState, actions: &mut Vec<Action>) {
        if self.state != next {
            debug!("connection state: {} -> {}", self.state, next);
            self.state = next;
            actions.push(Action::Publish(next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ConnectionMachine {
        ConnectionMachine::new(MachineConfig {
            backoff: ReconnectConfig::default().without_jitter(),
            auth_timeout: Duration::from_secs(10),
            auth_failure_threshold: 2,
        })
    }

    fn scheduled(actions: &[Action]) -> Option<(TimerId, TimerKind, Duration)> {
        actions.iter().find_map(|a| match a {
            Action::ScheduleTimer { id, kind, delay } => Some((*id, *kind, *delay)),
            _ => None,
        })
    }

    fn closed() -> Input {
        Input::TransportClosed { code: 1006, reason: "gone".into() }
    }

    /// Drive a fresh machine to `Authenticating`.
    fn authenticating() -> ConnectionMachine {
        let mut m = machine();
        m.handle(Input::Connect);
        m.handle(Input::TransportOpen);
        m
    }

    #[test]
    fn test_happy_path() {
        let mut m = machine();
        assert_eq!(
            m.handle(Input::Connect),
            vec![Action::Publish(ConnectionState::Connecting), Action::OpenTransport]
        );

        let actions = m.handle(Input::TransportOpen);
        assert_eq!(actions[0], Action::Publish(ConnectionState::Authenticating));
        assert_eq!(actions[1], Action::SendAuth);
        let (_, kind, delay) = scheduled(&actions).unwrap();
        assert_eq!(kind, TimerKind::AuthTimeout);
        assert_eq!(delay, Duration::from_secs(10));

        let actions = m.handle(Input::AuthAck);
        assert!(matches!(actions[0], Action::CancelTimer { .. }));
        assert_eq!(actions[1], Action::Publish(ConnectionState::Connected));
        assert!(m.pending_timer().is_none());
        assert!(m.state().is_connected());
    }

    #[test]
    fn test_three_closes_give_increasing_delays() {
        let mut m = machine();
        m.handle(Input::Connect);

        let mut last_delay = Duration::ZERO;
        let mut last_id = None;
        for expected_attempt in 1..=3 {
            let actions = m.handle(closed());
            let (id, kind, delay) = scheduled(&actions).unwrap();
            assert_eq!(kind, TimerKind::Reconnect);
            assert!(delay > last_delay);
            assert_eq!(m.attempt(), expected_attempt);
            assert_eq!(
                m.state(),
                ConnectionState::Reconnecting { attempt: expected_attempt, delay }
            );
            last_delay = delay;

            let fired = m.handle(Input::TimerFired(id));
            assert_eq!(fired[1], Action::OpenTransport);
            if let Some(prev) = last_id {
                assert_ne!(prev, id);
            }
            last_id = Some(id);
        }
    }

    #[test]
    fn test_cancel_precedes_schedule() {
        let mut m = authenticating();
        let (auth_timer, _) = m.pending_timer().unwrap();

        let actions = m.handle(closed());
        let cancel = actions
            .iter()
            .position(|a| *a == Action::CancelTimer { id: auth_timer })
            .unwrap();
        let schedule = actions
            .iter()
            .position(|a| matches!(a, Action::ScheduleTimer { .. }))
            .unwrap();
        assert!(cancel < schedule);
        assert_eq!(m.pending_timer().unwrap().1, TimerKind::Reconnect);
    }

    #[test]
    fn test_attempt_resets_on_connected() {
        let mut m = machine();
        m.handle(Input::Connect);
        for _ in 0..2 {
            let (id, _, _) = scheduled(&m.handle(closed())).unwrap();
            m.handle(Input::TimerFired(id));
        }
        assert_eq!(m.attempt(), 2);

        m.handle(Input::TransportOpen);
        m.handle(Input::AuthAck);
        assert_eq!(m.attempt(), 0);

        let (_, _, delay) = scheduled(&m.handle(closed())).unwrap();
        assert_eq!(delay, Duration::from_secs(1));
    }

    #[test]
    fn test_stale_timer_ignored() {
        let mut m = authenticating();
        let (auth_timer, _) = m.pending_timer().unwrap();
        m.handle(Input::AuthAck);

        assert!(m.handle(Input::TimerFired(auth_timer)).is_empty());
        assert!(m.state().is_connected());
    }

    #[test]
    fn test_auth_timeout_reconnects() {
        let mut m = authenticating();
        let (id, _) = m.pending_timer().unwrap();
        let actions = m.handle(Input::TimerFired(id));
        assert_eq!(actions[0], Action::CloseTransport);
        assert!(matches!(m.state(), ConnectionState::Reconnecting { attempt: 1, .. }));
    }

    #[test]
    fn test_auth_rejection_threshold() {
        let mut m = authenticating();
        let actions = m.handle(Input::AuthError("bad token".into()));
        assert!(!actions.iter().any(|a| matches!(a, Action::ReportAuthRejected { .. })));
        assert!(actions.contains(&Action::CloseTransport));

        let (id, _) = m.pending_timer().unwrap();
        m.handle(Input::TimerFired(id));
        m.handle(Input::TransportOpen);
        let actions = m.handle(Input::AuthError("bad token".into()));
        assert!(actions.contains(&Action::ReportAuthRejected {
            reason: "bad token".into(),
            consecutive: 2,
        }));
    }

    #[test]
    fn test_irrelevant_inputs_ignored() {
        let mut m = authenticating();
        m.handle(Input::AuthAck);
        assert!(m.handle(Input::AuthAck).is_empty());
        assert!(m.handle(Input::TransportOpen).is_empty());
        assert!(m.handle(Input::Connect).is_empty());

        m.handle(closed());
        assert!(m.handle(closed()).is_empty());
        assert!(m.handle(Input::TransportError("late".into())).is_empty());
    }

    #[test]
    fn test_unbind_is_terminal() {
        let mut m = machine();
        m.handle(Input::Connect);
        let (id, _, _) = scheduled(&m.handle(closed())).unwrap();

        let actions = m.handle(Input::Unbind);
        assert_eq!(
            actions,
            vec![
                Action::CancelTimer { id },
                Action::CloseTransport,
                Action::Publish(ConnectionState::Closed),
            ]
        );
        assert!(m.pending_timer().is_none());
        assert!(m.handle(Input::TimerFired(id)).is_empty());
        assert!(m.handle(Input::Connect).is_empty());
        assert!(m.handle(Input::Unbind).is_empty());
    }
}
