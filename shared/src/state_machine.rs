//! Connection State Machine
//!
//! Defines the connection lifecycle and the reconnect policy. The transition
//! function is pure: it takes the current machine and an event and returns the
//! next machine plus the effect the runtime has to carry out. Nothing here
//! touches sockets or timers.

use std::time::Duration;

use crate::defaults;

/// Reason used when the connection is closed on request
pub const STOPPED_REASON: &str = "stopped";

/// Reason used before the first start
pub const NOT_STARTED_REASON: &str = "not started";

/// Lifecycle state of the live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected { reason: String },
    Errored { message: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Disconnected or errored, i.e. no live link and no attempt in flight
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected { .. } | ConnectionState::Errored { .. }
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnected { reason } => write!(f, "Disconnected ({})", reason),
            ConnectionState::Errored { message } => write!(f, "Errored ({})", message),
        }
    }
}

/// Reconnect bounds plus the running attempt counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Reconnect attempts since the last successful connection
    pub attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(defaults::RECONNECT_DELAY_MS),
            Duration::from_millis(defaults::RECONNECT_DELAY_MAX_MS),
            defaults::RECONNECT_ATTEMPTS,
        )
    }
}

impl ReconnectPolicy {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Backoff for a given attempt count: `min(initial * 2^attempts, max)`
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts);
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    /// Delay before the next reconnect
    pub fn next_delay(&self) -> Duration {
        self.delay_for(self.attempts)
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Explicit start from the application
    Start,
    /// Transport reported the session as established
    Connected,
    /// Transport closed or could not be opened
    Disconnected { reason: String },
    /// Transport failed (timeout, I/O error, refused handshake)
    TransportError { message: String },
    /// Scheduled reconnect timer fired
    RetryDue,
    /// Explicit stop from the application
    Stop,
}

/// What the runtime has to do after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do
    None,
    /// Drop any pending retry and open a new transport
    Connect,
    /// Tear down the transport and arm the reconnect timer
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Tear down the transport; automatic retries are exhausted
    GiveUp,
    /// Tear down the transport and cancel any pending retry
    Close,
}

/// The connection state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMachine {
    state: ConnectionState,
    policy: ReconnectPolicy,
    /// Cleared by `Stop`, restored by `Start`
    auto_reconnect: bool,
    /// A reconnect timer is armed
    retry_pending: bool,
}

impl Default for LinkMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl LinkMachine {
    /// Create a machine that has not been started yet
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected {
                reason: NOT_STARTED_REASON.into(),
            },
            policy,
            auto_reconnect: true,
            retry_pending: false,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.policy.attempts
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Apply an event in place and return the effect
    pub fn process_event(&mut self, event: LinkEvent) -> Effect {
        let (next, effect) = transition(self, event);
        *self = next;
        effect
    }
}

/// Pure transition function
pub fn transition(machine: &LinkMachine, event: LinkEvent) -> (LinkMachine, Effect) {
    use ConnectionState::*;

    let mut next = machine.clone();

    let effect = match (&machine.state, event) {
        // A live or in-flight connection is never restarted
        (Connecting | Connected, LinkEvent::Start) => Effect::None,

        (_, LinkEvent::Start) => {
            next.state = Connecting;
            next.policy.reset();
            next.auto_reconnect = true;
            next.retry_pending = false;
            Effect::Connect
        }

        (Connecting, LinkEvent::Connected) => {
            next.state = Connected;
            next.policy.reset();
            Effect::None
        }

        (Connecting | Connected, LinkEvent::Disconnected { reason }) => {
            next.state = Disconnected { reason };
            schedule_retry(&mut next)
        }

        (Connecting | Connected, LinkEvent::TransportError { message }) => {
            next.state = Errored { message };
            schedule_retry(&mut next)
        }

        (Disconnected { .. } | Errored { .. }, LinkEvent::RetryDue) if machine.retry_pending => {
            next.state = Connecting;
            next.retry_pending = false;
            Effect::Connect
        }

        (_, LinkEvent::Stop) => {
            next.state = Disconnected {
                reason: STOPPED_REASON.into(),
            };
            next.auto_reconnect = false;
            next.retry_pending = false;
            Effect::Close
        }

        // Stale transport callbacks and timers
        _ => Effect::None,
    };

    (next, effect)
}

fn schedule_retry(machine: &mut LinkMachine) -> Effect {
    if !machine.auto_reconnect || !machine.policy.can_retry() {
        machine.retry_pending = false;
        return Effect::GiveUp;
    }

    let delay = machine.policy.next_delay();
    machine.policy.attempts += 1;
    machine.retry_pending = true;

    Effect::ScheduleReconnect {
        attempt: machine.policy.attempts,
        delay,
    }
}
