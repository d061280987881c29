use std::time::Duration;

use crate::feed::Status;

pub const CONNECTION_ERROR: &str = "Connection error. Please check your network connection.";
pub const RETRIES_EXHAUSTED: &str = "Failed to connect to server. Reconnect manually to retry.";

/// Delay before reconnect attempt `n` is `base * factor^n`, optionally capped.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_attempts: u32,
    pub max_delay: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            base: Duration::from_millis(1000),
            factor: 2,
            max_attempts: 5,
            max_delay: None,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self.base.checked_mul(multiplier).unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

/// What the owner of the socket has to do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
    Nothing,
}

/// Reconnection state machine. Holds no sockets or timers, it only decides.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    policy: BackoffPolicy,
    status: Status,
    attempt: u32,
    error: Option<String>,
}

impl Lifecycle {
    pub fn new(policy: BackoffPolicy) -> Lifecycle {
        Lifecycle {
            policy,
            status: Status::Disconnected,
            attempt: 0,
            error: None,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn start(&mut self) {
        if self.status == Status::Disconnected {
            self.status = Status::Connecting;
        }
    }

    pub fn on_open(&mut self) {
        if self.status == Status::Connecting {
            self.status = Status::Connected;
            self.attempt = 0;
            self.error = None;
        }
    }

    /// Transport errors only record the message, the close that follows drives the state.
    pub fn on_error(&mut self, message: &str) {
        if self.status != Status::TornDown {
            self.error = Some(message.to_string());
        }
    }

    pub fn on_close(&mut self) -> Action {
        match self.status {
            Status::Connecting | Status::Connected => {}
            _ => return Action::Nothing,
        }

        self.status = Status::Disconnected;
        if self.attempt < self.policy.max_attempts {
            self.attempt += 1;
            self.status = Status::Reconnecting;
            Action::Retry {
                attempt: self.attempt,
                delay: self.policy.delay_for(self.attempt),
            }
        } else {
            self.status = Status::Failed;
            self.error = Some(RETRIES_EXHAUSTED.to_string());
            Action::GiveUp
        }
    }

    pub fn on_retry_timer(&mut self) {
        if self.status == Status::Reconnecting {
            self.status = Status::Connecting;
        }
    }

    /// Manual reconnect. Keeps the attempt counter, only a successful open resets it.
    pub fn reconnect(&mut self) {
        if self.status != Status::TornDown {
            self.status = Status::Connecting;
        }
    }

    pub fn shutdown(&mut self) {
        self.status = Status::TornDown;
    }
}
