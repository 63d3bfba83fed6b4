//! Retry policy around shooting attempts, kept free of I/O so every transition
//! can be exercised directly.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// `n_state_tries` reselections in a row ended without an acceptance.
    RetriesExhausted,
    /// Every kickstart seed used up its velocity draws without an acceptance.
    NoInitialAcceptance,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::RetriesExhausted => write!(f, "state retries exhausted"),
            FailureReason::NoInitialAcceptance => write!(f, "no seed configuration was accepted"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShootingState {
    SelectBase,
    GenerateVelocity,
    RunAttempt,
    Accepted,
    RetryVelocity,
    ReselectState,
    Done,
    Failed(FailureReason),
}

impl ShootingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShootingState::Done | ShootingState::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub n_points: usize,
    pub n_vel_tries: usize,
    pub n_state_tries: usize,
}

/// Walks one worker through the shooting states and owns its retry counters.
///
/// Until the first acceptance the machine is kickstarting: bases come from the
/// seed list in order, and moving on to the next seed does not count as a state
/// retry. Once anything has been accepted, bases come from the accepted pool and
/// every exhausted base costs one state retry.
#[derive(Debug, Clone)]
pub struct StateMachine {
    policy: RetryPolicy,
    state: ShootingState,
    vel_tries: usize,
    state_tries: usize,
    accepted: usize,
    seed_cursor: Option<usize>,
    n_seeds: usize,
}

impl StateMachine {
    /// `already_accepted` credits acceptances found in a resumed log toward `n_points`.
    pub fn new(policy: RetryPolicy, n_seeds: usize, already_accepted: usize) -> Self {
        let state = if already_accepted >= policy.n_points {
            ShootingState::Done
        } else if n_seeds == 0 {
            ShootingState::Failed(FailureReason::NoInitialAcceptance)
        } else {
            ShootingState::SelectBase
        };
        Self {
            policy,
            state,
            vel_tries: 0,
            state_tries: 0,
            accepted: already_accepted,
            seed_cursor: Some(0),
            n_seeds,
        }
    }

    pub fn state(&self) -> ShootingState {
        self.state
    }

    pub fn vel_tries(&self) -> usize {
        self.vel_tries
    }

    pub fn state_tries(&self) -> usize {
        self.state_tries
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Index of the seed to use as the next base while kickstarting.
    pub fn seed_cursor(&self) -> Option<usize> {
        self.seed_cursor
    }

    pub fn is_kickstarting(&self) -> bool {
        self.seed_cursor.is_some()
    }

    /// Feeds the acceptor verdict of the attempt just run.
    pub fn record_attempt(&mut self, accepted: bool) -> ShootingState {
        debug_assert_eq!(self.state, ShootingState::RunAttempt);
        self.state = if accepted {
            self.accepted += 1;
            self.vel_tries = 0;
            self.state_tries = 0;
            self.seed_cursor = None;
            ShootingState::Accepted
        } else {
            self.vel_tries += 1;
            if self.vel_tries < self.policy.n_vel_tries {
                ShootingState::RetryVelocity
            } else {
                self.vel_tries = 0;
                if !self.is_kickstarting() {
                    self.state_tries += 1;
                }
                ShootingState::ReselectState
            }
        };
        self.state
    }

    /// Moves to the next state that needs work from the caller.
    ///
    /// `RunAttempt` only leaves through [`StateMachine::record_attempt`]; terminal
    /// states never change.
    pub fn advance(&mut self) -> ShootingState {
        self.state = match self.state {
            ShootingState::SelectBase => ShootingState::GenerateVelocity,
            ShootingState::GenerateVelocity => ShootingState::RunAttempt,
            ShootingState::RetryVelocity => ShootingState::GenerateVelocity,
            ShootingState::Accepted if self.accepted >= self.policy.n_points => {
                ShootingState::Done
            }
            ShootingState::Accepted => ShootingState::SelectBase,
            ShootingState::ReselectState => match self.seed_cursor {
                Some(cursor) if cursor + 1 < self.n_seeds => {
                    self.seed_cursor = Some(cursor + 1);
                    ShootingState::SelectBase
                }
                Some(_) => ShootingState::Failed(FailureReason::NoInitialAcceptance),
                None if self.state_tries >= self.policy.n_state_tries => {
                    ShootingState::Failed(FailureReason::RetriesExhausted)
                }
                None => ShootingState::SelectBase,
            },
            other => other,
        };
        self.state
    }
}
