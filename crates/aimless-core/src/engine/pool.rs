use super::sampling::FrameOffset;
use crate::core::models::configuration::Configuration;
use crate::core::models::outcome::TrajectoryOutcome;
use crate::core::models::velocity::Velocities;
use rand::Rng;

/// A shooting point the acceptor judged accepted, kept for future perturbation.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedState {
    pub configuration: Configuration,
    pub velocities: Velocities,
    /// Frames at Δt and 2Δt along the forward trajectory.
    pub fwd_frames: [Configuration; 2],
    /// Frames at Δt and 2Δt along the reverse trajectory.
    pub rev_frames: [Configuration; 2],
}

impl AcceptedState {
    pub fn new(
        configuration: Configuration,
        velocities: Velocities,
        fwd: &TrajectoryOutcome,
        rev: &TrajectoryOutcome,
    ) -> Self {
        Self {
            configuration,
            velocities,
            fwd_frames: fwd.frames.clone(),
            rev_frames: rev.frames.clone(),
        }
    }

    /// Returns the configuration `offset` steps of Δt away from the accepted point.
    pub fn frame_at(&self, offset: FrameOffset) -> &Configuration {
        match offset {
            FrameOffset::MinusTwo => &self.rev_frames[1],
            FrameOffset::MinusOne => &self.rev_frames[0],
            FrameOffset::Zero => &self.configuration,
            FrameOffset::PlusOne => &self.fwd_frames[0],
            FrameOffset::PlusTwo => &self.fwd_frames[1],
        }
    }
}

/// The accepted states owned by one worker. It only ever grows.
#[derive(Debug, Default, Clone)]
pub struct AcceptedPool {
    states: Vec<AcceptedState>,
}

impl AcceptedPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: AcceptedState) {
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[AcceptedState] {
        &self.states
    }

    /// Picks a stored state and an offset uniformly, returning the perturbed base.
    ///
    /// An offset of zero returns the stored point itself, so a base may repeat.
    pub fn perturb(&self, rng: &mut impl Rng) -> Option<(Configuration, FrameOffset)> {
        if self.states.is_empty() {
            return None;
        }
        let state = &self.states[rng.gen_range(0..self.states.len())];
        let offset = FrameOffset::choose(rng);
        Some((state.frame_at(offset).clone(), offset))
    }
}
