//! Input Capture and Validation
//!
//! Converts inbound client input frames into validated movement intent, enforcing
//! sequence-staleness, clock-tolerance, and speed-magnitude rules before a frame is
//! allowed to affect the simulation.

use serde::{Serialize, Deserialize};
use crate::core::fixed::{Fixed, fixed_mul, to_fixed, BASE_SPEED};
use crate::core::vec2::FixedVec2;
use crate::game::state::PlayerId;

/// Allowed drift between a client's reported tick and the server's current tick before
/// an input frame is rejected as out of tolerance.
pub const INPUT_TIME_TOLERANCE: u64 = 6;

/// Slack multiplier applied to BASE_SPEED when validating claimed input velocity.
pub const SPEED_SLACK_MULT: Fixed = 72090; // 1.10 * 65536

/// Maximum validated input frames drained into the simulation for one player in one tick.
/// Excess queued frames beyond this are dropped without being rejected as invalid.
pub const MAX_INPUTS_PER_TICK: usize = 4;

/// Per-session input message budget (messages/second).
pub const INPUT_RATE_LIMIT: u32 = 60;

/// Per-session fire message budget (messages/second).
pub const FIRE_RATE_LIMIT: u32 = 20;

/// Reason a raw input frame was rejected before it ever reached the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRejection {
    /// `seq` was not greater than the player's `last_accepted_seq`.
    StaleSequence,
    /// `|client_tick - server_tick|` exceeded [`INPUT_TIME_TOLERANCE`].
    ClockOutOfTolerance,
    /// Claimed velocity magnitude exceeded `BASE_SPEED * SPEED_SLACK_MULT`.
    VelocityTooFast,
}

/// One raw movement intent frame as received from a client, prior to validation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct InputFrame {
    /// Monotonic per-session sequence number.
    pub seq: u32,
    /// Tick the client believes is current, used for clock-tolerance checks.
    pub client_tick: u64,
    /// Claimed velocity.
    pub intended_velocity: FixedVec2,
    /// Claimed facing angle, fixed-point radians.
    pub facing: Fixed,
}

impl InputFrame {
    /// Validate this frame against a player's prior accepted state and the server clock.
    /// Returns the frame unchanged on success; the caller is responsible for clamping the
    /// accepted velocity again after collision resolution.
    pub fn validate(
        &self,
        last_accepted_seq: u32,
        server_tick: u64,
    ) -> Result<(), InputRejection> {
        if self.seq <= last_accepted_seq {
            return Err(InputRejection::StaleSequence);
        }

        let drift = if self.client_tick > server_tick {
            self.client_tick - server_tick
        } else {
            server_tick - self.client_tick
        };
        if drift > INPUT_TIME_TOLERANCE {
            return Err(InputRejection::ClockOutOfTolerance);
        }

        let max_speed = fixed_mul(BASE_SPEED, SPEED_SLACK_MULT);
        if self.intended_velocity.length_squared() > fixed_mul(max_speed, max_speed) {
            return Err(InputRejection::VelocityTooFast);
        }

        Ok(())
    }
}

/// A fire request as received from a client.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FireRequest {
    /// Monotonic per-session sequence number (shared sequence space with [`InputFrame`]).
    pub seq: u32,
    /// Tick the client believes is current.
    pub client_tick: u64,
    /// Aim angle, fixed-point radians.
    pub aim_angle: Fixed,
}

/// Bounded per-player queue of validated input frames awaiting the next tick.
///
/// The transport layer pushes onto this after validation; the tick loop drains up to
/// [`MAX_INPUTS_PER_TICK`] per player per tick, oldest first.
#[derive(Clone, Debug, Default)]
pub struct PlayerInputQueue {
    frames: std::collections::VecDeque<InputFrame>,
}

impl PlayerInputQueue {
    /// Construct an empty queue.
    pub fn new() -> Self {
        Self { frames: std::collections::VecDeque::new() }
    }

    /// Push a validated frame.
    pub fn push(&mut self, frame: InputFrame) {
        self.frames.push_back(frame);
    }

    /// Drain up to [`MAX_INPUTS_PER_TICK`] frames, oldest first. Remaining queued frames
    /// are kept for the next tick rather than being treated as invalid.
    pub fn drain_for_tick(&mut self) -> Vec<InputFrame> {
        let take = self.frames.len().min(MAX_INPUTS_PER_TICK);
        self.frames.drain(..take).collect()
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Recording of one player's accepted inputs across a match, used for the
/// replay-determinism test harness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerInputLog {
    /// Player identifier.
    pub player_id: PlayerId,
    /// Match identifier.
    pub match_id: [u8; 16],
    /// RNG seed used for this match.
    pub rng_seed: u64,
    /// Accepted frames, in acceptance order.
    entries: Vec<(u64, InputFrame)>,
}

impl PlayerInputLog {
    /// Create a new, empty log.
    pub fn new(player_id: PlayerId, match_id: [u8; 16], rng_seed: u64) -> Self {
        Self { player_id, match_id, rng_seed, entries: Vec::new() }
    }

    /// Record a frame accepted at `tick`.
    pub fn record(&mut self, tick: u64, frame: InputFrame) {
        self.entries.push((tick, frame));
    }

    /// All recorded entries, in acceptance order.
    pub fn entries(&self) -> &[(u64, InputFrame)] {
        &self.entries
    }
}

/// Clamp a claimed facing angle into `[0, 2*pi)` fixed-point radians.
pub fn normalize_facing(angle: Fixed) -> Fixed {
    let two_pi = to_fixed(2.0 * std::f64::consts::PI);
    let mut a = angle % two_pi;
    if a < 0 {
        a += two_pi;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u32, client_tick: u64, vx: Fixed, vy: Fixed) -> InputFrame {
        InputFrame { seq, client_tick, intended_velocity: FixedVec2::new(vx, vy), facing: 0 }
    }

    #[test]
    fn rejects_stale_sequence() {
        let f = frame(5, 100, 0, 0);
        assert_eq!(f.validate(5, 100), Err(InputRejection::StaleSequence));
        assert_eq!(f.validate(6, 100), Err(InputRejection::StaleSequence));
        assert!(f.validate(4, 100).is_ok());
    }

    #[test]
    fn rejects_clock_drift_beyond_tolerance() {
        let f = frame(1, 100, 0, 0);
        assert!(f.validate(0, 100 + INPUT_TIME_TOLERANCE).is_ok());
        assert_eq!(
            f.validate(0, 100 + INPUT_TIME_TOLERANCE + 1),
            Err(InputRejection::ClockOutOfTolerance)
        );
    }

    #[test]
    fn rejects_velocity_over_slack_bound() {
        let max_speed = fixed_mul(BASE_SPEED, SPEED_SLACK_MULT);
        let ok = frame(1, 100, max_speed, 0);
        assert!(ok.validate(0, 100).is_ok());

        let too_fast = frame(1, 100, max_speed + 1, 0);
        assert_eq!(too_fast.validate(0, 100), Err(InputRejection::VelocityTooFast));
    }

    #[test]
    fn queue_drains_oldest_first_bounded() {
        let mut q = PlayerInputQueue::new();
        for i in 0..6u32 {
            q.push(frame(i, 0, 0, 0));
        }
        let drained = q.drain_for_tick();
        assert_eq!(drained.len(), MAX_INPUTS_PER_TICK);
        assert_eq!(drained[0].seq, 0);
        assert_eq!(drained[3].seq, 3);
        assert_eq!(q.len(), 2);
    }
}
