//! Client input: turning held directions into a movement intent
//!
//! Key polling belongs to whatever front end drives the client. It hands the
//! client an [`IntentSource`], polled once per frame; the headless sources in
//! this module cover the binary and the tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Vec2;

/// Directions held during one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    pub const IDLE: InputState = InputState {
        up: false,
        down: false,
        left: false,
        right: false,
    };

    pub const RIGHT: InputState = InputState {
        up: false,
        down: false,
        left: false,
        right: true,
    };

    /// Unit-length (or zero) direction; `+y` points down the arena
    pub fn direction(&self) -> Vec2 {
        let axis = |negative: bool, positive: bool| positive as i8 as f32 - negative as i8 as f32;
        Vec2::new(axis(self.left, self.right), axis(self.up, self.down)).normalize()
    }

    pub fn is_idle(&self) -> bool {
        self.direction() == Vec2::ZERO
    }
}

/// Produces the input for each frame
pub trait IntentSource: Send {
    fn poll(&mut self) -> InputState;
}

/// Never moves
#[derive(Debug, Default)]
pub struct IdleInput;

impl IntentSource for IdleInput {
    fn poll(&mut self) -> InputState {
        InputState::IDLE
    }
}

/// Random walk: holds a random direction for a random number of frames
#[derive(Debug)]
pub struct WanderInput {
    rng: StdRng,
    current: InputState,
    frames_left: u32,
    max_hold_frames: u32,
}

impl WanderInput {
    pub fn new(seed: Option<u64>, max_hold_frames: u32) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            current: InputState::IDLE,
            frames_left: 0,
            max_hold_frames: max_hold_frames.max(1),
        }
    }
}

impl IntentSource for WanderInput {
    fn poll(&mut self) -> InputState {
        if self.frames_left == 0 {
            self.current = InputState {
                up: self.rng.gen_bool(0.3),
                down: self.rng.gen_bool(0.3),
                left: self.rng.gen_bool(0.3),
                right: self.rng.gen_bool(0.3),
            };
            self.frames_left = self.rng.gen_range(1..=self.max_hold_frames);
        }
        self.frames_left -= 1;
        self.current
    }
}

/// Plays back a fixed list of `(frames, input)` steps, then stays idle
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    steps: Vec<(u32, InputState)>,
    step: usize,
    frames_in_step: u32,
}

impl ScriptedInput {
    pub fn new(steps: Vec<(u32, InputState)>) -> Self {
        Self {
            steps,
            step: 0,
            frames_in_step: 0,
        }
    }

    /// Holds one input forever
    pub fn constant(input: InputState) -> Self {
        Self::new(vec![(u32::MAX, input)])
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.steps.len()
    }
}

impl IntentSource for ScriptedInput {
    fn poll(&mut self) -> InputState {
        while let Some(&(frames, input)) = self.steps.get(self.step) {
            if self.frames_in_step < frames {
                self.frames_in_step += 1;
                return input;
            }
            self.step += 1;
            self.frames_in_step = 0;
        }
        InputState::IDLE
    }
}
