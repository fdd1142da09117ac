//! Idle and speech-time eye motion.
//!
//! A randomized mode machine picks fixation targets; each target is reached with a
//! three-phase saccade (overshoot, correction, micro-correction). All randomness comes
//! from the injected [`Rng`] so a seeded generator replays exactly.

use crate::command::Axis;
use crate::command_queue::CommandQueue;
use crate::config::EyeConfig;
use crate::constants::PRIORITY_MOTION;
use crate::speech::SpeechState;
use crate::utils::safe_cast::angle_to_degrees;
use crate::worker::Shutdown;
use log::debug;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Idle gaze behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaccadeMode {
    /// Big jumps across the full range
    Scanning,
    /// Small jumps around a focus point
    Examining,
    /// Tiny drift around a focus point
    Staring,
}

impl SaccadeMode {
    pub const ALL: [Self; 3] = [Self::Scanning, Self::Examining, Self::Staring];

    /// Dwell time range between saccades, in seconds
    #[must_use]
    pub const fn dwell_range(self) -> (f64, f64) {
        match self {
            Self::Scanning => (0.3, 0.8),
            Self::Examining => (0.8, 2.0),
            Self::Staring => (2.0, 5.0),
        }
    }

    /// Offset allowed around the focus point; `None` means the whole range
    #[must_use]
    pub const fn focus_spread(self) -> Option<i32> {
        match self {
            Self::Scanning => None,
            Self::Examining => Some(15),
            Self::Staring => Some(5),
        }
    }
}

impl fmt::Display for SaccadeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scanning => "scanning",
            Self::Examining => "examining",
            Self::Staring => "staring",
        };
        f.write_str(name)
    }
}

/// Eye-space point: horizontal eye angle and vertical (z) angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazePoint {
    pub h: f64,
    pub v: f64,
}

/// One planned saccade: three positions separated by two short delays
#[derive(Debug, Clone, PartialEq)]
pub struct Saccade {
    pub target: GazePoint,
    /// Overshoot, correction, micro-correction
    pub phases: [GazePoint; 3],
    pub delays: [Duration; 2],
}

const MODE_HOLD_SECS: (f64, f64) = (5.0, 15.0);
const SPEAKING_INTERVAL_SECS: (f64, f64) = (2.0, 5.0);
const LOOK_AT_USER_PROBABILITY: f64 = 0.7;
const FOCUS_MARGIN: f64 = 20.0;
const OVERSHOOT: (f64, f64) = (1.0, 2.0);
const CORRECTION: (f64, f64) = (0.5, 1.0);
const MICRO_CORRECTION: (f64, f64) = (0.1, 0.2);
const PHASE_DELAY_SECS: (f64, f64) = (0.02, 0.04);

/// Saccade planner. Time is passed in, so the generator itself never sleeps.
pub struct SaccadeGenerator<R: Rng> {
    eyes: EyeConfig,
    rng: R,
    mode: SaccadeMode,
    focus: GazePoint,
    mode_since: Instant,
    mode_hold: Duration,
    last_saccade: Instant,
    interval: Duration,
    interval_for_speech: bool,
}

impl<R: Rng> SaccadeGenerator<R> {
    /// Start scanning around the eye midpoint at time `now`
    pub fn new(eyes: &EyeConfig, mut rng: R, now: Instant) -> Self {
        let mode = SaccadeMode::Scanning;
        let mode_hold = uniform_duration(&mut rng, MODE_HOLD_SECS);
        let interval = uniform_duration(&mut rng, mode.dwell_range());
        Self {
            eyes: eyes.clone(),
            rng,
            mode,
            focus: GazePoint {
                h: eyes.h_mid,
                v: eyes.v_mid,
            },
            mode_since: now,
            mode_hold,
            last_saccade: now,
            interval,
            interval_for_speech: false,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> SaccadeMode {
        self.mode
    }

    #[must_use]
    pub const fn focus(&self) -> GazePoint {
        self.focus
    }

    /// Advance the mode machine to `now` and return a saccade if one is due
    pub fn poll(&mut self, now: Instant, speaking: bool) -> Option<Saccade> {
        if now.saturating_duration_since(self.mode_since) > self.mode_hold {
            self.change_mode(now);
        }

        if speaking != self.interval_for_speech {
            self.interval_for_speech = speaking;
            self.interval = self.draw_interval(speaking);
        }

        if now.saturating_duration_since(self.last_saccade) <= self.interval {
            return None;
        }

        let target = if speaking {
            self.speaking_target()
        } else {
            self.idle_target()
        };
        self.last_saccade = now;
        self.interval = self.draw_interval(speaking);
        Some(self.plan(target))
    }

    /// Build the three phases for reaching `target`
    pub fn plan(&mut self, target: GazePoint) -> Saccade {
        let phases = [OVERSHOOT, CORRECTION, MICRO_CORRECTION].map(|range| GazePoint {
            h: target.h + signed_uniform(&mut self.rng, range),
            v: target.v + signed_uniform(&mut self.rng, range),
        });
        let delays = [
            uniform_duration(&mut self.rng, PHASE_DELAY_SECS),
            uniform_duration(&mut self.rng, PHASE_DELAY_SECS),
        ];
        Saccade {
            target,
            phases,
            delays,
        }
    }

    /// Wire angles for one phase, clamped to the eye ranges
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn wire_angles(&self, point: GazePoint) -> (i32, i32) {
        (
            angle_to_degrees(point.h, self.eyes.h_min.ceil() as i32, self.eyes.h_max.floor() as i32),
            angle_to_degrees(point.v, self.eyes.v_min.ceil() as i32, self.eyes.v_max.floor() as i32),
        )
    }

    fn change_mode(&mut self, now: Instant) {
        let index = self.rng.gen_range(0..SaccadeMode::ALL.len());
        self.mode = SaccadeMode::ALL[index];
        self.mode_since = now;
        self.mode_hold = uniform_duration(&mut self.rng, MODE_HOLD_SECS);
        self.focus = GazePoint {
            h: randint(&mut self.rng, self.eyes.h_min + FOCUS_MARGIN, self.eyes.h_max - FOCUS_MARGIN),
            v: randint(&mut self.rng, self.eyes.v_min + FOCUS_MARGIN, self.eyes.v_max - FOCUS_MARGIN),
        };
        if !self.interval_for_speech {
            self.interval = self.draw_interval(false);
        }
        debug!("Saccade mode -> {} around ({}, {})", self.mode, self.focus.h, self.focus.v);
    }

    fn draw_interval(&mut self, speaking: bool) -> Duration {
        let range = if speaking {
            SPEAKING_INTERVAL_SECS
        } else {
            self.mode.dwell_range()
        };
        uniform_duration(&mut self.rng, range)
    }

    fn idle_target(&mut self) -> GazePoint {
        let e = &self.eyes;
        match self.mode.focus_spread() {
            None => GazePoint {
                h: randint(&mut self.rng, e.h_min, e.h_max),
                v: randint(&mut self.rng, e.v_min, e.v_max),
            },
            Some(spread) => GazePoint {
                h: (self.focus.h + f64::from(self.rng.gen_range(-spread..=spread))).clamp(e.h_min, e.h_max),
                v: (self.focus.v + f64::from(self.rng.gen_range(-spread..=spread))).clamp(e.v_min, e.v_max),
            },
        }
    }

    fn speaking_target(&mut self) -> GazePoint {
        let e = &self.eyes;
        if self.rng.gen_bool(LOOK_AT_USER_PROBABILITY) {
            GazePoint {
                h: e.h_mid + f64::from(self.rng.gen_range(-10..=10)),
                v: e.v_mid + f64::from(self.rng.gen_range(-10..=10)),
            }
        } else {
            let h = if self.rng.gen_bool(0.5) {
                e.h_min + 15.0
            } else {
                e.h_max - 15.0
            };
            GazePoint {
                h,
                v: e.v_mid + f64::from(self.rng.gen_range(-20..=20)),
            }
        }
    }
}

fn uniform_duration<R: Rng>(rng: &mut R, (lo, hi): (f64, f64)) -> Duration {
    Duration::from_secs_f64(rng.gen_range(lo..=hi))
}

fn signed_uniform<R: Rng>(rng: &mut R, (lo, hi): (f64, f64)) -> f64 {
    let magnitude = rng.gen_range(lo..=hi);
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

/// Whole-degree uniform pick in `[lo, hi]`; collapses to `lo` for an empty range
#[allow(clippy::cast_possible_truncation)]
fn randint<R: Rng>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    let (lo, hi) = (lo.round() as i32, hi.round() as i32);
    if hi <= lo {
        return f64::from(lo);
    }
    f64::from(rng.gen_range(lo..=hi))
}

/// Saccade loop: polls the generator and enqueues each phase on the eye axes
pub struct SaccadeLoop<R: Rng> {
    generator: SaccadeGenerator<R>,
    queue: Arc<CommandQueue>,
    speech: Arc<SpeechState>,
    poll_interval: Duration,
}

impl<R: Rng> SaccadeLoop<R> {
    #[must_use]
    pub fn new(generator: SaccadeGenerator<R>, queue: Arc<CommandQueue>, speech: Arc<SpeechState>) -> Self {
        Self {
            generator,
            queue,
            speech,
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Enqueue the phases of `saccade`, pausing between them.
    ///
    /// Returns `true` if shutdown interrupted the sequence.
    pub fn execute(&self, saccade: &Saccade, shutdown: &Shutdown) -> bool {
        for (i, phase) in saccade.phases.iter().enumerate() {
            let (h, v) = self.generator.wire_angles(*phase);
            self.queue.push(PRIORITY_MOTION, Axis::Eye, h);
            self.queue.push(PRIORITY_MOTION, Axis::Z, v);
            if let Some(delay) = saccade.delays.get(i) {
                if shutdown.sleep(*delay) {
                    return true;
                }
            }
        }
        false
    }

    /// Loop until shutdown
    pub fn run(mut self, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            let speaking = self.speech.is_speaking();
            if let Some(saccade) = self.generator.poll(Instant::now(), speaking) {
                if self.execute(&saccade, shutdown) {
                    break;
                }
            } else if shutdown.sleep(self.poll_interval) {
                break;
            }
        }
    }
}
