//! Trajectory integrator: rate-limited approach to the detector's targets plus an
//! organic sway, dispatched only when the rounded angle moved enough.

use crate::command::Axis;
use crate::command_queue::CommandQueue;
use crate::config::TrackingConfig;
use crate::constants::PRIORITY_MOTION;
use crate::tracking::{SharedTargets, TargetState};
use crate::utils::safe_cast::angle_to_degrees;
use crate::utils::{clamp_angle, wall_clock_seconds};
use crate::worker::Shutdown;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Integrator state, persisted across ticks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackState {
    pub target_angle: f64,
    pub current_angle: f64,
    pub target_depth_angle: f64,
    pub current_depth_angle: f64,
    pub dynamic_step_size: f64,
    /// `None` until the first neck command goes out
    pub last_dispatched_angle: Option<i32>,
    /// `None` until the first depth command goes out
    pub last_dispatched_depth_angle: Option<i32>,
}

/// Per-tick motion policy for the neck and depth axes
#[derive(Debug, Clone)]
pub struct TrajectoryIntegrator {
    config: TrackingConfig,
    state: TrackState,
}

impl TrajectoryIntegrator {
    /// Start at the neutral pose with nothing dispatched yet
    #[must_use]
    pub fn new(config: &TrackingConfig, step_size: f64) -> Self {
        Self {
            config: config.clone(),
            state: TrackState {
                target_angle: config.neutral_angle,
                current_angle: config.neutral_angle,
                target_depth_angle: config.depth_mid,
                current_depth_angle: config.depth_mid,
                dynamic_step_size: step_size,
                last_dispatched_angle: None,
                last_dispatched_depth_angle: None,
            },
        }
    }

    #[must_use]
    pub const fn state(&self) -> &TrackState {
        &self.state
    }

    /// Horizontal and vertical sway at phase time `t` (seconds)
    #[must_use]
    pub fn sway(&self, t: f64) -> (f64, f64) {
        let c = &self.config;
        (
            c.sway_h_amplitude * (t * c.sway_h_frequency).sin(),
            c.sway_v_amplitude * (t * c.sway_v_frequency + c.sway_v_phase).sin(),
        )
    }

    /// Advance one control tick at phase time `t`.
    ///
    /// Returns the `(axis, angle)` pairs that should be dispatched this tick.
    pub fn tick(&mut self, t: f64, targets: &TargetState) -> Vec<(Axis, i32)> {
        let step = targets.dynamic_step_size.abs();
        let hysteresis = self.config.hysteresis;
        let state = &mut self.state;

        state.target_angle = targets.target_angle;
        state.target_depth_angle = targets.target_depth_angle;
        state.dynamic_step_size = step;

        state.current_angle = clamp_angle(
            approach(state.current_angle, state.target_angle, step, hysteresis),
            self.config.min_angle,
            self.config.max_angle,
        );
        state.current_depth_angle = clamp_angle(
            approach(state.current_depth_angle, state.target_depth_angle, step, hysteresis),
            self.config.depth_min,
            self.config.depth_max,
        );

        let (sway_h, sway_v) = self.sway(t);
        let neck = self.neck_output(self.state.current_angle + sway_h);
        let depth = self.depth_output(self.state.current_depth_angle + sway_v);

        let mut dispatch = Vec::with_capacity(2);
        if should_dispatch(self.state.last_dispatched_angle, neck, self.config.min_dispatch_change) {
            self.state.last_dispatched_angle = Some(neck);
            dispatch.push((Axis::Neck, neck));
        }
        if should_dispatch(
            self.state.last_dispatched_depth_angle,
            depth,
            self.config.min_dispatch_change,
        ) {
            self.state.last_dispatched_depth_angle = Some(depth);
            dispatch.push((Axis::Z, depth));
        }
        dispatch
    }

    #[allow(clippy::cast_possible_truncation)]
    fn neck_output(&self, angle: f64) -> i32 {
        angle_to_degrees(
            angle,
            self.config.min_angle.ceil() as i32,
            self.config.max_angle.floor() as i32,
        )
    }

    #[allow(clippy::cast_possible_truncation)]
    fn depth_output(&self, angle: f64) -> i32 {
        angle_to_degrees(
            angle,
            self.config.depth_min.ceil() as i32,
            self.config.depth_max.floor() as i32,
        )
    }
}

/// Move `current` toward `target` by at most `step`; an error within `hysteresis` is ignored
fn approach(current: f64, target: f64, step: f64, hysteresis: f64) -> f64 {
    let error = target - current;
    if error.abs() > hysteresis {
        current + error.clamp(-step, step)
    } else {
        current
    }
}

fn should_dispatch(last: Option<i32>, angle: i32, min_change: i32) -> bool {
    last.map_or(true, |last| (angle - last).abs() >= min_change)
}

/// Control loop driving the integrator from the shared targets
pub struct IntegratorLoop {
    integrator: TrajectoryIntegrator,
    targets: Arc<SharedTargets>,
    queue: Arc<CommandQueue>,
    tick: Duration,
}

impl IntegratorLoop {
    #[must_use]
    pub fn new(
        integrator: TrajectoryIntegrator,
        targets: Arc<SharedTargets>,
        queue: Arc<CommandQueue>,
        config: &TrackingConfig,
    ) -> Self {
        Self {
            integrator,
            targets,
            queue,
            tick: Duration::from_millis(config.tick_ms),
        }
    }

    /// One tick against the wall clock; returns the dispatched commands
    pub fn step(&mut self) -> Vec<(Axis, i32)> {
        let targets = self.targets.get();
        let dispatched = self.integrator.tick(wall_clock_seconds(), &targets);
        for &(axis, angle) in &dispatched {
            self.queue.push(PRIORITY_MOTION, axis, angle);
            debug!("Tracking dispatch {axis} {angle}");
        }
        dispatched
    }

    /// Loop until shutdown
    pub fn run(mut self, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            self.step();
            if shutdown.sleep(self.tick) {
                break;
            }
        }
    }
}
