//! Integrator properties under arbitrary targets and sway

use animatronic_motion::command::Axis;
use animatronic_motion::command_queue::CommandQueue;
use animatronic_motion::config::{DetectionConfig, TrackingConfig};
use animatronic_motion::constants::PRIORITY_MOTION;
use animatronic_motion::tracking::{SharedTargets, TargetState};
use animatronic_motion::trajectory::{IntegratorLoop, TrajectoryIntegrator};
use proptest::prelude::*;
use std::sync::Arc;

fn targets(angle: f64, depth: f64, step: f64) -> TargetState {
    TargetState {
        target_angle: angle,
        target_depth_angle: depth,
        dynamic_step_size: step,
        last_box: None,
    }
}

proptest! {
    #[test]
    fn prop_dispatched_angles_stay_in_bounds(
        amplitude in 0.0f64..30.0,
        plan in prop::collection::vec((-50.0f64..250.0, -50.0f64..300.0, 0.0f64..20.0), 1..60),
    ) {
        let config = TrackingConfig {
            sway_h_amplitude: amplitude,
            sway_v_amplitude: amplitude,
            ..TrackingConfig::default()
        };
        let mut integrator = TrajectoryIntegrator::new(&config, 8.0);

        for (i, &(angle, depth, step)) in plan.iter().enumerate() {
            let t = f64::from(u32::try_from(i).unwrap()) * 0.033;
            for (axis, value) in integrator.tick(t, &targets(angle, depth, step)) {
                match axis {
                    Axis::Neck => prop_assert!((30..=110).contains(&value)),
                    Axis::Z => prop_assert!((50..=180).contains(&value)),
                    other => prop_assert!(false, "unexpected axis {other}"),
                }
            }
            let state = integrator.state();
            prop_assert!((config.min_angle..=config.max_angle).contains(&state.current_angle));
            prop_assert!((config.depth_min..=config.depth_max).contains(&state.current_depth_angle));
        }
    }

    #[test]
    fn prop_consecutive_dispatches_differ_by_min_change(
        plan in prop::collection::vec((30.0f64..110.0, 0.5f64..8.0), 1..80),
    ) {
        let config = TrackingConfig::default();
        let mut integrator = TrajectoryIntegrator::new(&config, 8.0);
        let mut last_neck: Option<i32> = None;

        for (i, &(angle, step)) in plan.iter().enumerate() {
            let t = f64::from(u32::try_from(i).unwrap()) * 0.033;
            for (axis, value) in integrator.tick(t, &targets(angle, config.depth_mid, step)) {
                if axis == Axis::Neck {
                    if let Some(last) = last_neck {
                        prop_assert!((value - last).abs() >= config.min_dispatch_change);
                    }
                    last_neck = Some(value);
                }
            }
        }
    }
}

#[test]
fn test_loop_holds_neutral_pose_without_faces() {
    let tracking = TrackingConfig::default();
    let detection = DetectionConfig::default();
    let shared = Arc::new(SharedTargets::new(TargetState::neutral(&tracking, &detection)));
    let queue = Arc::new(CommandQueue::new());
    let mut control = IntegratorLoop::new(
        TrajectoryIntegrator::new(&tracking, detection.max_step_far),
        shared,
        Arc::clone(&queue),
        &tracking,
    );

    let first = control.step();
    assert_eq!(first.len(), 2);
    let pending = queue.snapshot();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|c| c.priority == PRIORITY_MOTION));

    // Sway alone stays within a couple of degrees of neutral
    let neck = pending.iter().find(|c| c.axis == Axis::Neck).unwrap();
    assert!((neck.angle - 80).abs() <= 2);
}

#[test]
fn test_converges_to_far_target_in_bounded_ticks() {
    let config = TrackingConfig {
        sway_h_amplitude: 0.0,
        sway_v_amplitude: 0.0,
        ..TrackingConfig::default()
    };
    let mut integrator = TrajectoryIntegrator::new(&config, 8.0);
    let goal = targets(110.0, 130.0, 8.0);
    // 30 degrees at 8 per tick
    for _ in 0..4 {
        integrator.tick(0.0, &goal);
    }
    assert_eq!(integrator.state().current_angle, 110.0);
}
