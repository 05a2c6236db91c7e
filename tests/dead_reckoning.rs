//! Dead reckoning tests
//!
//! Synthetic per-tick sensor deltas driven through the fusion engine to check
//! the integration math without hardware:
//! - zero motion leaves the pose untouched
//! - identical inputs give bit-identical trajectories
//! - straight lines, turns in place and a closed square
//!
//! Run with: `cargo test --test dead_reckoning`

use approx::assert_relative_eq;
use ballpath::config::{AxisConfig, Polarity, TrackingConfig};
use ballpath::core::types::SensorCounts;
use ballpath::{FusionEngine, FusionParams, Pose2D, TickDeltas};
use std::f64::consts::{FRAC_PI_2, PI};

// ============================================================================
// Helpers
// ============================================================================

fn normal_axes() -> AxisConfig {
    AxisConfig {
        primary_x: Polarity::Normal,
        primary_y: Polarity::Normal,
        secondary_y: Polarity::Normal,
    }
}

/// Secondary sensor perpendicular to the forward axis (φ = 0), so turning
/// and translating are fully decoupled
fn decoupled(calibration_factor: f64, radius: f64) -> FusionParams {
    FusionParams {
        calibration_factor,
        radius,
        mount_complement: 0.0,
        axes: normal_axes(),
    }
}

/// The reference rig: k = 1, r = 1, mount angle 63.5°
fn reference_rig() -> FusionParams {
    let tracking = TrackingConfig {
        calibration_factor: 1.0,
        ball_radius: 1.0,
        mount_angle_deg: 63.5,
        axes: normal_axes(),
        ..TrackingConfig::default()
    };
    FusionParams::from_config(&tracking).unwrap()
}

fn run(engine: &mut FusionEngine, deltas: &[TickDeltas]) -> Vec<Pose2D> {
    deltas.iter().map(|d| engine.integrate(d)).collect()
}

/// Deterministic pseudo-random tick inputs in [-20, 20]
fn noisy_sequence(len: usize, seed: u64) -> Vec<TickDeltas> {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) % 41) as i64 - 20
    };
    (0..len)
        .map(|_| TickDeltas::new(next(), next(), next(), next()))
        .collect()
}

fn forward(ticks: usize) -> Vec<TickDeltas> {
    vec![TickDeltas::new(0, 1, 0, 0); ticks]
}

fn turn(ticks: usize) -> Vec<TickDeltas> {
    vec![TickDeltas::new(0, 0, 0, 1); ticks]
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_zero_motion_keeps_pose() {
    for params in [reference_rig(), decoupled(0.37, 4.2), decoupled(-3.0, 0.1)] {
        let mut engine = FusionEngine::new(params);
        for pose in run(&mut engine, &vec![TickDeltas::default(); 1000]) {
            assert_eq!(pose.x, 0.0);
            assert_eq!(pose.y, 0.0);
            assert_eq!(pose.theta, 0.0);
        }
        assert_eq!(engine.updates(), 1000);
    }
}

#[test]
fn test_bit_identical_runs() {
    let deltas = noisy_sequence(5000, 42);

    let mut a = FusionEngine::new(reference_rig());
    let mut b = FusionEngine::new(reference_rig());
    let run_a = run(&mut a, &deltas);
    let run_b = run(&mut b, &deltas);

    for (pa, pb) in run_a.iter().zip(&run_b) {
        assert_eq!(pa.x.to_bits(), pb.x.to_bits());
        assert_eq!(pa.y.to_bits(), pb.y.to_bits());
        assert_eq!(pa.theta.to_bits(), pb.theta.to_bits());
    }
}

#[test]
fn test_counter_ticks_match_delta_ticks() {
    // Feeding absolute counters through tick() is the same as integrating
    // their differences
    let deltas = noisy_sequence(200, 7);

    let mut by_delta = FusionEngine::new(reference_rig());
    let mut by_counts = FusionEngine::new(reference_rig());
    let (mut m1, mut m2) = (SensorCounts::default(), SensorCounts::default());

    for (i, d) in deltas.iter().enumerate() {
        m1 = SensorCounts::new(m1.x + d.d1x, m1.y + d.d1y);
        m2 = SensorCounts::new(m2.x + d.d2x, m2.y + d.d2y);

        let expected = by_delta.integrate(d);
        let sample = by_counts.tick(m1, m2, i as f64 * 0.01);
        assert_eq!(sample.x.to_bits(), expected.x.to_bits());
        assert_eq!(sample.y.to_bits(), expected.y.to_bits());
    }
    assert_eq!(by_counts.pose(), by_delta.pose());
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_reference_single_tick() {
    let mut engine = FusionEngine::new(reference_rig());
    let v = engine.params().velocity(&TickDeltas::new(0, 1, 0, 0));
    assert_relative_eq!(v.wx, 1.0);
    assert_relative_eq!(v.wy, 0.0);
    assert_relative_eq!(v.wz, -0.4986, epsilon = 1e-4);

    let pose = engine.integrate(&TickDeltas::new(0, 1, 0, 0));
    assert_relative_eq!(pose.theta, 0.4986, epsilon = 1e-4);
    assert_relative_eq!(pose.x, -0.478, epsilon = 1e-3);
    assert_relative_eq!(pose.y, 0.878, epsilon = 1e-3);
}

#[test]
fn test_straight_line() {
    let mut engine = FusionEngine::new(decoupled(0.5, 1.0));
    run(&mut engine, &forward(100));

    let pose = engine.pose();
    assert_eq!(pose.theta, 0.0);
    assert_relative_eq!(pose.x, 0.0);
    assert_relative_eq!(pose.y, 50.0, epsilon = 1e-9);
}

#[test]
fn test_lateral_line() {
    let mut engine = FusionEngine::new(decoupled(1.0, 1.0));
    run(&mut engine, &vec![TickDeltas::new(-1, 0, 0, 0); 30]);

    let pose = engine.pose();
    assert_relative_eq!(pose.x, -30.0, epsilon = 1e-9);
    assert_relative_eq!(pose.y, 0.0);
}

#[test]
fn test_turn_in_place_then_forward() {
    // k = π/20 with r = 1: ten unit turn ticks make a quarter turn
    let k = PI / 20.0;
    let mut engine = FusionEngine::new(decoupled(k, 1.0));

    run(&mut engine, &turn(10));
    let turned = engine.pose();
    assert_relative_eq!(turned.theta, FRAC_PI_2, epsilon = 1e-12);
    assert_eq!(turned.x, 0.0);
    assert_eq!(turned.y, 0.0);

    // Forward now points along -x
    run(&mut engine, &forward(20));
    let pose = engine.pose();
    assert_relative_eq!(pose.x, -20.0 * k, epsilon = 1e-9);
    assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
}

#[test]
fn test_radius_scales_turn_rate() {
    let mut small = FusionEngine::new(decoupled(1.0, 1.0));
    let mut large = FusionEngine::new(decoupled(1.0, 4.0));
    run(&mut small, &turn(8));
    run(&mut large, &turn(8));
    assert_relative_eq!(small.pose().theta, 4.0 * large.pose().theta, epsilon = 1e-12);
}

#[test]
fn test_square_closes() {
    let k = PI / 20.0;
    let mut engine = FusionEngine::new(decoupled(k, 1.0));

    for _ in 0..4 {
        run(&mut engine, &forward(25));
        run(&mut engine, &turn(10));
    }

    let pose = engine.pose();
    assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
    // Heading keeps accumulating past 2π
    assert_relative_eq!(pose.theta, 2.0 * PI, epsilon = 1e-9);
}

#[test]
fn test_calibration_is_linear_without_rotation() {
    let path = vec![TickDeltas::new(3, 2, 0, 0); 10];

    let mut unit = FusionEngine::new(decoupled(1.0, 1.0));
    let mut doubled = FusionEngine::new(decoupled(2.0, 1.0));
    run(&mut unit, &path);
    run(&mut doubled, &path);

    assert_relative_eq!(doubled.pose().x, 2.0 * unit.pose().x, epsilon = 1e-9);
    assert_relative_eq!(doubled.pose().y, 2.0 * unit.pose().y, epsilon = 1e-9);
}

#[test]
fn test_primary_polarity_mirrors_path() {
    let mut mirrored_params = decoupled(1.0, 1.0);
    mirrored_params.axes.primary_y = Polarity::Inverted;

    let mut normal = FusionEngine::new(decoupled(1.0, 1.0));
    let mut mirrored = FusionEngine::new(mirrored_params);
    run(&mut normal, &forward(10));
    run(&mut mirrored, &forward(10));

    assert_relative_eq!(normal.pose().y, -mirrored.pose().y);
}

#[test]
fn test_reset_restarts_from_origin() {
    let mut engine = FusionEngine::new(reference_rig());
    run(&mut engine, &noisy_sequence(50, 3));
    engine.reset();

    let mut fresh = FusionEngine::new(reference_rig());
    let deltas = noisy_sequence(50, 9);
    assert_eq!(run(&mut engine, &deltas), run(&mut fresh, &deltas));
}
