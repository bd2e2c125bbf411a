//! End-to-end behaviour of the estimator and the generic engine

use approx::assert_relative_eq;
use gimbal_ahrs_core::ahrs::{
    AttitudeEstimator, ChiSquareGate, EstimatorConfig, GateVerdict, DEFAULT_GRAVITY,
};
use gimbal_ahrs_core::kalman::{KalmanFilter, NoHooks, SkipSteps};
use nalgebra::{UnitQuaternion, Vector3};

const DT: f32 = 0.001;

fn estimator() -> AttitudeEstimator {
    AttitudeEstimator::new(EstimatorConfig::default()).unwrap()
}

fn level() -> Vector3<f32> {
    Vector3::new(0.0, 0.0, DEFAULT_GRAVITY)
}

/// Specific force seen by a body rolled by `roll` about x
fn rolled(roll: f32) -> Vector3<f32> {
    Vector3::new(0.0, roll.sin(), roll.cos()) * DEFAULT_GRAVITY
}

/// Deterministic noise in [-1, 1)
struct Lcg(u32);

impl Lcg {
    fn next(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.0 >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
    }
}

#[test]
fn steady_level_attitude() {
    let mut est = estimator();
    for _ in 0..1000 {
        est.update(Vector3::zeros(), level(), DT).unwrap();
    }

    let out = est.estimate();
    let q = out.quat();
    assert!((q[0] - 1.0).abs() < 1e-3);
    for v in &q[1..] {
        assert!(v.abs() < 1e-3);
    }
    for angle in out.euler() {
        assert!(angle.abs() < 1e-3);
    }
    assert!(out.is_healthy());
    assert_eq!(est.fault_count(), 0);
}

#[test]
fn constant_roll_rate_is_tracked() {
    let rate = 0.1;
    let mut est = estimator();
    let mut roll_at_window_start = 0.0;

    for k in 0..2000 {
        let true_roll = rate * (k + 1) as f32 * DT;
        let out = est
            .update(Vector3::new(rate, 0.0, 0.0), rolled(true_roll), DT)
            .unwrap();
        if k == 1499 {
            roll_at_window_start = out.roll;
        }
    }

    let out = est.estimate();
    let true_roll = rate * 2000.0 * DT;
    assert!((out.roll - true_roll).abs() < 0.01 * true_roll);

    let tracked_rate = (out.roll - roll_at_window_start) / (500.0 * DT);
    assert!((tracked_rate - rate).abs() < 0.01 * rate);
    assert!(out.pitch.abs() < 1e-3);
}

#[test]
fn impact_is_rejected_then_recovered() {
    let mut est = estimator();
    for _ in 0..200 {
        est.update(Vector3::zeros(), level(), DT).unwrap();
    }
    let before = est.estimate().quat();
    assert!(est.gate().is_accepted());

    // 3g specific force with a large lateral component
    let impact = Vector3::new(2.0 * core::f32::consts::SQRT_2, 0.0, 1.0) * DEFAULT_GRAVITY;
    assert_relative_eq!(impact.norm(), 3.0 * DEFAULT_GRAVITY, max_relative = 1e-5);

    for _ in 0..30 {
        let out = est.update(Vector3::zeros(), impact, DT).unwrap();
        assert!(est.gating_enabled());
        assert_eq!(out.gate, Some(GateVerdict::Reject));
        assert!(est.filter().state().prior_held());
        for (a, b) in out.quat().iter().zip(before.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
    assert_eq!(est.gate().consecutive_failures(), 30);
    assert_eq!(est.gate().forced_accepts(), 0);

    for _ in 0..200 {
        let out = est.update(Vector3::zeros(), level(), DT).unwrap();
        assert_ne!(out.gate, Some(GateVerdict::Reject));
    }
    assert_eq!(est.gate().consecutive_failures(), 0);
    let q = est.estimate().quat();
    assert!((q[0] - 1.0).abs() < 1e-3);
    assert!(q[1].abs() < 1e-3 && q[2].abs() < 1e-3);
}

#[test]
fn sustained_disturbance_forces_acceptance() {
    let mut est = estimator();
    for _ in 0..200 {
        est.update(Vector3::zeros(), level(), DT).unwrap();
    }

    let impact = Vector3::new(2.0 * core::f32::consts::SQRT_2, 0.0, 1.0) * DEFAULT_GRAVITY;
    let mut forced_at = None;
    for k in 0..60 {
        let out = est.update(Vector3::zeros(), impact, DT).unwrap();
        if out.gate == Some(GateVerdict::ForceAccept) {
            forced_at = Some(k);
            break;
        }
    }
    assert_eq!(forced_at, Some(50));
    assert!(!est.gate().is_accepted());
    assert!(!est.filter().state().prior_held());
}

#[test]
fn adaptive_noise_settles() {
    let base = 0.98;
    let mut kf = KalmanFilter::new(1, 0, 1, NoHooks).unwrap();
    {
        let s = kf.state_mut();
        s.a.fill(1.0);
        s.h.fill(1.0);
        s.p.fill(1.0);
        s.q.fill(0.01);
        s.r.fill(1.0);
        s.enable_adaptive(base, 1.0);
    }

    let mut noise = Lcg(7);
    let mut alphas = [0.0f32; 500];
    let mut r_steps = [0.0f32; 500];
    let mut q_steps = [0.0f32; 500];
    for k in 0..500 {
        let (r_prev, q_prev) = (kf.state().r[(0, 0)], kf.state().q[(0, 0)]);
        kf.state_mut()
            .stage_measurement(&[5.0 + 0.5 * noise.next()])
            .unwrap();
        kf.update();
        assert!(kf.last_status().is_ok());

        alphas[k] = kf.state().adaptive().unwrap().alpha();
        r_steps[k] = (kf.state().r[(0, 0)] - r_prev).abs();
        let q = kf.state().q[(0, 0)];
        assert!(q.is_finite() && q >= 0.0);
        q_steps[k] = (q - q_prev).abs();
    }

    for pair in alphas.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
    assert!(alphas[499] <= base);
    assert!(base - alphas[499] < 2e-3);

    let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
    assert!(mean(&r_steps[400..]) < 0.1 * mean(&r_steps[1..21]));
    assert!(mean(&q_steps[400..]) < 0.1 * mean(&q_steps[1..21]));
    assert!((kf.output()[0] - 5.0).abs() < 0.5);
}

#[test]
fn predicted_quaternion_stays_unit_norm() {
    let mut est = estimator();
    let mut noise = Lcg(42);
    for _ in 0..2000 {
        let gyro = Vector3::new(noise.next(), noise.next(), noise.next()) * 2.0;
        let accel = level() + Vector3::new(noise.next(), noise.next(), noise.next()) * 3.0;
        est.update(gyro, accel, DT).unwrap();

        let x = &est.filter().state().x_hat_minus;
        let norm = (0..4).map(|i| x[(i, 0)] * x[(i, 0)]).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
    assert!(est.estimate().is_valid());
}

#[test]
fn published_quaternion_is_unit_from_large_tilt() {
    let mut est = estimator();
    for _ in 0..500 {
        let out = est.update(Vector3::zeros(), rolled(0.8), DT).unwrap();
        assert!((out.quaternion.norm() - 1.0).abs() < 1e-4);
        assert!(out.is_valid());

        let (roll, _, _) = UnitQuaternion::from_quaternion(out.quaternion).euler_angles();
        assert!((out.roll - roll).abs() < 1e-4);
    }
    assert!((est.estimate().roll - 0.8).abs() < 0.05);
}

#[test]
fn identity_prediction_holds() {
    let mut kf = KalmanFilter::new(3, 0, 1, NoHooks).unwrap();
    {
        let s = kf.state_mut();
        s.a.fill_with_identity();
        s.x_hat.copy_from_slice(&[0.5, -1.0, 2.0]);
        s.skip = SkipSteps::GAIN | SkipSteps::CORRECT_STATE | SkipSteps::CORRECT_COVARIANCE;
    }

    for _ in 0..100 {
        kf.update();
        let s = kf.state();
        assert_eq!(s.x_hat_minus.as_slice(), &[0.5, -1.0, 2.0]);
        assert_eq!(s.x_hat.as_slice(), &[0.5, -1.0, 2.0]);
    }
    assert!(kf.last_status().is_ok());
}

#[test]
fn bias_correction_is_bounded() {
    let mut est = estimator();
    let mut noise = Lcg(3);
    for k in 0..3000 {
        let roll = 0.3 * (k as f32 * DT * 2.0).sin();
        let accel = rolled(roll) + Vector3::new(noise.next(), noise.next(), 0.0) * 0.2;
        let gyro = Vector3::new(0.02, -0.01, 0.0);
        est.update(gyro, accel, DT).unwrap();

        if est.gate().is_accepted() {
            let correction = est.filter().hooks().correction();
            let limit = est.config().bias_step_limit * DT;
            for c in &correction[4..] {
                assert!(c.abs() <= limit * (1.0 + 1e-5));
            }
        }
    }
}

#[test]
fn gate_monotonicity() {
    let threshold = 1e-3;
    let mut gate = ChiSquareGate::new(threshold, 50);
    gate.set_enabled(true);

    for score in [0.0, 0.1 * threshold, 0.49 * threshold] {
        gate.evaluate(score);
        assert!(gate.is_accepted());
    }

    let mut verdict = GateVerdict::Accept { scale: 1.0 };
    for _ in 0..51 {
        verdict = gate.evaluate(2.0 * threshold);
    }
    assert_eq!(verdict, GateVerdict::ForceAccept);
    assert!(!gate.is_accepted());

    gate.evaluate(0.4 * threshold);
    assert!(gate.is_accepted());
}

#[test]
fn reinit_forgets_history() {
    let mut kf = KalmanFilter::new(2, 1, 2, NoHooks).unwrap();
    {
        let s = kf.state_mut();
        s.a.fill_with_identity();
        s.b.fill(0.1);
        s.h.fill_with_identity();
        s.p.fill_with_identity();
        s.r.fill_with_identity();
        s.enable_adaptive(0.9, 0.01);
    }
    for _ in 0..20 {
        kf.state_mut().stage_control(&[1.0]).unwrap();
        kf.state_mut().stage_measurement(&[3.0, -3.0]).unwrap();
        kf.update();
    }
    assert!(kf.output().iter().any(|v| *v != 0.0));

    for _ in 0..2 {
        kf.init(2, 1, 2).unwrap();
        let s = kf.state();
        for m in [&s.x_hat, &s.x_hat_minus, &s.a, &s.b, &s.h, &s.p, &s.q, &s.r, &s.k] {
            assert!(m.iter().all(|v| *v == 0.0));
        }
        assert!(kf.output().iter().all(|v| *v == 0.0));
        assert!(s.adaptive().is_none());
        assert!(s.skip.is_empty());
        assert_eq!(s.fault_count(), 0);
    }
}
