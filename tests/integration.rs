//! Host tests of the estimator runtime: staging, task loop and shared state

use approx::assert_relative_eq;
use core::cell::Cell;
use core::task::Poll;
use embassy_futures::select::{select, Either};
use gimbal_ahrs::algorithms::parameters::{AhrsParams, ParamValue, ParameterStore};
use gimbal_ahrs::subsystems::ahrs::{
    run_ahrs_task, AhrsTaskConfig, AhrsTaskState, ImuSample, SampleStage, SharedAttitudeState,
    SharedParameters,
};
use nalgebra::Vector3;

const G: f32 = 9.8035;

fn level(timestamp_us: u64) -> ImuSample {
    ImuSample {
        gyro: Vector3::zeros(),
        accel: Vector3::new(0.0, 0.0, G),
        timestamp_us,
    }
}

#[test]
fn task_loop_publishes_and_counts_gaps() {
    let shared = SharedAttitudeState::new();
    let params = SharedParameters::with_ahrs_defaults().unwrap();
    let tick = Cell::new(0u64);

    // every fifth period has no sample
    let reader = || {
        let k = tick.get();
        tick.set(k + 1);
        let sample = (k % 5 != 4).then(|| level(k * 1_000));
        async move {
            embassy_futures::yield_now().await;
            sample
        }
    };

    let done = core::future::poll_fn(|_| {
        if shared.telemetry().cycles >= 400 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    });

    let result = embassy_futures::block_on(select(
        run_ahrs_task(&shared, &params, AhrsTaskConfig::default(), reader),
        done,
    ));
    assert!(matches!(result, Either::Second(())));

    let snapshot = shared.read().unwrap();
    assert_eq!(snapshot.telemetry.cycles, 400);
    assert_eq!(snapshot.telemetry.missed_samples, 99);
    assert_eq!(snapshot.telemetry.gate_rejections, 0);
    assert_eq!(snapshot.estimate.quat(), shared.estimate().unwrap().quat());
    assert!((snapshot.estimate.quaternion.w - 1.0).abs() < 1e-3);
}

#[test]
fn staged_samples_track_roll() {
    let stage = SampleStage::new();
    let shared = SharedAttitudeState::new();
    let mut task = AhrsTaskState::new(AhrsTaskConfig::default()).unwrap();

    let rate = 0.2;
    for k in 1..=1500u64 {
        let roll = rate * k as f32 * 1e-3;
        stage.publish(ImuSample {
            gyro: Vector3::new(rate, 0.0, 0.0),
            accel: Vector3::new(0.0, roll.sin(), roll.cos()) * G,
            timestamp_us: k * 1_000,
        });

        let sample = stage.take().unwrap();
        shared.write(task.process(&sample).unwrap());
        assert!(stage.take().is_none());
    }

    let snapshot = shared.read().unwrap();
    assert_relative_eq!(snapshot.estimate.roll, 0.3, max_relative = 0.01);
    assert!(snapshot.estimate.pitch.abs() < 1e-3);
    assert!(snapshot.is_fresh(1_500_500, 1_000));
    assert_eq!(snapshot.timestamp_us, 1_500_000);
}

#[test]
fn sustained_impact_reported_in_telemetry() {
    let mut task = AhrsTaskState::new(AhrsTaskConfig::default()).unwrap();
    let mut t = 0;
    for _ in 0..200 {
        t += 1_000;
        task.process(&level(t)).unwrap();
    }

    for _ in 0..60 {
        t += 1_000;
        let impact = ImuSample {
            gyro: Vector3::zeros(),
            accel: Vector3::new(2.0 * core::f32::consts::SQRT_2, 0.0, 1.0) * G,
            timestamp_us: t,
        };
        task.process(&impact).unwrap();
    }

    let telemetry = task.telemetry();
    assert_eq!(telemetry.forced_accepts, 1);
    assert!(telemetry.gate_rejections >= 50);
    assert_eq!(telemetry.numerical_faults, 0);
    assert_eq!(telemetry.cycles, 260);
}

#[test]
fn parameters_configure_the_task() {
    let mut store = ParameterStore::new();
    AhrsParams::register_defaults(&mut store).unwrap();
    store.set("AHRS_CHI_MAXF", ParamValue::Int(5)).unwrap();
    store.set("AHRS_GATE_ACC", ParamValue::Float(0.2)).unwrap();

    let params = AhrsParams::from_store(&store);
    assert!(params.is_valid());

    let mut task = AhrsTaskState::new(AhrsTaskConfig::from_params(&params)).unwrap();

    // 0.3 m/s² off gravity: inside the default band, outside the configured one
    let mut t = 0;
    for _ in 0..10 {
        t += 1_000;
        task.process(&ImuSample {
            gyro: Vector3::zeros(),
            accel: Vector3::new(0.0, 0.0, G + 0.3),
            timestamp_us: t,
        })
        .unwrap();
    }
    assert!(task.estimator().gating_enabled());
    assert_eq!(task.estimator().gate().threshold(), 1e-8);
    assert_eq!(task.config().estimator.max_gate_failures, 5);
}

#[test]
fn parameter_change_retunes_running_task() {
    let shared = SharedAttitudeState::new();
    let params = SharedParameters::with_ahrs_defaults().unwrap();
    let tick = Cell::new(0u64);

    // lower the forced-acceptance limit mid-run, then hit the settled filter
    let reader = || {
        let k = tick.get();
        tick.set(k + 1);
        if k == 100 {
            params.set("AHRS_CHI_MAXF", ParamValue::Int(3)).unwrap();
        }
        let mut sample = level(k * 1_000);
        if k >= 300 {
            sample.accel = Vector3::new(2.0 * core::f32::consts::SQRT_2, 0.0, 1.0) * G;
        }
        async move {
            embassy_futures::yield_now().await;
            Some(sample)
        }
    };

    let done = core::future::poll_fn(|_| {
        if shared.telemetry().cycles >= 320 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    });

    let result = embassy_futures::block_on(select(
        run_ahrs_task(&shared, &params, AhrsTaskConfig::default(), reader),
        done,
    ));
    assert!(matches!(result, Either::Second(())));

    let telemetry = shared.telemetry();
    assert_eq!(telemetry.cycles, 320);
    assert_eq!(telemetry.gate_rejections, 3);
    assert_eq!(telemetry.forced_accepts, 1);
}

#[test]
fn dropped_samples_do_not_advance_the_filter() {
    let mut task = AhrsTaskState::new(AhrsTaskConfig::default()).unwrap();
    task.process(&level(1_000)).unwrap();

    let mut bad = level(2_000);
    bad.gyro.y = f32::NAN;
    assert!(task.process(&bad).is_err());

    assert_eq!(task.telemetry().dropped_samples, 1);
    assert_eq!(task.telemetry().cycles, 1);
    assert!(task.estimator().estimate().is_valid());
}
