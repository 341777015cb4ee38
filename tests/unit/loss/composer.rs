use candle_core::{Device, Var};

use super::*;
use crate::foundation::core::Canvas;

fn flat(rgb: [f32; 3]) -> Raster {
    Raster::filled(Canvas::new(16, 16).unwrap(), rgb, &Device::Cpu).unwrap()
}

fn points(offset: f32) -> Tensor {
    Tensor::new(
        &[[[0.0f32, 0.0], [4.0, 2.0 + offset], [8.0, 2.0], [12.0, 0.0]]],
        &Device::Cpu,
    )
    .unwrap()
}

fn config(pos_type: PositionLoss) -> LossConfig {
    LossConfig {
        pos_type,
        sinkhorn: SinkhornConfig {
            blur: 0.1,
            iterations: 20,
            resolution: 8,
        },
        ..LossConfig::default()
    }
}

#[test]
fn reconstruction_only_is_plain_mse() {
    let composer = LossComposer::reconstruction_only().unwrap();
    let (total, breakdown) = composer
        .compose(&flat([1.0; 3]), &flat([0.5; 3]), &LossContext::default())
        .unwrap();
    assert!((total.to_scalar::<f32>().unwrap() - 0.25).abs() < 1e-6);
    assert!((breakdown.reconstruction - 0.25).abs() < 1e-6);
    assert_eq!(breakdown.structural, 0.0);
    assert_eq!(breakdown.positional, 0.0);
}

#[test]
fn zero_weights_report_exact_zero() {
    let cfg = LossConfig {
        struct_loss_weight: 0.0,
        pos_loss_weight: 0.0,
        ..config(PositionLoss::Pos)
    };
    let composer = LossComposer::new(&cfg).unwrap();
    // No points in the context: the positional term must not even be evaluated.
    let (_, breakdown) = composer
        .compose(&flat([0.2; 3]), &flat([0.8; 3]), &LossContext::default())
        .unwrap();
    assert_eq!(breakdown.structural, 0.0);
    assert_eq!(breakdown.positional, 0.0);
    assert!((breakdown.total - breakdown.reconstruction).abs() < 1e-7);
}

#[test]
fn total_is_the_sum_of_terms() {
    let composer = LossComposer::new(&config(PositionLoss::Pos)).unwrap();
    let (current, reference) = (points(3.0), points(0.0));
    let ctx = LossContext {
        points: Some(&current),
        reference_points: Some(&reference),
        style: None,
    };
    let (total, b) = composer
        .compose(&flat([0.3, 0.6, 0.9]), &flat([0.5; 3]), &ctx)
        .unwrap();
    assert!(b.reconstruction > 0.0);
    assert!(b.positional > 0.0);
    let sum = b.reconstruction + b.structural + b.positional;
    assert!((b.total - sum).abs() < 1e-5);
    assert!((total.to_scalar::<f32>().unwrap() - sum).abs() < 1e-5);
}

#[test]
fn bezier_term_uses_reference_points() {
    let composer = LossComposer::new(&config(PositionLoss::Bez)).unwrap();
    let same = points(0.0);
    let ctx = LossContext {
        points: Some(&same),
        reference_points: Some(&same),
        style: None,
    };
    let (_, b) = composer.compose(&flat([1.0; 3]), &flat([1.0; 3]), &ctx).unwrap();
    assert!(b.positional.abs() < 1e-7);
}

#[test]
fn sinkhorn_term_compares_against_style() {
    let composer = LossComposer::new(&config(PositionLoss::Sinkhorn)).unwrap();
    let raster = flat([1.0; 3]);
    let err = composer
        .compose(&raster, &raster, &LossContext::default())
        .unwrap_err();
    assert!(matches!(err, PaintError::Config(_)));

    // A larger style image is resampled to the raster size.
    let style = Raster::filled(Canvas::new(32, 32).unwrap(), [0.9; 3], &Device::Cpu).unwrap();
    let ctx = LossContext {
        style: Some(&style),
        ..LossContext::default()
    };
    let (_, b) = composer.compose(&raster, &raster, &ctx).unwrap();
    assert!(b.positional.is_finite());
}

#[test]
fn missing_points_are_config_errors() {
    let composer = LossComposer::new(&config(PositionLoss::Pos)).unwrap();
    let err = composer
        .compose(&flat([1.0; 3]), &flat([1.0; 3]), &LossContext::default())
        .unwrap_err();
    assert!(matches!(err, PaintError::Config(_)));
}

#[test]
fn invalid_weights_are_rejected() {
    for cfg in [
        LossConfig {
            l2_weight: -1.0,
            ..LossConfig::default()
        },
        LossConfig {
            struct_loss_weight: f64::INFINITY,
            ..LossConfig::default()
        },
        LossConfig {
            pos_loss_weight: f64::NAN,
            ..LossConfig::default()
        },
    ] {
        assert!(matches!(LossComposer::new(&cfg), Err(PaintError::Config(_))));
    }
}

#[test]
fn non_finite_values_are_numeric_errors() {
    let composer = LossComposer::reconstruction_only().unwrap();
    let nan = flat([f32::NAN, 0.0, 0.0]);
    let err = composer
        .compose(&nan, &flat([0.0; 3]), &LossContext::default())
        .unwrap_err();
    assert!(matches!(err, PaintError::Numeric(_)));
}

#[test]
fn gradient_flows_to_the_raster_only() {
    let composer = LossComposer::new(&config(PositionLoss::Pos)).unwrap();
    let var = Var::from_tensor(flat([0.4; 3]).tensor()).unwrap();
    let raster = Raster::new(var.as_tensor().clone()).unwrap();
    let target_var = Var::from_tensor(flat([0.6; 3]).tensor()).unwrap();
    let target = Raster::new(target_var.as_tensor().clone()).unwrap();
    let (current, reference) = (points(1.0), points(0.0));
    let ctx = LossContext {
        points: Some(&current),
        reference_points: Some(&reference),
        style: None,
    };
    let (total, _) = composer.compose(&raster, &target, &ctx).unwrap();
    let grads = total.backward().unwrap();
    assert!(grads.get(var.as_tensor()).is_some());
    assert!(grads.get(target_var.as_tensor()).is_none());
}
