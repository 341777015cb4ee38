use candle_core::{Device, Var};

use super::*;
use crate::foundation::core::Canvas;

const SIDE: u32 = 16;

fn cfg() -> SinkhornConfig {
    SinkhornConfig {
        blur: 0.1,
        iterations: 50,
        resolution: 8,
    }
}

// White canvas with a 4x4 black square whose top-left corner is at `(x, y)`.
fn square_at(x: u32, y: u32) -> Raster {
    let img = image::RgbImage::from_fn(SIDE, SIDE, |px, py| {
        if (x..x + 4).contains(&px) && (y..y + 4).contains(&py) {
            image::Rgb([0, 0, 0])
        } else {
            image::Rgb([255, 255, 255])
        }
    });
    Raster::from_rgb_image(&img, &Device::Cpu).unwrap()
}

fn value(loss: &SinkhornLoss, a: &Raster, b: &Raster) -> f32 {
    loss.divergence(a, b).unwrap().to_scalar::<f32>().unwrap()
}

#[test]
fn identical_ink_has_near_zero_divergence() {
    let loss = SinkhornLoss::new(cfg()).unwrap();
    let a = square_at(4, 4);
    assert!(value(&loss, &a, &a).abs() < 1e-3);
}

#[test]
fn divergence_grows_with_displacement() {
    let loss = SinkhornLoss::new(cfg()).unwrap();
    let reference = square_at(4, 4);
    let near = value(&loss, &square_at(6, 4), &reference);
    let far = value(&loss, &square_at(10, 10), &reference);
    assert!(near > 1e-3, "near = {near}");
    assert!(far > 2.0 * near, "near = {near}, far = {far}");
}

#[test]
fn mismatched_sizes_are_config_errors() {
    let loss = SinkhornLoss::new(cfg()).unwrap();
    let small = Raster::filled(Canvas::new(8, 8).unwrap(), [1.0; 3], &Device::Cpu).unwrap();
    let err = loss.divergence(&small, &square_at(0, 0)).unwrap_err();
    assert!(matches!(err, PaintError::Config(_)));
}

#[test]
fn invalid_parameters_are_rejected() {
    for bad in [
        SinkhornConfig { blur: 0.0, ..cfg() },
        SinkhornConfig { blur: f64::NAN, ..cfg() },
        SinkhornConfig { iterations: 0, ..cfg() },
        SinkhornConfig { resolution: 0, ..cfg() },
    ] {
        assert!(SinkhornLoss::new(bad).is_err(), "{bad:?}");
    }
}

#[test]
fn gradient_reaches_the_current_raster() {
    let loss = SinkhornLoss::new(cfg()).unwrap();
    let var = Var::from_tensor(square_at(10, 10).tensor()).unwrap();
    let current = Raster::new(var.as_tensor().clone()).unwrap();
    let total = loss.divergence(&current, &square_at(2, 2)).unwrap();
    let grads = total.backward().unwrap();
    let g = grads.get(var.as_tensor()).unwrap();
    let values = g.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert!(values.iter().all(|v| v.is_finite()));
    assert!(values.iter().any(|v| v.abs() > 0.0));
}
