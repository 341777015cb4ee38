use candle_core::{Device, Var};

use super::*;

fn pattern(size: u32, shift: u32) -> Raster {
    let img = image::RgbImage::from_fn(size, size, |x, y| {
        let v = (((x + shift) / 4 + y / 4) % 2 * 200 + 30) as u8;
        image::Rgb([v, 255 - v, v / 2])
    });
    Raster::from_rgb_image(&img, &Device::Cpu).unwrap()
}

fn scalar(t: &Tensor) -> f32 {
    t.to_scalar::<f32>().unwrap()
}

#[test]
fn identical_images_score_one() {
    let a = pattern(32, 0);
    assert!((scalar(&ssim(&a, &a).unwrap()) - 1.0).abs() < 1e-5);
    assert!((scalar(&ms_ssim(&a, &a).unwrap()) - 1.0).abs() < 1e-4);
}

#[test]
fn different_images_score_lower() {
    let a = pattern(32, 0);
    let b = pattern(32, 4);
    let s = scalar(&ssim(&a, &b).unwrap());
    assert!(s < 0.5, "{s}");
    let m = scalar(&ms_ssim(&a, &b).unwrap());
    assert!(m < 0.9, "{m}");
}

#[test]
fn small_images_fall_back_to_fewer_scales() {
    // Below two windows wide only one scale is used, where MS-SSIM equals SSIM.
    let a = pattern(16, 0);
    let b = pattern(16, 1);
    let s = scalar(&ssim(&a, &b).unwrap());
    let m = scalar(&ms_ssim(&a, &b).unwrap());
    assert!((s.max(1e-6) - m).abs() < 1e-5, "{s} vs {m}");
}

#[test]
fn size_mismatch_is_config_error() {
    assert!(matches!(
        ssim(&pattern(16, 0), &pattern(32, 0)),
        Err(PaintError::Config(_))
    ));
}

#[test]
fn ssim_is_differentiable() {
    let target = pattern(24, 0);
    let var = Var::from_tensor(pattern(24, 2).tensor()).unwrap();
    let x = Raster::new(var.as_tensor().clone()).unwrap();
    let loss = ssim(&x, &target).unwrap().affine(-1.0, 1.0).unwrap();
    let grads = loss.backward().unwrap();
    let g = grads.get(var.as_tensor()).unwrap();
    let vals = g.flatten_all().unwrap().to_vec1::<f32>().unwrap();
    assert!(vals.iter().all(|v| v.is_finite()));
    assert!(vals.iter().any(|v| *v != 0.0));
}
