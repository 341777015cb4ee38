use super::*;

#[test]
fn canvas_rejects_zero_dimensions() {
    assert!(matches!(Canvas::new(0, 10), Err(PaintError::Config(_))));
    assert!(matches!(Canvas::new(10, 0), Err(PaintError::Config(_))));
    assert_eq!(Canvas::new(4, 3).unwrap().pixel_count(), 12);
}

#[test]
fn raster_requires_hwc_rgb() {
    let dev = Device::Cpu;
    let bad = Tensor::zeros((4, 4, 4), DType::F32, &dev).unwrap();
    assert!(Raster::new(bad).is_err());
    let ok = Tensor::zeros((4, 5, 3), DType::F32, &dev).unwrap();
    let r = Raster::new(ok).unwrap();
    assert_eq!(r.dims(), (4, 5, 3));
}

#[test]
fn rgb_image_conversion_preserves_pixels() {
    let mut img = image::RgbImage::new(3, 2);
    img.put_pixel(2, 1, image::Rgb([255, 128, 0]));
    let raster = Raster::from_rgb_image(&img, &Device::Cpu).unwrap();
    assert_eq!(raster.dims(), (2, 3, 3));
    let back = raster.to_rgb_image().unwrap();
    assert_eq!(back.get_pixel(2, 1), &image::Rgb([255, 128, 0]));
    assert_eq!(back.get_pixel(0, 0), &image::Rgb([0, 0, 0]));
}

#[test]
fn nchw_roundtrip_keeps_layout() {
    let canvas = Canvas::new(6, 4).unwrap();
    let r = Raster::filled(canvas, [0.25, 0.5, 0.75], &Device::Cpu).unwrap();
    let nchw = r.to_nchw().unwrap();
    assert_eq!(nchw.dims(), &[1, 3, 4, 6]);
    let back = Raster::from_nchw(&nchw).unwrap();
    assert_eq!(r.mean_abs_diff(&back).unwrap(), 0.0);
}

#[test]
fn mean_abs_diff_between_black_and_white_is_one() {
    let canvas = Canvas::new(4, 4).unwrap();
    let black = Raster::filled(canvas, [0.0; 3], &Device::Cpu).unwrap();
    let white = Raster::filled(canvas, [1.0; 3], &Device::Cpu).unwrap();
    assert!((black.mean_abs_diff(&white).unwrap() - 1.0).abs() < 1e-6);
}

#[test]
fn stage_names_are_human_readable() {
    assert_eq!(PipelineStage::Stage1Loop.to_string(), "stage-1 imitation");
    assert_eq!(PipelineStage::Finalize.to_string(), "finalize");
}
