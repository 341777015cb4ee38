use candle_core::Device;

use super::*;

#[test]
fn leading_spacing_with_offset() {
    let mut s = DdimScheduler::new(SchedulerConfig::sdxl()).unwrap();
    s.set_timesteps(50).unwrap();
    let ts = s.timesteps();
    assert_eq!(ts.len(), 50);
    assert_eq!(ts[0], 981);
    assert_eq!(ts[49], 1);
    assert!(ts.windows(2).all(|w| w[0] - w[1] == 20));
    assert_eq!(s.step_ratio(), 20);
}

#[test]
fn invalid_step_counts_are_config_errors() {
    let mut s = DdimScheduler::new(SchedulerConfig::sdxl()).unwrap();
    assert!(matches!(s.set_timesteps(0), Err(PaintError::Config(_))));
    assert!(matches!(s.set_timesteps(1001), Err(PaintError::Config(_))));
}

#[test]
fn alpha_products_decrease_and_boundary_follows_config() {
    let sdxl = DdimScheduler::new(SchedulerConfig::sdxl()).unwrap();
    assert!(sdxl.alpha_cumprod(0) > sdxl.alpha_cumprod(500));
    assert!(sdxl.alpha_cumprod(500) > sdxl.alpha_cumprod(999));
    assert_eq!(sdxl.final_alpha_cumprod(), sdxl.alpha_cumprod(0));
    assert!((sdxl.alpha_cumprod(0) - (1.0 - 0.00085)).abs() < 1e-12);

    let ddpm = DdimScheduler::new(SchedulerConfig::ddpm_linear()).unwrap();
    assert_eq!(ddpm.final_alpha_cumprod(), 1.0);
}

#[test]
fn inversion_step_undoes_denoising_step_for_fixed_noise() {
    let dev = Device::Cpu;
    let mut s = DdimScheduler::new(SchedulerConfig::sdxl()).unwrap();
    s.set_timesteps(10).unwrap();
    let x = Tensor::new(&[0.3f32, -0.7, 0.1, 0.9], &dev).unwrap();
    let eps = Tensor::new(&[0.5f32, 0.2, -1.0, 0.0], &dev).unwrap();
    for &t in s.timesteps() {
        let up = s.inversion_step(&eps, t, &x).unwrap();
        let back = s.step(&eps, t, &up).unwrap();
        let err = (back - &x)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(err < 1e-4, "t={t} err={err}");
    }
}

#[test]
fn add_noise_mixes_by_alpha_product() {
    let dev = Device::Cpu;
    let s = DdimScheduler::new(SchedulerConfig::ddpm_linear()).unwrap();
    let x = Tensor::new(&[1.0f32, -1.0], &dev).unwrap();
    let zero = x.zeros_like().unwrap();
    let noised = s.add_noise(&x, &zero, 400).unwrap().to_vec1::<f32>().unwrap();
    let k = s.alpha_cumprod(400).sqrt() as f32;
    assert!((noised[0] - k).abs() < 1e-6 && (noised[1] + k).abs() < 1e-6);
    assert!(matches!(s.add_noise(&x, &zero, 1000), Err(PaintError::Config(_))));
}
