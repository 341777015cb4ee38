use candle_core::{Device, Tensor, Var};

use super::*;

#[test]
fn fnv_seeded_hash_is_stable() {
    let mut a = Fnv1a64::new_default();
    a.write_bytes(b"vectorpainter");
    let mut b = Fnv1a64::new(Fnv1a64::OFFSET_BASIS);
    b.write_bytes(b"vector");
    b.write_bytes(b"painter");
    assert_eq!(a.finish(), b.finish());
}

#[test]
fn sigmoid_gradient_is_finite_for_extreme_inputs() {
    let x = Var::new(&[-1.0e4f32, 0.0, 1.0e4], &Device::Cpu).unwrap();
    let y = sigmoid(x.as_tensor()).unwrap();
    let vals = y.to_vec1::<f32>().unwrap();
    assert!(vals[0] < 1e-6);
    assert!((vals[1] - 0.5).abs() < 1e-6);
    assert!(vals[2] > 1.0 - 1e-6);

    let grads = y.sum_all().unwrap().backward().unwrap();
    let g = grads.get(x.as_tensor()).unwrap().to_vec1::<f32>().unwrap();
    assert!(g.iter().all(|v| v.is_finite()));
    assert!((g[1] - 0.25).abs() < 1e-5);
}

#[test]
fn logsumexp_matches_naive_and_survives_large_values() {
    let x = Tensor::new(&[[1.0f32, 2.0, 3.0]], &Device::Cpu).unwrap();
    let lse = logsumexp(&x, 1).unwrap().to_vec1::<f32>().unwrap();
    let naive = (1f32.exp() + 2f32.exp() + 3f32.exp()).ln();
    assert!((lse[0] - naive).abs() < 1e-5);

    let big = Tensor::new(&[[1000.0f32, 1000.0]], &Device::Cpu).unwrap();
    let lse = logsumexp(&big, 1).unwrap().to_vec1::<f32>().unwrap();
    assert!((lse[0] - (1000.0 + 2f32.ln())).abs() < 1e-3);
}

#[test]
fn gaussian_window_is_normalized_and_symmetric() {
    let w = gaussian_window(11, 1.5);
    let sum: f32 = w.iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert!((w[0] - w[10]).abs() < 1e-7);
    assert!(w[5] > w[4]);
}
