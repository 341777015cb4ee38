use candle_core::Device;

use super::*;

fn stroke(offset: f32, bend: f32) -> Tensor {
    Tensor::new(
        &[[
            [offset, offset],
            [offset + 10.0, offset + bend],
            [offset + 20.0, offset + bend],
            [offset + 30.0, offset],
        ]],
        &Device::Cpu,
    )
    .unwrap()
}

fn scalar(t: Tensor) -> f32 {
    t.to_scalar::<f32>().unwrap()
}

#[test]
fn relative_positions_anchor_on_first_point() {
    let rel = relative_positions(&stroke(5.0, 2.0)).unwrap();
    let v = rel.to_vec3::<f32>().unwrap();
    assert_eq!(v[0][0], vec![0.0, 0.0]);
    assert_eq!(v[0][3], vec![30.0, 0.0]);
}

#[test]
fn translation_is_free_but_reshaping_is_not() {
    let reference = stroke(0.0, 4.0);
    let moved = stroke(12.0, 4.0);
    assert_eq!(scalar(relative_position_loss(&moved, &reference).unwrap()), 0.0);
    let bent = stroke(0.0, 8.0);
    // Two of eight coordinates differ by 4.
    assert!((scalar(relative_position_loss(&bent, &reference).unwrap()) - 4.0).abs() < 1e-5);
}

#[test]
fn bezier_loss_is_zero_only_for_equal_curves() {
    let reference = stroke(0.0, 4.0);
    assert_eq!(scalar(bezier_curve_loss(&reference, &reference).unwrap()), 0.0);
    assert!(scalar(bezier_curve_loss(&stroke(1.0, 4.0), &reference).unwrap()) > 0.0);
}

#[test]
fn mismatched_shapes_are_rejected() {
    let three = Tensor::zeros((1, 3, 2), candle_core::DType::F32, &Device::Cpu).unwrap();
    assert!(relative_position_loss(&three, &stroke(0.0, 0.0)).is_err());
    assert!(matches!(
        bezier_curve_loss(&three, &three),
        Err(PaintError::Config(_))
    ));
}
