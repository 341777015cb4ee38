use super::*;

#[test]
fn counts_round_trip() {
    assert_eq!(control_point_count(1), 4);
    assert_eq!(control_point_count(3), 10);
    assert_eq!(segment_count(10), Some(3));
    assert_eq!(segment_count(5), None);
    assert_eq!(segment_count(1), None);
}

#[test]
fn basis_rows_are_partitions_of_unity() {
    let basis = bezier_basis(2, 4, &Device::Cpu).unwrap();
    assert_eq!(basis.dims(), &[9, 7]);
    let rows = basis.to_vec2::<f32>().unwrap();
    for row in &rows {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
    assert_eq!(rows[0][0], 1.0);
    assert_eq!(rows[4][3], 1.0);
    assert_eq!(rows[8][6], 1.0);
}

#[test]
fn sampled_polyline_hits_end_points() {
    let dev = Device::Cpu;
    let basis = bezier_basis(1, 4, &dev).unwrap();
    let pts = Tensor::new(
        &[[[0f32, 0.], [10., 0.], [20., 0.], [30., 0.]]],
        &dev,
    )
    .unwrap();
    let line = sample_polylines(&pts, &basis).unwrap();
    assert_eq!(line.dims(), &[1, 5, 2]);
    let v = line.to_vec3::<f32>().unwrap();
    assert_eq!(v[0][0], vec![0.0, 0.0]);
    assert!((v[0][2][0] - 15.0).abs() < 1e-4);
    assert!((v[0][4][0] - 30.0).abs() < 1e-4);
}

#[test]
fn bez_path_chains_segments() {
    let s = Stroke {
        points: (0..7).map(|i| Point::new(f64::from(i), 0.0)).collect(),
        width: 1.0,
        color: Rgba {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        },
    };
    assert_eq!(s.segments(), 2);
    assert_eq!(s.to_bez_path().to_svg(), "M0,0 C1,0 2,0 3,0 C4,0 5,0 6,0");
}

#[test]
fn pack_rejects_mismatched_point_count() {
    let s = Stroke {
        points: vec![Point::ZERO; 3],
        width: 1.0,
        color: Rgba {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        },
    };
    assert!(matches!(pack_strokes(&[s], 4), Err(PaintError::Config(_))));
}
