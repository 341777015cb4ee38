use rand::SeedableRng;

use super::*;

fn cfg(num_paths: usize) -> StrokeConfig {
    StrokeConfig {
        num_paths,
        num_segments: 2,
        init_radius: 0.1,
        ..StrokeConfig::default()
    }
}

#[test]
fn edge_map_is_zero_on_flat_images_and_peaks_at_borders() {
    let flat = image::RgbImage::from_pixel(8, 8, image::Rgb([90, 90, 90]));
    assert!(edge_magnitude(&flat).iter().all(|v| *v == 0.0));

    let mut split = image::RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]));
    for y in 0..8 {
        for x in 4..8 {
            split.put_pixel(x, y, image::Rgb([255, 255, 255]));
        }
    }
    let edges = edge_magnitude(&split);
    assert!(edges[3 * 8 + 4] > 1.0);
    assert_eq!(edges[3 * 8], 0.0);
}

#[test]
fn random_strokes_have_expected_shape() {
    let mut rng = StdRng::seed_from_u64(9);
    let canvas = Canvas::new(40, 20).unwrap();
    let strokes = random_strokes(&mut rng, canvas, &cfg(10));
    assert_eq!(strokes.len(), 10);
    for s in &strokes {
        assert_eq!(s.points.len(), 7);
        let p0 = s.points[0];
        assert!((0.0..40.0).contains(&p0.x) && (0.0..20.0).contains(&p0.y));
        assert_eq!(s.width, 3.0);
    }
}

#[test]
fn seeded_strokes_start_on_edges() {
    let mut style = image::RgbImage::from_pixel(32, 32, image::Rgb([255, 255, 255]));
    for y in 0..32 {
        for x in 16..32 {
            style.put_pixel(x, y, image::Rgb([0, 0, 0]));
        }
    }
    let mut rng = StdRng::seed_from_u64(4);
    let canvas = Canvas::new(32, 32).unwrap();
    let strokes = style_seeded_strokes(&mut rng, canvas, &cfg(50), &style).unwrap();
    let near_edge = strokes
        .iter()
        .filter(|s| (s.points[0].x - 16.0).abs() < 3.0)
        .count();
    assert!(near_edge > 40, "only {near_edge} of 50 strokes near the edge");
}

#[test]
fn seeded_strokes_require_canvas_sized_style() {
    let style = image::RgbImage::new(10, 10);
    let mut rng = StdRng::seed_from_u64(0);
    let canvas = Canvas::new(32, 32).unwrap();
    assert!(style_seeded_strokes(&mut rng, canvas, &cfg(1), &style).is_err());
}
