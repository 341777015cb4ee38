use super::*;
use crate::foundation::core::{Point, Rgba};

fn stroke() -> Stroke {
    Stroke {
        points: vec![
            Point::new(4.0, 4.0),
            Point::new(10.0, 20.0),
            Point::new(20.0, 10.0),
            Point::new(28.0, 28.0),
        ],
        width: 3.0,
        color: Rgba {
            r: 0.2,
            g: 0.4,
            b: 0.6,
            a: 0.8,
        },
    }
}

#[test]
fn document_has_background_and_stroke_attributes() {
    let svg = strokes_to_svg(Canvas::new(32, 24).unwrap(), &[stroke()]);
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains(r#"viewBox="0 0 32 24""#));
    assert!(svg.contains(r#"fill="rgb(255,255,255)""#));
    assert!(svg.contains(r#"stroke="rgb(51,102,153)""#));
    assert!(svg.contains(r#"stroke-opacity="0.8000""#));
    assert!(svg.contains(r#"fill="none""#));
}

#[test]
fn document_parses_and_rasterizes() {
    let svg = strokes_to_svg(Canvas::new(32, 32).unwrap(), &[stroke()]);
    let tree = parse_svg(svg.as_bytes()).unwrap();
    let raster = rasterize_svg(&tree, 32, 32, &Device::Cpu).unwrap();
    assert_eq!(raster.dims(), (32, 32, 3));
    let corner = raster
        .tensor()
        .get(0)
        .unwrap()
        .get(31)
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    assert_eq!(corner, vec![1.0, 1.0, 1.0]);
}

#[test]
fn malformed_svg_is_an_error() {
    assert!(parse_svg(b"<svg").is_err());
}
