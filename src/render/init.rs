use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::model::StrokeConfig;
use crate::foundation::core::{Canvas, Point, Rgba};
use crate::foundation::error::{PaintError, PaintResult};
use crate::render::stroke::{Stroke, control_point_count};

/// Floor added to every edge weight so flat images still sample everywhere.
const EDGE_FLOOR: f32 = 1e-3;

/// Sobel gradient magnitude of the luminance, row-major `width * height`.
pub fn edge_magnitude(img: &image::RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let (w, h) = (w as usize, h as usize);
    let lum: Vec<f32> = img
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)) / 255.0
        })
        .collect();
    let at = |x: isize, y: isize| -> f32 {
        let xi = x.clamp(0, w as isize - 1) as usize;
        let yi = y.clamp(0, h as isize - 1) as usize;
        lum[yi * w + xi]
    };

    let mut out = vec![0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let y = y as isize;
        for (x, v) in row.iter_mut().enumerate() {
            let x = x as isize;
            // Pairwise differences so a flat neighbourhood gives exactly zero.
            let gx = (at(x + 1, y - 1) - at(x - 1, y - 1))
                + 2.0 * (at(x + 1, y) - at(x - 1, y))
                + (at(x + 1, y + 1) - at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) - at(x - 1, y - 1))
                + 2.0 * (at(x, y + 1) - at(x, y - 1))
                + (at(x + 1, y + 1) - at(x + 1, y - 1));
            *v = (gx * gx + gy * gy).sqrt();
        }
    });
    out
}

/// Uniformly placed strokes with random colors.
pub fn random_strokes(rng: &mut StdRng, canvas: Canvas, cfg: &StrokeConfig) -> Vec<Stroke> {
    (0..cfg.num_paths)
        .map(|_| {
            let start = Point::new(
                rng.gen_range(0.0..f64::from(canvas.width)),
                rng.gen_range(0.0..f64::from(canvas.height)),
            );
            let color = Rgba {
                r: rng.r#gen(),
                g: rng.r#gen(),
                b: rng.r#gen(),
                a: cfg.init_alpha.min(cfg.max_alpha),
            };
            build_stroke(rng, canvas, cfg, start, color)
        })
        .collect()
}

/// Strokes whose start points follow the style image's edge magnitude and whose colors are
/// picked from the style image at the start point.
///
/// `style` must already be at canvas resolution.
pub fn style_seeded_strokes(
    rng: &mut StdRng,
    canvas: Canvas,
    cfg: &StrokeConfig,
    style: &image::RgbImage,
) -> PaintResult<Vec<Stroke>> {
    if style.dimensions() != (canvas.width, canvas.height) {
        return Err(PaintError::config(format!(
            "style image is {}x{}, expected canvas size {}x{}",
            style.width(),
            style.height(),
            canvas.width,
            canvas.height
        )));
    }
    let weights: Vec<f32> = edge_magnitude(style)
        .into_iter()
        .map(|m| m + EDGE_FLOOR)
        .collect();
    let dist = WeightedIndex::new(&weights)
        .map_err(|e| PaintError::numeric(format!("edge map is not a valid distribution: {e}")))?;

    let w = canvas.width as usize;
    Ok((0..cfg.num_paths)
        .map(|_| {
            let idx = dist.sample(rng);
            let (px, py) = ((idx % w) as u32, (idx / w) as u32);
            let [r, g, b] = style.get_pixel(px, py).0;
            let start = Point::new(
                f64::from(px) + rng.gen_range(0.0..1.0),
                f64::from(py) + rng.gen_range(0.0..1.0),
            );
            let color = Rgba {
                r: f32::from(r) / 255.0,
                g: f32::from(g) / 255.0,
                b: f32::from(b) / 255.0,
                a: cfg.init_alpha.min(cfg.max_alpha),
            };
            build_stroke(rng, canvas, cfg, start, color)
        })
        .collect())
}

// Each control point is a bounded random step from the previous one.
fn build_stroke(
    rng: &mut StdRng,
    canvas: Canvas,
    cfg: &StrokeConfig,
    start: Point,
    color: Rgba,
) -> Stroke {
    let rx = f64::from(cfg.init_radius) * f64::from(canvas.width);
    let ry = f64::from(cfg.init_radius) * f64::from(canvas.height);
    let n = control_point_count(cfg.num_segments);
    let mut points = Vec::with_capacity(n);
    points.push(start);
    let mut prev = start;
    for _ in 1..n {
        let dx = if rx > 0.0 { rng.gen_range(-rx..=rx) } else { 0.0 };
        let dy = if ry > 0.0 { rng.gen_range(-ry..=ry) } else { 0.0 };
        prev = Point::new(prev.x + dx, prev.y + dy);
        points.push(prev);
    }
    Stroke {
        points,
        width: cfg.init_width.clamp(0.0, cfg.max_width),
        color,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/init.rs"]
mod tests;
