use candle_core::{Device, Tensor};

use crate::foundation::core::{BezPath, Point, Rgba};
use crate::foundation::error::{PaintError, PaintResult};

/// Number of control points for a stroke made of `segments` chained cubic Beziers.
pub fn control_point_count(segments: usize) -> usize {
    3 * segments + 1
}

/// Inverse of [`control_point_count`]; `None` when `points` is not `3k + 1` for some `k >= 1`.
pub fn segment_count(points: usize) -> Option<usize> {
    (points >= 4 && (points - 1) % 3 == 0).then(|| (points - 1) / 3)
}

/// Cubic Bernstein sampling matrix of shape `(segments * samples + 1, 3 * segments + 1)`.
///
/// Multiplying it with a stroke's control points `(P, 2)` gives the sampled polyline `(K, 2)`.
/// Row `segments * samples` is the last end point.
pub fn bezier_basis(
    segments: usize,
    samples_per_segment: usize,
    device: &Device,
) -> PaintResult<Tensor> {
    if segments == 0 || samples_per_segment == 0 {
        return Err(PaintError::config(
            "bezier basis needs at least one segment and one sample",
        ));
    }
    let p = control_point_count(segments);
    let k = segments * samples_per_segment + 1;
    let mut data = vec![0f32; k * p];
    for seg in 0..segments {
        for i in 0..samples_per_segment {
            let t = i as f32 / samples_per_segment as f32;
            let row = seg * samples_per_segment + i;
            write_cubic_row(&mut data[row * p..(row + 1) * p], 3 * seg, t);
        }
    }
    write_cubic_row(&mut data[(k - 1) * p..], 3 * (segments - 1), 1.0);
    Ok(Tensor::from_vec(data, (k, p), device)?)
}

fn write_cubic_row(row: &mut [f32], first: usize, t: f32) {
    let u = 1.0 - t;
    row[first] = u * u * u;
    row[first + 1] = 3.0 * t * u * u;
    row[first + 2] = 3.0 * t * t * u;
    row[first + 3] = t * t * t;
}

/// Sample polylines for a batch of strokes: `(N, P, 2)` points against a `(K, P)` basis gives
/// `(N, K, 2)`. Differentiable with respect to `points`.
pub fn sample_polylines(points: &Tensor, basis: &Tensor) -> PaintResult<Tensor> {
    Ok(basis.broadcast_matmul(points)?)
}

/// A detached snapshot of one stroke, used for initialization and export.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub width: f32,
    pub color: Rgba,
}

impl Stroke {
    pub fn segments(&self) -> usize {
        segment_count(self.points.len()).unwrap_or(0)
    }

    /// Chained cubic path through the control points.
    pub fn to_bez_path(&self) -> BezPath {
        let mut path = BezPath::new();
        let Some(&first) = self.points.first() else {
            return path;
        };
        path.move_to(first);
        for c in self.points[1..].chunks_exact(3) {
            path.curve_to(c[0], c[1], c[2]);
        }
        path
    }
}

/// Flattened stroke parameters in the layout the renderer's variables use.
pub(crate) struct PackedStrokes {
    pub(crate) points: Vec<f32>,
    pub(crate) widths: Vec<f32>,
    pub(crate) rgb: Vec<f32>,
    pub(crate) alpha: Vec<f32>,
}

pub(crate) fn pack_strokes(strokes: &[Stroke], points_per_stroke: usize) -> PaintResult<PackedStrokes> {
    let mut packed = PackedStrokes {
        points: Vec::with_capacity(strokes.len() * points_per_stroke * 2),
        widths: Vec::with_capacity(strokes.len()),
        rgb: Vec::with_capacity(strokes.len() * 3),
        alpha: Vec::with_capacity(strokes.len()),
    };
    for (i, s) in strokes.iter().enumerate() {
        if s.points.len() != points_per_stroke {
            return Err(PaintError::config(format!(
                "stroke {i} has {} control points, expected {points_per_stroke}",
                s.points.len()
            )));
        }
        packed
            .points
            .extend(s.points.iter().flat_map(|p| [p.x as f32, p.y as f32]));
        packed.widths.push(s.width);
        packed.rgb.extend([s.color.r, s.color.g, s.color.b]);
        packed.alpha.push(s.color.a);
    }
    Ok(packed)
}

#[cfg(test)]
#[path = "../../tests/unit/render/stroke.rs"]
mod tests;
