use candle_core::Tensor;

use crate::foundation::error::{PaintError, PaintResult};
use crate::loss::mse;
use crate::render::stroke::{bezier_basis, sample_polylines, segment_count};

/// Dense sampling used when comparing curves.
pub const BEZIER_LOSS_SAMPLES: usize = 32;

/// Control points relative to their stroke's first point: `(N, P, 2) -> (N, P, 2)`.
///
/// Invariant to translating a whole stroke, so the term preserves shape but lets strokes move.
pub fn relative_positions(points: &Tensor) -> PaintResult<Tensor> {
    let anchor = points.narrow(1, 0, 1)?;
    Ok(points.broadcast_sub(&anchor)?)
}

fn check_same_shape(current: &Tensor, reference: &Tensor) -> PaintResult<()> {
    if current.dims() != reference.dims() || current.rank() != 3 || current.dim(2)? != 2 {
        return Err(PaintError::config(format!(
            "positional loss needs matching (N, P, 2) point sets, got {:?} and {:?}",
            current.dims(),
            reference.dims()
        )));
    }
    Ok(())
}

/// MSE between relative-position encodings of current and reference control points.
pub fn relative_position_loss(current: &Tensor, reference: &Tensor) -> PaintResult<Tensor> {
    check_same_shape(current, reference)?;
    mse(
        &relative_positions(current)?,
        &relative_positions(&reference.detach())?,
    )
}

/// MSE between densely sampled Bezier curves of current and reference control points.
pub fn bezier_curve_loss(current: &Tensor, reference: &Tensor) -> PaintResult<Tensor> {
    check_same_shape(current, reference)?;
    let segments = segment_count(current.dim(1)?).ok_or_else(|| {
        PaintError::config(format!(
            "{} control points do not form chained cubic segments",
            current.dim(1).unwrap_or(0)
        ))
    })?;
    let basis = bezier_basis(segments, BEZIER_LOSS_SAMPLES, current.device())?;
    mse(
        &sample_polylines(current, &basis)?,
        &sample_polylines(&reference.detach(), &basis)?,
    )
}

#[cfg(test)]
#[path = "../../tests/unit/loss/position.rs"]
mod tests;
