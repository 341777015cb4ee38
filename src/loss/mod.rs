//! Loss terms and their weighted composition.

use candle_core::Tensor;

use crate::foundation::error::PaintResult;

/// Weighted reconstruction, structural and positional terms.
pub mod composer;
/// Relative-position and Bezier shape preservation.
pub mod position;
/// Entropic optimal transport between ink distributions.
pub mod sinkhorn;
/// SSIM and MS-SSIM.
pub mod ssim;

/// Mean squared error over all elements.
pub(crate) fn mse(x: &Tensor, y: &Tensor) -> PaintResult<Tensor> {
    Ok((x - y)?.sqr()?.mean_all()?)
}
