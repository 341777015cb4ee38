use candle_core::Tensor;

use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};
use crate::foundation::math::gaussian_window;

const WINDOW: usize = 11;
const SIGMA: f64 = 1.5;
const C1: f64 = 0.01 * 0.01;
const C2: f64 = 0.03 * 0.03;
const MS_WEIGHTS: [f64; 5] = [0.0448, 0.2856, 0.3001, 0.2363, 0.1333];

// Separable Gaussian filter over `(C, 1, H, W)`, valid region only.
fn blur(x: &Tensor, window: usize) -> PaintResult<Tensor> {
    let w = Tensor::new(gaussian_window(window, SIGMA).as_slice(), x.device())?;
    let kv = w.reshape((1, 1, window, 1))?;
    let kh = w.reshape((1, 1, 1, window))?;
    Ok(x.conv2d(&kv, 0, 1, 1, 1)?.conv2d(&kh, 0, 1, 1, 1)?)
}

// Mean SSIM and mean contrast-structure term for `(C, 1, H, W)` inputs.
fn ssim_and_cs(x: &Tensor, y: &Tensor) -> PaintResult<(Tensor, Tensor)> {
    let (_, _, h, w) = x.dims4()?;
    let window = WINDOW.min(h).min(w);
    let mu_x = blur(x, window)?;
    let mu_y = blur(y, window)?;
    let mu_xx = mu_x.sqr()?;
    let mu_yy = mu_y.sqr()?;
    let mu_xy = (&mu_x * &mu_y)?;
    let var_x = (blur(&x.sqr()?, window)? - &mu_xx)?;
    let var_y = (blur(&y.sqr()?, window)? - &mu_yy)?;
    let cov = (blur(&(x * y)?, window)? - &mu_xy)?;

    let cs_map = (cov.affine(2.0, C2)? / (var_x + var_y)?.affine(1.0, C2)?)?;
    let lum_map = (mu_xy.affine(2.0, C1)? / (mu_xx + mu_yy)?.affine(1.0, C1)?)?;
    let ssim = (lum_map * &cs_map)?.mean_all()?;
    Ok((ssim, cs_map.mean_all()?))
}

fn channels_first(r: &Raster) -> PaintResult<Tensor> {
    // (1, 3, H, W) -> (3, 1, H, W): filter every channel with the same kernel.
    Ok(r.to_nchw()?.transpose(0, 1)?.contiguous()?)
}

fn check_same_size(x: &Raster, y: &Raster) -> PaintResult<()> {
    if x.dims() != y.dims() {
        return Err(PaintError::config(format!(
            "structural loss needs equal sizes, got {:?} and {:?}",
            x.dims(),
            y.dims()
        )));
    }
    Ok(())
}

/// Mean structural similarity (11x11 Gaussian window, sigma 1.5). Scalar tensor.
pub fn ssim(x: &Raster, y: &Raster) -> PaintResult<Tensor> {
    check_same_size(x, y)?;
    Ok(ssim_and_cs(&channels_first(x)?, &channels_first(y)?)?.0)
}

/// Multi-scale SSIM.
///
/// Small images use fewer scales, keeping every level at least one window wide; the standard
/// per-scale weights are renormalized over the scales actually used.
pub fn ms_ssim(x: &Raster, y: &Raster) -> PaintResult<Tensor> {
    check_same_size(x, y)?;
    let (h, w, _) = x.dims();
    let mut levels = 1;
    let mut side = h.min(w);
    while levels < MS_WEIGHTS.len() && side / 2 >= WINDOW {
        side /= 2;
        levels += 1;
    }
    let total: f64 = MS_WEIGHTS[..levels].iter().sum();

    let mut xs = channels_first(x)?;
    let mut ys = channels_first(y)?;
    let mut acc: Option<Tensor> = None;
    for (level, weight) in MS_WEIGHTS[..levels].iter().enumerate() {
        let (s, cs) = ssim_and_cs(&xs, &ys)?;
        let term = if level + 1 == levels { s } else { cs };
        // Negative similarity at coarse scales would make the power undefined.
        let term = term.clamp(1e-6f32, 1f32)?.powf(weight / total)?;
        acc = Some(match acc {
            Some(a) => (a * term)?,
            None => term,
        });
        if level + 1 < levels {
            xs = xs.avg_pool2d(2)?;
            ys = ys.avg_pool2d(2)?;
        }
    }
    acc.ok_or_else(|| PaintError::numeric("ms-ssim computed no scales"))
}

#[cfg(test)]
#[path = "../../tests/unit/loss/ssim.rs"]
mod tests;
