use candle_core::{Device, Tensor};

use crate::config::model::SinkhornConfig;
use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};
use crate::foundation::math::logsumexp;

const MASS_FLOOR: f64 = 1e-6;

/// Box-averaging matrix `(out, len)` mapping `len` samples onto `out` bins.
fn pooling_matrix(len: usize, out: usize, device: &Device) -> PaintResult<Tensor> {
    let mut data = vec![0f32; out * len];
    let mut counts = vec![0usize; out];
    for i in 0..len {
        counts[i * out / len] += 1;
    }
    for i in 0..len {
        let bin = i * out / len;
        data[bin * len + i] = 1.0 / counts[bin] as f32;
    }
    Ok(Tensor::from_vec(data, (out, len), device)?)
}

/// Pairwise half squared distances between cell centers of an `rows x cols` grid in the unit
/// square, `(n, n)` with `n = rows * cols`.
fn grid_cost(rows: usize, cols: usize, device: &Device) -> PaintResult<Tensor> {
    let scale = rows.max(cols) as f32;
    let centers: Vec<(f32, f32)> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| ((c as f32 + 0.5) / scale, (r as f32 + 0.5) / scale)))
        .collect();
    let n = centers.len();
    let mut data = Vec::with_capacity(n * n);
    for &(xi, yi) in &centers {
        for &(xj, yj) in &centers {
            data.push(0.5 * ((xi - xj).powi(2) + (yi - yj).powi(2)));
        }
    }
    Ok(Tensor::from_vec(data, (n, n), device)?)
}

/// Entropic optimal transport between the ink distributions of two rasters.
///
/// Ink is `1 - luminance`, box-pooled to a small grid and normalized to unit mass. The loss is
/// the debiased Sinkhorn divergence; dual potentials are solved detached and the gradient flows
/// through the current raster's mass only.
pub struct SinkhornLoss {
    cfg: SinkhornConfig,
}

impl SinkhornLoss {
    pub fn new(cfg: SinkhornConfig) -> PaintResult<Self> {
        if !(cfg.blur.is_finite() && cfg.blur > 0.0) || cfg.iterations == 0 || cfg.resolution == 0 {
            return Err(PaintError::config(
                "sinkhorn blur, iterations and resolution must be positive",
            ));
        }
        Ok(Self { cfg })
    }

    fn eps(&self) -> f64 {
        self.cfg.blur * self.cfg.blur
    }

    // Normalized pooled ink mass, flattened to `(n,)`.
    fn ink_mass(&self, raster: &Raster, py: &Tensor, px: &Tensor) -> PaintResult<Tensor> {
        let ink = raster.luminance()?.affine(-1.0, 1.0)?;
        let pooled = py.matmul(&ink)?.matmul(&px.t()?.contiguous()?)?;
        let mass = pooled.flatten_all()?.affine(1.0, MASS_FLOOR)?;
        let total = mass.sum_all()?;
        Ok(mass.broadcast_div(&total)?)
    }

    // `f_i = -eps * LSE_j(log b_j + (g_j - C_ij) / eps)`.
    fn softmin(&self, cost: &Tensor, log_b: &Tensor, g: &Tensor) -> PaintResult<Tensor> {
        let eps = self.eps();
        let m = g
            .unsqueeze(0)?
            .broadcast_sub(cost)?
            .affine(1.0 / eps, 0.0)?
            .broadcast_add(&log_b.unsqueeze(0)?)?;
        Ok(logsumexp(&m, 1)?.affine(-eps, 0.0)?)
    }

    // Potentials `(f, g)` for the pair `(a, b)` on a symmetric cost.
    fn potentials(&self, cost: &Tensor, a: &Tensor, b: &Tensor) -> PaintResult<(Tensor, Tensor)> {
        let (log_a, log_b) = (a.log()?, b.log()?);
        let mut f = a.zeros_like()?;
        let mut g = b.zeros_like()?;
        for _ in 0..self.cfg.iterations {
            f = self.softmin(cost, &log_b, &g)?;
            g = self.softmin(cost, &log_a, &f)?;
        }
        Ok((f, g))
    }

    // Symmetric potential for `(a, a)` with averaged updates.
    fn self_potential(&self, cost: &Tensor, a: &Tensor) -> PaintResult<Tensor> {
        let log_a = a.log()?;
        let mut p = a.zeros_like()?;
        for _ in 0..self.cfg.iterations {
            let next = self.softmin(cost, &log_a, &p)?;
            p = ((p + next)? * 0.5)?;
        }
        Ok(p)
    }

    /// Debiased divergence between `current` (differentiable) and `reference` (treated as
    /// constant). Scalar tensor.
    pub fn divergence(&self, current: &Raster, reference: &Raster) -> PaintResult<Tensor> {
        if current.dims() != reference.dims() {
            return Err(PaintError::config(format!(
                "sinkhorn loss needs equal sizes, got {:?} and {:?}",
                current.dims(),
                reference.dims()
            )));
        }
        let (h, w, _) = current.dims();
        let (rows, cols) = (self.cfg.resolution.min(h), self.cfg.resolution.min(w));
        let device = current.device();
        let py = pooling_matrix(h, rows, device)?;
        let px = pooling_matrix(w, cols, device)?;
        let cost = grid_cost(rows, cols, device)?;

        let a = self.ink_mass(current, &py, &px)?;
        let b = self.ink_mass(&reference.detach(), &py, &px)?;
        let a_const = a.detach();

        let (f, g) = self.potentials(&cost, &a_const, &b)?;
        let p_a = self.self_potential(&cost, &a_const)?;
        let p_b = self.self_potential(&cost, &b)?;
        let fa = (f - p_a)?.detach();
        let gb = (g - p_b)?.detach();
        Ok(((a * fa)?.sum_all()? + (b * gb)?.sum_all()?)?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/loss/sinkhorn.rs"]
mod tests;
