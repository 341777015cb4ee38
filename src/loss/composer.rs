use std::fmt;

use candle_core::{DType, Tensor};

use crate::config::model::{LossConfig, PositionLoss, SinkhornConfig, StructuralMetric};
use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};
use crate::loss::mse;
use crate::loss::position::{bezier_curve_loss, relative_position_loss};
use crate::loss::sinkhorn::SinkhornLoss;
use crate::loss::ssim::{ms_ssim, ssim};

/// Static weights of the three loss terms. Read-only during a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossWeights {
    pub reconstruction: f64,
    pub structural: f64,
    pub positional: f64,
}

/// Per-iteration inputs beyond the two rasters.
#[derive(Clone, Copy, Debug, Default)]
pub struct LossContext<'a> {
    /// Current control points, `(N, P, 2)`. Needed by the `pos` and `bez` terms.
    pub points: Option<&'a Tensor>,
    /// Control points the positional term pulls toward (the stage-1 result).
    pub reference_points: Option<&'a Tensor>,
    /// Style raster, the reference of the `sinkhorn` term.
    pub style: Option<&'a Raster>,
}

/// Weighted term values of one evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LossBreakdown {
    pub reconstruction: f32,
    pub structural: f32,
    pub positional: f32,
    pub total: f32,
}

impl fmt::Display for LossBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total {:.6} (l2 {:.6}, struct {:.6}, pos {:.6})",
            self.total, self.reconstruction, self.structural, self.positional
        )
    }
}

/// Builds the differentiable objective from the configured terms.
pub struct LossComposer {
    weights: LossWeights,
    metric: StructuralMetric,
    position: PositionLoss,
    sinkhorn: SinkhornLoss,
}

fn check_weight(name: &str, value: f64) -> PaintResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PaintError::config(format!(
            "{name} weight must be finite and >= 0, got {value}"
        )));
    }
    Ok(())
}

fn scalar_value(name: &str, t: &Tensor) -> PaintResult<f32> {
    let v = t.to_dtype(DType::F32)?.to_scalar::<f32>()?;
    if !v.is_finite() {
        return Err(PaintError::numeric(format!("{name} loss is {v}")));
    }
    Ok(v)
}

impl LossComposer {
    pub fn new(cfg: &LossConfig) -> PaintResult<Self> {
        let weights = LossWeights {
            reconstruction: cfg.l2_weight,
            structural: cfg.struct_loss_weight,
            positional: cfg.pos_loss_weight,
        };
        check_weight("reconstruction", weights.reconstruction)?;
        check_weight("structural", weights.structural)?;
        check_weight("positional", weights.positional)?;
        Ok(Self {
            weights,
            metric: cfg.struct_loss,
            position: cfg.pos_type,
            sinkhorn: SinkhornLoss::new(cfg.sinkhorn)?,
        })
    }

    /// Plain weighted MSE, as used while imitating the style image.
    pub fn reconstruction_only() -> PaintResult<Self> {
        Ok(Self {
            weights: LossWeights {
                reconstruction: 1.0,
                structural: 0.0,
                positional: 0.0,
            },
            metric: StructuralMetric::None,
            position: PositionLoss::Pos,
            sinkhorn: SinkhornLoss::new(SinkhornConfig::default())?,
        })
    }

    pub fn weights(&self) -> LossWeights {
        self.weights
    }

    fn structural(&self, raster: &Raster, target: &Raster) -> PaintResult<Option<Tensor>> {
        let similarity = match self.metric {
            StructuralMetric::None => return Ok(None),
            _ if self.weights.structural == 0.0 => return Ok(None),
            StructuralMetric::Ssim => ssim(raster, target)?,
            StructuralMetric::Msssim => ms_ssim(raster, target)?,
        };
        Ok(Some(similarity.affine(-self.weights.structural, self.weights.structural)?))
    }

    fn positional(&self, raster: &Raster, ctx: &LossContext<'_>) -> PaintResult<Option<Tensor>> {
        if self.weights.positional == 0.0 {
            return Ok(None);
        }
        let term = match self.position {
            PositionLoss::Sinkhorn => {
                let style = ctx.style.ok_or_else(|| {
                    PaintError::config("sinkhorn position loss needs the style raster")
                })?;
                let style = if style.dims() == raster.dims() {
                    style.detach()
                } else {
                    style.resize(raster.width() as u32, raster.height() as u32)?
                };
                self.sinkhorn.divergence(raster, &style)?
            }
            kind => {
                let (Some(points), Some(reference)) = (ctx.points, ctx.reference_points) else {
                    return Err(PaintError::config(format!(
                        "{kind} position loss needs current and reference control points"
                    )));
                };
                match kind {
                    PositionLoss::Bez => bezier_curve_loss(points, reference)?,
                    _ => relative_position_loss(points, reference)?,
                }
            }
        };
        Ok(Some(term.affine(self.weights.positional, 0.0)?))
    }

    /// Weighted total and its breakdown. Terms with zero weight are skipped and reported as 0.
    pub fn compose(
        &self,
        raster: &Raster,
        target: &Raster,
        ctx: &LossContext<'_>,
    ) -> PaintResult<(Tensor, LossBreakdown)> {
        if raster.dims() != target.dims() {
            return Err(PaintError::config(format!(
                "raster {:?} and target {:?} differ in size",
                raster.dims(),
                target.dims()
            )));
        }

        let reconstruction = if self.weights.reconstruction == 0.0 {
            None
        } else {
            Some(
                mse(raster.tensor(), &target.tensor().detach())?
                    .affine(self.weights.reconstruction, 0.0)?,
            )
        };
        let structural = self.structural(raster, &target.detach())?;
        let positional = self.positional(raster, ctx)?;

        let mut breakdown = LossBreakdown::default();
        let mut total: Option<Tensor> = None;
        for (name, term, slot) in [
            ("reconstruction", reconstruction, &mut breakdown.reconstruction),
            ("structural", structural, &mut breakdown.structural),
            ("positional", positional, &mut breakdown.positional),
        ] {
            let Some(term) = term else { continue };
            *slot = scalar_value(name, &term)?;
            total = Some(match total {
                Some(acc) => (acc + term)?,
                None => term,
            });
        }

        let total = match total {
            Some(t) => t,
            None => Tensor::zeros((), DType::F32, raster.device())?,
        };
        breakdown.total = scalar_value("total", &total)?;
        Ok((total, breakdown))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/loss/composer.rs"]
mod tests;
