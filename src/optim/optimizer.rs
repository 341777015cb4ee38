use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use crate::config::model::{LrDecay, OptimFlags, StageConfig};
use crate::foundation::error::{PaintError, PaintResult};
use crate::optim::schedule::decay_multiplier;
use crate::render::painter::StrokeRenderer;

/// Parameter group identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKind {
    Points,
    Widths,
    Rgb,
    Alpha,
}

/// Upper bounds enforced after every step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamLimits {
    pub max_width: f32,
    pub max_alpha: f32,
}

struct Group {
    kind: GroupKind,
    var: Var,
    opt: AdamW,
    base_lr: f64,
}

/// Independent Adam optimizers over the renderer's parameter groups.
///
/// Gradients accumulate across [`StrokeOptimizer::backward`] calls until
/// [`StrokeOptimizer::zero_gradients`].
pub struct StrokeOptimizer {
    groups: Vec<Group>,
    grads: Option<GradStore>,
    decay: LrDecay,
    limits: ParamLimits,
}

fn adam(var: &Var, lr: f64) -> PaintResult<AdamW> {
    let params = ParamsAdamW {
        lr,
        weight_decay: 0.0,
        ..ParamsAdamW::default()
    };
    Ok(AdamW::new(vec![var.clone()], params)?)
}

impl StrokeOptimizer {
    /// Build one optimizer per enabled group.
    ///
    /// Points are always optimized. `optimize_rgba` enables RGB and alpha, `optimize_opacity`
    /// alone enables alpha only.
    pub fn init_groups(
        renderer: &dyn StrokeRenderer,
        stage: &StageConfig,
        flags: OptimFlags,
        limits: ParamLimits,
    ) -> PaintResult<Self> {
        let p = renderer.parameter_groups();
        let mut enabled = vec![(GroupKind::Points, p.points, stage.lr)];
        if flags.optimize_width {
            enabled.push((GroupKind::Widths, p.widths, stage.width_lr));
        }
        if flags.optimize_rgba {
            enabled.push((GroupKind::Rgb, p.rgb, stage.color_lr));
        }
        if flags.optimize_rgba || flags.optimize_opacity {
            enabled.push((GroupKind::Alpha, p.alpha, stage.color_lr));
        }

        let groups = enabled
            .into_iter()
            .map(|(kind, var, lr)| {
                Ok(Group {
                    kind,
                    opt: adam(&var, lr)?,
                    var,
                    base_lr: lr,
                })
            })
            .collect::<PaintResult<Vec<_>>>()?;
        tracing::debug!(
            groups = ?groups.iter().map(|g| g.kind).collect::<Vec<_>>(),
            "initialized stroke optimizer"
        );
        Ok(Self {
            groups,
            grads: None,
            decay: stage.decay,
            limits,
        })
    }

    pub fn active_groups(&self) -> Vec<GroupKind> {
        self.groups.iter().map(|g| g.kind).collect()
    }

    pub fn zero_gradients(&mut self) {
        self.grads = None;
    }

    /// Accumulate gradients of `loss` into the store.
    pub fn backward(&mut self, loss: &Tensor) -> PaintResult<()> {
        let mut fresh = loss.backward()?;
        if let Some(mut prev) = self.grads.take() {
            for g in &self.groups {
                let key = g.var.as_tensor();
                if let Some(old) = prev.remove(key) {
                    let merged = match fresh.remove(key) {
                        Some(new) => (new + old)?,
                        None => old,
                    };
                    fresh.insert(key, merged);
                }
            }
        }
        self.grads = Some(fresh);
        Ok(())
    }

    /// Step every group, then clamp widths, RGB and alpha into range.
    pub fn apply_gradients(&mut self) -> PaintResult<()> {
        let Some(grads) = self.grads.as_ref() else {
            return Ok(());
        };
        for g in &mut self.groups {
            g.opt.step(grads)?;
        }
        for g in &self.groups {
            let t = g.var.as_tensor();
            match g.kind {
                GroupKind::Points => {}
                GroupKind::Widths => g.var.set(&t.clamp(0f32, self.limits.max_width)?)?,
                GroupKind::Rgb => g.var.set(&t.clamp(0f32, 1f32)?)?,
                GroupKind::Alpha => g.var.set(&t.clamp(0f32, self.limits.max_alpha)?)?,
            }
            let finite = g
                .var
                .as_tensor()
                .flatten_all()?
                .to_vec1::<f32>()?
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(PaintError::numeric(format!(
                    "non-finite {:?} parameters after optimizer step",
                    g.kind
                )));
            }
        }
        Ok(())
    }

    /// Apply the scheduled decay for `step`. Rates never increase and never exceed the initial
    /// rate of their group. Returns the current rate.
    pub fn decay_learning_rate(&mut self, step: u32, decay_steps: &[u32]) -> f64 {
        let mult = decay_multiplier(self.decay, step, decay_steps);
        for g in &mut self.groups {
            let lr = g.opt.learning_rate().min(g.base_lr * mult);
            g.opt.set_learning_rate(lr);
        }
        self.current_learning_rate()
    }

    /// Control-point rate, or the first active group's.
    pub fn current_learning_rate(&self) -> f64 {
        self.groups
            .iter()
            .find(|g| g.kind == GroupKind::Points)
            .or_else(|| self.groups.first())
            .map_or(0.0, |g| g.opt.learning_rate())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optim/optimizer.rs"]
mod tests;
