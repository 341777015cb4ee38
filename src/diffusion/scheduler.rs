use candle_core::Tensor;

use crate::foundation::error::{PaintError, PaintResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BetaSchedule {
    Linear,
    /// Linear in `sqrt(beta)`.
    ScaledLinear,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub beta_start: f64,
    pub beta_end: f64,
    pub beta_schedule: BetaSchedule,
    pub train_timesteps: usize,
    /// Use `1.0` as the alpha product past the last step instead of `alphas_cumprod[0]`.
    pub set_alpha_to_one: bool,
    pub steps_offset: usize,
}

impl SchedulerConfig {
    /// Noise schedule shipped with SDXL checkpoints.
    pub fn sdxl() -> Self {
        Self {
            beta_start: 0.00085,
            beta_end: 0.012,
            beta_schedule: BetaSchedule::ScaledLinear,
            train_timesteps: 1000,
            set_alpha_to_one: false,
            steps_offset: 1,
        }
    }

    /// Classic DDPM linear schedule, used for single-shot forward diffusion.
    pub fn ddpm_linear() -> Self {
        Self {
            beta_start: 1e-4,
            beta_end: 0.02,
            beta_schedule: BetaSchedule::Linear,
            train_timesteps: 1000,
            set_alpha_to_one: true,
            steps_offset: 0,
        }
    }
}

/// Deterministic DDIM sampler (eta = 0) with leading timestep spacing.
#[derive(Clone, Debug)]
pub struct DdimScheduler {
    config: SchedulerConfig,
    alphas_cumprod: Vec<f64>,
    final_alpha_cumprod: f64,
    timesteps: Vec<usize>,
}

impl DdimScheduler {
    pub fn new(config: SchedulerConfig) -> PaintResult<Self> {
        let n = config.train_timesteps;
        if n < 2 {
            return Err(PaintError::config("scheduler needs at least 2 train timesteps"));
        }
        if !(config.beta_start > 0.0 && config.beta_end < 1.0 && config.beta_start <= config.beta_end) {
            return Err(PaintError::config(format!(
                "invalid beta range {}..{}",
                config.beta_start, config.beta_end
            )));
        }
        let betas: Vec<f64> = (0..n)
            .map(|i| {
                let f = i as f64 / (n - 1) as f64;
                match config.beta_schedule {
                    BetaSchedule::Linear => config.beta_start + f * (config.beta_end - config.beta_start),
                    BetaSchedule::ScaledLinear => {
                        let (s, e) = (config.beta_start.sqrt(), config.beta_end.sqrt());
                        (s + f * (e - s)).powi(2)
                    }
                }
            })
            .collect();
        let alphas_cumprod: Vec<f64> = betas
            .iter()
            .scan(1.0, |acc, b| {
                *acc *= 1.0 - b;
                Some(*acc)
            })
            .collect();
        let final_alpha_cumprod = if config.set_alpha_to_one {
            1.0
        } else {
            alphas_cumprod[0]
        };
        Ok(Self {
            config,
            alphas_cumprod,
            final_alpha_cumprod,
            timesteps: Vec::new(),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Choose `num_steps` descending timesteps, `i * ratio + offset`.
    pub fn set_timesteps(&mut self, num_steps: usize) -> PaintResult<()> {
        let train = self.config.train_timesteps;
        if num_steps == 0 || num_steps > train {
            return Err(PaintError::config(format!(
                "inference step count must be in 1..={train}, got {num_steps}"
            )));
        }
        let ratio = train / num_steps;
        self.timesteps = (0..num_steps)
            .rev()
            .map(|i| (i * ratio + self.config.steps_offset).min(train - 1))
            .collect();
        Ok(())
    }

    /// Descending denoising timesteps.
    pub fn timesteps(&self) -> &[usize] {
        &self.timesteps
    }

    pub fn num_inference_steps(&self) -> usize {
        self.timesteps.len()
    }

    pub fn step_ratio(&self) -> usize {
        self.config.train_timesteps / self.timesteps.len().max(1)
    }

    pub fn alpha_cumprod(&self, t: usize) -> f64 {
        self.alphas_cumprod[t.min(self.alphas_cumprod.len() - 1)]
    }

    pub fn final_alpha_cumprod(&self) -> f64 {
        self.final_alpha_cumprod
    }

    fn alpha_at(&self, t: isize) -> f64 {
        if t >= 0 {
            self.alpha_cumprod(t as usize)
        } else {
            self.final_alpha_cumprod
        }
    }

    /// One denoising step from `t` to `t - ratio`.
    pub fn step(&self, noise_pred: &Tensor, t: usize, sample: &Tensor) -> PaintResult<Tensor> {
        let prev = t as isize - self.step_ratio() as isize;
        let alpha_t = self.alpha_cumprod(t);
        let alpha_prev = self.alpha_at(prev);
        transfer(noise_pred, sample, alpha_t, alpha_prev)
    }

    /// One inversion step towards `t` from `t - ratio`: the algebraic inverse of [`Self::step`]
    /// for a fixed noise prediction.
    pub fn inversion_step(&self, noise_pred: &Tensor, t: usize, sample: &Tensor) -> PaintResult<Tensor> {
        let cur = (t as isize - self.step_ratio() as isize).min(self.config.train_timesteps as isize - 1);
        let alpha_cur = self.alpha_at(cur);
        let alpha_next = self.alpha_cumprod(t);
        transfer(noise_pred, sample, alpha_cur, alpha_next)
    }

    /// Forward-diffuse `original` to `t` in one shot.
    pub fn add_noise(&self, original: &Tensor, noise: &Tensor, t: usize) -> PaintResult<Tensor> {
        if t >= self.config.train_timesteps {
            return Err(PaintError::config(format!(
                "timestep {t} outside the {}-step schedule",
                self.config.train_timesteps
            )));
        }
        let a = self.alpha_cumprod(t);
        Ok((original.affine(a.sqrt(), 0.0)? + noise.affine((1.0 - a).sqrt(), 0.0)?)?)
    }
}

// Predict x0 at `alpha_from`, then re-noise it to `alpha_to` along the same noise direction.
fn transfer(noise_pred: &Tensor, sample: &Tensor, alpha_from: f64, alpha_to: f64) -> PaintResult<Tensor> {
    let pred_original = ((sample - noise_pred.affine((1.0 - alpha_from).sqrt(), 0.0)?)?)
        .affine(1.0 / alpha_from.sqrt(), 0.0)?;
    let direction = noise_pred.affine((1.0 - alpha_to).sqrt(), 0.0)?;
    Ok((pred_original.affine(alpha_to.sqrt(), 0.0)? + direction)?)
}

#[cfg(test)]
#[path = "../../tests/unit/diffusion/scheduler.rs"]
mod tests;
