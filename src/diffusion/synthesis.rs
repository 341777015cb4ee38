use candle_core::Tensor;

use crate::config::model::AdapterScale;
use crate::diffusion::inversion::{LatentTrajectory, gaussian_like};
use crate::diffusion::model::{DiffusionModel, GenerationRequest, StepHook};
use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};

/// Inputs to a trajectory-guided generation.
#[derive(Clone, Debug)]
pub struct SynthesisRequest<'a> {
    /// One output image per prompt. Slot 0 tracks the inverted trajectory.
    pub prompts: Vec<String>,
    /// Either a single negative prompt or one per prompt.
    pub negative_prompts: Vec<String>,
    pub trajectory: &'a LatentTrajectory,
    /// Denoising step whose trajectory latent seeds slot 0.
    pub offset: usize,
    pub style_image: &'a Raster,
    pub adapter_scale: AdapterScale,
    pub height: usize,
    pub width: usize,
    pub num_steps: usize,
    pub guidance_scale: f64,
    pub seed: u64,
}

/// Decoded generations, in prompt order.
#[derive(Clone, Debug)]
pub struct SynthesisOutput {
    pub images: Vec<Raster>,
    /// Decoded starting latent of the tracked slot.
    pub injected: Raster,
}

impl SynthesisOutput {
    /// The content image used as the stage-2 target: the last generation.
    pub fn target(&self) -> Option<&Raster> {
        self.images.last()
    }
}

/// Re-injects the inverted trajectory into slot 0 after every denoising step.
pub struct TrajectoryOverride<'a> {
    trajectory: &'a LatentTrajectory,
    offset: usize,
}

impl<'a> TrajectoryOverride<'a> {
    pub fn new(trajectory: &'a LatentTrajectory, offset: usize) -> Self {
        Self { trajectory, offset }
    }

    /// Trajectory index (in denoising order) written after step `step`.
    pub fn index_after(&self, step: usize) -> usize {
        (self.offset + 1).max(step + 1)
    }
}

impl StepHook for TrajectoryOverride<'_> {
    fn on_step_end(&mut self, step: usize, _timestep: usize, latents: Tensor) -> PaintResult<Tensor> {
        let state = self.trajectory.at_denoising_step(self.index_after(step))?;
        replace_slot(&latents, 0, state)
    }
}

/// Copy of `batch` with row `slot` replaced by `value` (`(1, ...)`).
pub(crate) fn replace_slot(batch: &Tensor, slot: usize, value: &Tensor) -> PaintResult<Tensor> {
    let n = batch.dim(0)?;
    if slot >= n {
        return Err(PaintError::config(format!(
            "slot {slot} outside a batch of {n}"
        )));
    }
    let value = value.to_dtype(batch.dtype())?;
    let mut parts = Vec::with_capacity(3);
    if slot > 0 {
        parts.push(batch.narrow(0, 0, slot)?);
    }
    parts.push(value);
    if slot + 1 < n {
        parts.push(batch.narrow(0, slot + 1, n - slot - 1)?);
    }
    Ok(Tensor::cat(&parts, 0)?)
}

fn validate<M: DiffusionModel + ?Sized>(model: &M, req: &SynthesisRequest<'_>) -> PaintResult<()> {
    if req.prompts.is_empty() {
        return Err(PaintError::config("synthesis needs at least one prompt"));
    }
    let (n_neg, n_pos) = (req.negative_prompts.len(), req.prompts.len());
    if n_neg != 1 && n_neg != n_pos {
        return Err(PaintError::config(format!(
            "expected 1 or {n_pos} negative prompts, got {n_neg}"
        )));
    }
    let traj_steps = req.trajectory.num_steps();
    if req.num_steps == 0 || req.num_steps != traj_steps {
        return Err(PaintError::config(format!(
            "step count {} must match the trajectory length {traj_steps}",
            req.num_steps
        )));
    }
    if req.offset >= req.num_steps {
        return Err(PaintError::config(format!(
            "trajectory offset {} must be below the step count {}",
            req.offset, req.num_steps
        )));
    }
    let f = model.vae_scale_factor();
    if req.height == 0 || req.width == 0 || req.height % f != 0 || req.width % f != 0 {
        return Err(PaintError::config(format!(
            "output size {}x{} must be a positive multiple of {f}",
            req.width, req.height
        )));
    }
    let expected = [1, model.latent_channels(), req.height / f, req.width / f];
    if req.trajectory.clean().dims() != expected {
        return Err(PaintError::config(format!(
            "trajectory latents {:?} do not match the output size (expected {expected:?})",
            req.trajectory.clean().dims()
        )));
    }
    Ok(())
}

/// Generate one image per prompt with slot 0 locked to the inverted trajectory.
///
/// With three or more prompts, slot 1 starts from the same latent as slot 0 and is then left
/// free, which keeps the style/content pair aligned.
#[tracing::instrument(skip_all, fields(prompts = req.prompts.len(), offset = req.offset))]
pub fn synthesize<M: DiffusionModel + ?Sized>(
    model: &mut M,
    req: SynthesisRequest<'_>,
) -> PaintResult<SynthesisOutput> {
    validate(model, &req)?;
    let batch = req.prompts.len();
    let f = model.vae_scale_factor();

    let prompts: Vec<&str> = req.prompts.iter().map(String::as_str).collect();
    let negatives: Vec<&str> = if req.negative_prompts.len() == 1 {
        vec![req.negative_prompts[0].as_str(); batch]
    } else {
        req.negative_prompts.iter().map(String::as_str).collect()
    };
    let prompt_embeds = model
        .encode_prompt(&prompts)
        .map_err(PaintError::into_inference)?;
    let negative_embeds = model
        .encode_prompt(&negatives)
        .map_err(PaintError::into_inference)?;
    let style = model
        .prepare_style(req.style_image, &req.adapter_scale, req.height, req.width)
        .map_err(PaintError::into_inference)?;

    let injected = req.trajectory.at_denoising_step(req.offset)?;
    let shape = Tensor::zeros(
        (batch, model.latent_channels(), req.height / f, req.width / f),
        injected.dtype(),
        injected.device(),
    )?;
    let mut latents = gaussian_like(&shape, req.seed)?;
    latents = replace_slot(&latents, 0, injected)?;
    if batch >= 3 {
        latents = replace_slot(&latents, 1, injected)?;
    }

    let mut hook = TrajectoryOverride::new(req.trajectory, req.offset);
    let out = model.generate(
        GenerationRequest {
            prompt_embeds: &prompt_embeds,
            negative_embeds: &negative_embeds,
            latents,
            style: Some(&style),
            num_steps: req.num_steps,
            guidance_scale: req.guidance_scale,
        },
        &mut hook,
    )?;

    let images = model
        .decode_latents(&out)
        .map_err(PaintError::into_inference)?;
    let injected = model
        .decode_latents(injected)
        .map_err(PaintError::into_inference)?
        .into_iter()
        .next()
        .ok_or_else(|| PaintError::inference("decoder returned no image for the injected latent"))?;
    Ok(SynthesisOutput { images, injected })
}

#[cfg(test)]
#[path = "../../tests/unit/diffusion/synthesis.rs"]
mod tests;
