use candle_core::Tensor;

use crate::config::model::AdapterScale;
use crate::diffusion::scheduler::DdimScheduler;
use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};

/// Text conditioning for a batch of prompts. Row `i` belongs to prompt `i`.
#[derive(Clone, Debug)]
pub struct PromptEmbeds {
    pub hidden: Tensor,
    pub pooled: Tensor,
}

impl PromptEmbeds {
    pub fn batch_size(&self) -> PaintResult<usize> {
        Ok(self.hidden.dim(0)?)
    }

    /// Stack embeddings along the batch dimension, in order.
    pub fn concat(parts: &[&PromptEmbeds]) -> PaintResult<Self> {
        let hidden: Vec<&Tensor> = parts.iter().map(|p| &p.hidden).collect();
        let pooled: Vec<&Tensor> = parts.iter().map(|p| &p.pooled).collect();
        Ok(Self {
            hidden: Tensor::cat(&hidden, 0)?,
            pooled: Tensor::cat(&pooled, 0)?,
        })
    }
}

/// Style adapter conditioning prepared once per generation.
#[derive(Clone, Debug)]
pub struct StyleConditioning {
    pub embedding: Tensor,
    pub scale: AdapterScale,
}

/// Inputs to one guided generation.
#[derive(Clone, Debug)]
pub struct GenerationRequest<'a> {
    /// One embedding row per output image.
    pub prompt_embeds: &'a PromptEmbeds,
    /// Same batch size as `prompt_embeds`.
    pub negative_embeds: &'a PromptEmbeds,
    /// Initial noisy latents, `(B, C, h, w)`.
    pub latents: Tensor,
    pub style: Option<&'a StyleConditioning>,
    pub num_steps: usize,
    pub guidance_scale: f64,
}

/// Per-step callback invoked after every denoising update. It may replace the latents.
pub trait StepHook {
    fn on_step_end(&mut self, step: usize, timestep: usize, latents: Tensor) -> PaintResult<Tensor>;
}

/// Hook that leaves the latents untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHook;

impl StepHook for NoopHook {
    fn on_step_end(&mut self, _step: usize, _timestep: usize, latents: Tensor) -> PaintResult<Tensor> {
        Ok(latents)
    }
}

/// Text-to-image latent diffusion model with a style adapter.
///
/// Implementations wrap a real network or the closed-form [`AnalyticDiffusion`]. Failures inside
/// model calls surface as [`PaintError::Inference`].
///
/// [`AnalyticDiffusion`]: crate::diffusion::analytic::AnalyticDiffusion
pub trait DiffusionModel {
    /// Short identifier used in run directory names.
    fn model_id(&self) -> &str;

    fn latent_channels(&self) -> usize;

    /// Pixel-to-latent downsampling factor.
    fn vae_scale_factor(&self) -> usize {
        8
    }

    fn scheduler(&self) -> &DdimScheduler;

    fn scheduler_mut(&mut self) -> &mut DdimScheduler;

    /// Encode an RGB image into a `(1, C, H / f, W / f)` latent.
    fn encode_image(&self, image: &Raster) -> PaintResult<Tensor>;

    /// Encode prompts. The empty prompt maps to all-zero embeddings.
    fn encode_prompt(&self, prompts: &[&str]) -> PaintResult<PromptEmbeds>;

    /// Prepare style adapter conditioning for outputs of `height x width` pixels.
    fn prepare_style(
        &self,
        image: &Raster,
        scale: &AdapterScale,
        height: usize,
        width: usize,
    ) -> PaintResult<StyleConditioning>;

    /// Noise prediction for a batch of latents at timestep `t`.
    fn predict_noise(
        &self,
        latents: &Tensor,
        t: usize,
        embeds: &PromptEmbeds,
        style: Option<&StyleConditioning>,
    ) -> PaintResult<Tensor>;

    /// Decode `(B, C, h, w)` latents into `B` RGB images.
    fn decode_latents(&self, latents: &Tensor) -> PaintResult<Vec<Raster>>;

    /// Describe an image in words.
    fn caption(&self, _image: &Raster) -> PaintResult<String> {
        Err(PaintError::inference(format!(
            "model '{}' does not support captioning",
            self.model_id()
        )))
    }

    /// Classifier-free guided noise prediction: `uncond + g * (cond - uncond)`.
    fn guided_noise(
        &self,
        latents: &Tensor,
        t: usize,
        embeds: &PromptEmbeds,
        style: Option<&StyleConditioning>,
        guidance_scale: f64,
    ) -> PaintResult<Tensor> {
        let doubled = Tensor::cat(&[latents, latents], 0)?;
        let pred = self
            .predict_noise(&doubled, t, embeds, style)
            .map_err(PaintError::into_inference)?;
        let parts = pred.chunk(2, 0)?;
        let (uncond, cond) = (&parts[0], &parts[1]);
        Ok((uncond + (cond - uncond)?.affine(guidance_scale, 0.0)?)?)
    }

    /// Iterative guided DDIM denoising; `hook` runs after every step.
    fn generate(&mut self, request: GenerationRequest<'_>, hook: &mut dyn StepHook) -> PaintResult<Tensor> {
        let batch = request.latents.dim(0)?;
        if request.prompt_embeds.batch_size()? != batch || request.negative_embeds.batch_size()? != batch {
            return Err(PaintError::config(format!(
                "embedding batch does not match {batch} latents"
            )));
        }
        self.scheduler_mut().set_timesteps(request.num_steps)?;
        let embeds = PromptEmbeds::concat(&[request.negative_embeds, request.prompt_embeds])?;
        let timesteps = self.scheduler().timesteps().to_vec();

        let mut latents = request.latents;
        for (i, &t) in timesteps.iter().enumerate() {
            let noise = self.guided_noise(&latents, t, &embeds, request.style, request.guidance_scale)?;
            latents = self.scheduler().step(&noise, t, &latents)?;
            latents = hook.on_step_end(i, t, latents)?;
            tracing::debug!(step = i, timestep = t, "denoising step");
        }
        Ok(latents)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/diffusion/model.rs"]
mod tests;
