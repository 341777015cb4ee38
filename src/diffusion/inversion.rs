use candle_core::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use crate::diffusion::model::{DiffusionModel, GenerationRequest, NoopHook};
use crate::diffusion::scheduler::{DdimScheduler, SchedulerConfig};
use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};

/// Latents of a deterministic noising trajectory.
///
/// Index 0 is the clean image latent and index `num_steps()` the noisiest one. Immutable once
/// built.
#[derive(Clone, Debug)]
pub struct LatentTrajectory {
    states: Vec<Tensor>,
}

impl LatentTrajectory {
    pub fn new(states: Vec<Tensor>) -> PaintResult<Self> {
        if states.len() < 2 {
            return Err(PaintError::config(
                "a latent trajectory needs a clean and at least one noised state",
            ));
        }
        Ok(Self { states })
    }

    /// Number of noising steps (states minus one).
    pub fn num_steps(&self) -> usize {
        self.states.len() - 1
    }

    pub fn get(&self, idx: usize) -> Option<&Tensor> {
        self.states.get(idx)
    }

    pub fn clean(&self) -> &Tensor {
        &self.states[0]
    }

    pub fn noisiest(&self) -> &Tensor {
        &self.states[self.states.len() - 1]
    }

    /// State reached after `k` denoising steps from the noisiest latent.
    pub fn at_denoising_step(&self, k: usize) -> PaintResult<&Tensor> {
        let n = self.num_steps();
        if k > n {
            return Err(PaintError::config(format!(
                "denoising step {k} is past the {n}-step trajectory"
            )));
        }
        Ok(&self.states[n - k])
    }

    pub fn states(&self) -> &[Tensor] {
        &self.states
    }
}

/// DDIM-invert `image` under `prompt` with classifier-free guidance.
#[tracing::instrument(skip(model, image), fields(model = model.model_id()))]
pub fn invert<M: DiffusionModel + ?Sized>(
    model: &mut M,
    image: &Raster,
    prompt: &str,
    num_steps: usize,
    guidance_scale: f64,
) -> PaintResult<LatentTrajectory> {
    let z0 = model.encode_image(image).map_err(PaintError::into_inference)?;
    let embeds = model
        .encode_prompt(&["", prompt])
        .map_err(PaintError::into_inference)?;
    model.scheduler_mut().set_timesteps(num_steps)?;
    let timesteps = model.scheduler().timesteps().to_vec();

    let mut states = Vec::with_capacity(num_steps + 1);
    let mut latent = z0.detach();
    states.push(latent.clone());
    for (i, &t) in timesteps.iter().rev().enumerate() {
        let noise = model.guided_noise(&latent, t, &embeds, None, guidance_scale)?;
        latent = model.scheduler().inversion_step(&noise, t, &latent)?;
        states.push(latent.clone());
        tracing::debug!(step = i, timestep = t, "inversion step");
    }
    LatentTrajectory::new(states)
}

/// Single-shot DDPM forward noising of `image` at `timestep`.
pub fn diffuse_forward<M: DiffusionModel + ?Sized>(
    model: &M,
    image: &Raster,
    timestep: usize,
    seed: u64,
) -> PaintResult<Tensor> {
    let ddpm = DdimScheduler::new(SchedulerConfig::ddpm_linear())?;
    let z0 = model.encode_image(image).map_err(PaintError::into_inference)?;
    let noise = gaussian_like(&z0, seed)?;
    ddpm.add_noise(&z0, &noise, timestep)
}

/// Denoise the noisiest state back to a clean latent with the same guidance.
pub fn reconstruct<M: DiffusionModel + ?Sized>(
    model: &mut M,
    trajectory: &LatentTrajectory,
    prompt: &str,
    guidance_scale: f64,
) -> PaintResult<Tensor> {
    let negative = model.encode_prompt(&[""]).map_err(PaintError::into_inference)?;
    let positive = model
        .encode_prompt(&[prompt])
        .map_err(PaintError::into_inference)?;
    let request = GenerationRequest {
        prompt_embeds: &positive,
        negative_embeds: &negative,
        latents: trajectory.noisiest().clone(),
        style: None,
        num_steps: trajectory.num_steps(),
        guidance_scale,
    };
    model.generate(request, &mut NoopHook)
}

/// Seeded standard normal tensor with the shape of `like`.
pub(crate) fn gaussian_like(like: &Tensor, seed: u64) -> PaintResult<Tensor> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..like.elem_count())
        .map(|_| StandardNormal.sample(&mut rng))
        .collect();
    Ok(Tensor::from_vec(data, like.dims(), like.device())?)
}

#[cfg(test)]
#[path = "../../tests/unit/diffusion/inversion.rs"]
mod tests;
