use candle_core::{DType, Device, Tensor};

use crate::config::model::AdapterScale;
use crate::diffusion::model::{DiffusionModel, PromptEmbeds, StyleConditioning};
use crate::diffusion::scheduler::{DdimScheduler, SchedulerConfig};
use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};
use crate::foundation::math::Fnv1a64;

/// Named colors understood in prompts and produced by captions.
const PALETTE: &[(&str, [f32; 3])] = &[
    ("red", [0.85, 0.1, 0.1]),
    ("orange", [0.95, 0.55, 0.1]),
    ("yellow", [0.95, 0.85, 0.15]),
    ("green", [0.15, 0.65, 0.2]),
    ("cyan", [0.1, 0.75, 0.8]),
    ("blue", [0.1, 0.25, 0.85]),
    ("purple", [0.5, 0.2, 0.7]),
    ("pink", [0.95, 0.5, 0.7]),
    ("brown", [0.5, 0.3, 0.12]),
    ("black", [0.05, 0.05, 0.05]),
    ("gray", [0.5, 0.5, 0.5]),
    ("white", [0.95, 0.95, 0.95]),
];

/// Closed-form latent diffusion model.
///
/// The latent is the image average-pooled by the VAE factor and mapped to `[-1, 1]`; the data
/// prior is Gaussian around a target built from the prompt tint and the style latent, so the
/// noise prediction is the exact posterior one. Useful for dry runs and tests without weights.
#[derive(Clone, Debug)]
pub struct AnalyticDiffusion {
    scheduler: DdimScheduler,
    device: Device,
    prior_std: f64,
}

impl AnalyticDiffusion {
    pub fn new(device: &Device) -> PaintResult<Self> {
        Ok(Self {
            scheduler: DdimScheduler::new(SchedulerConfig::sdxl())?,
            device: device.clone(),
            prior_std: 0.2,
        })
    }

    /// Spread of the data prior around its target. Larger values make inversion more
    /// faithful and generations noisier.
    pub fn with_prior_std(mut self, prior_std: f64) -> PaintResult<Self> {
        if !(prior_std.is_finite() && prior_std > 0.0) {
            return Err(PaintError::config(format!(
                "prior std must be positive, got {prior_std}"
            )));
        }
        self.prior_std = prior_std;
        Ok(self)
    }

    /// Tint for a prompt: the first palette color it names, otherwise a stable hash color.
    pub fn prompt_tint(prompt: &str) -> [f32; 3] {
        let lower = prompt.to_lowercase();
        let named = lower
            .split(|c: char| !c.is_alphanumeric())
            .find_map(|word| {
                let word = if word == "grey" { "gray" } else { word };
                PALETTE.iter().find(|(name, _)| *name == word)
            });
        if let Some((_, rgb)) = named {
            return *rgb;
        }
        let mut h = Fnv1a64::new_default();
        h.write_bytes(lower.trim().as_bytes());
        let bytes = h.finish().to_le_bytes();
        [bytes[0], bytes[1], bytes[2]].map(|b| 0.15 + 0.7 * f32::from(b) / 255.0)
    }

    fn check_divisible(&self, height: usize, width: usize) -> PaintResult<()> {
        let f = self.vae_scale_factor();
        if height == 0 || width == 0 || height % f != 0 || width % f != 0 {
            return Err(PaintError::config(format!(
                "image size {width}x{height} must be a positive multiple of {f}"
            )));
        }
        Ok(())
    }
}

/// Most common color bin (top 3 bits per channel), averaged inside the bin.
pub fn dominant_color(img: &image::RgbImage) -> [f32; 3] {
    let mut bins = [[[0u64; 8]; 8]; 8];
    for p in img.pixels() {
        let [r, g, b] = p.0;
        bins[(r >> 5) as usize][(g >> 5) as usize][(b >> 5) as usize] += 1;
    }
    let mut best = (0, 0, 0);
    let mut max_count = 0;
    for r in 0..8 {
        for g in 0..8 {
            for b in 0..8 {
                if bins[r][g][b] > max_count {
                    max_count = bins[r][g][b];
                    best = (r, g, b);
                }
            }
        }
    }

    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for p in img.pixels() {
        let [r, g, b] = p.0;
        if ((r >> 5) as usize, (g >> 5) as usize, (b >> 5) as usize) == best {
            sum[0] += u64::from(r);
            sum[1] += u64::from(g);
            sum[2] += u64::from(b);
            count += 1;
        }
    }
    if count == 0 {
        return [0.0; 3];
    }
    sum.map(|s| s as f32 / count as f32 / 255.0)
}

/// Palette name closest to `rgb`.
pub fn nearest_color_name(rgb: [f32; 3]) -> &'static str {
    let dist = |c: &[f32; 3]| -> f32 { c.iter().zip(rgb).map(|(a, b)| (a - b) * (a - b)).sum() };
    PALETTE
        .iter()
        .min_by(|a, b| dist(&a.1).total_cmp(&dist(&b.1)))
        .map_or("gray", |(name, _)| name)
}

impl DiffusionModel for AnalyticDiffusion {
    fn model_id(&self) -> &str {
        "analytic"
    }

    fn latent_channels(&self) -> usize {
        3
    }

    fn scheduler(&self) -> &DdimScheduler {
        &self.scheduler
    }

    fn scheduler_mut(&mut self) -> &mut DdimScheduler {
        &mut self.scheduler
    }

    fn encode_image(&self, image: &Raster) -> PaintResult<Tensor> {
        self.check_divisible(image.height(), image.width())?;
        let nchw = image.to_nchw()?.to_device(&self.device)?;
        Ok(nchw
            .avg_pool2d(self.vae_scale_factor())?
            .affine(2.0, -1.0)?)
    }

    fn encode_prompt(&self, prompts: &[&str]) -> PaintResult<PromptEmbeds> {
        let mut hidden = Vec::with_capacity(prompts.len() * 3);
        let mut pooled = Vec::with_capacity(prompts.len());
        for p in prompts {
            if p.trim().is_empty() {
                hidden.extend([0.0f32; 3]);
                pooled.push(0.0f32);
            } else {
                hidden.extend(Self::prompt_tint(p).map(|c| 2.0 * c - 1.0));
                pooled.push(1.0);
            }
        }
        let n = prompts.len();
        Ok(PromptEmbeds {
            hidden: Tensor::from_vec(hidden, (n, 1, 3), &self.device)?,
            pooled: Tensor::from_vec(pooled, (n, 1), &self.device)?,
        })
    }

    fn prepare_style(
        &self,
        image: &Raster,
        scale: &AdapterScale,
        height: usize,
        width: usize,
    ) -> PaintResult<StyleConditioning> {
        self.check_divisible(height, width)?;
        let resized = image.resize(width as u32, height as u32)?;
        Ok(StyleConditioning {
            embedding: self.encode_image(&resized)?,
            scale: scale.clone(),
        })
    }

    fn predict_noise(
        &self,
        latents: &Tensor,
        t: usize,
        embeds: &PromptEmbeds,
        style: Option<&StyleConditioning>,
    ) -> PaintResult<Tensor> {
        let (b, c, h, w) = latents.dims4()?;
        if c != self.latent_channels() || embeds.batch_size()? != b {
            return Err(PaintError::inference(format!(
                "latent batch {:?} does not match {} prompt embeddings",
                latents.dims(),
                embeds.batch_size()?
            )));
        }

        let strength = style.map_or(0.0, |s| f64::from(s.scale.peak().clamp(0.0, 1.0)));
        let tint = embeds
            .hidden
            .reshape((b, 3, 1, 1))?
            .broadcast_mul(&embeds.pooled.reshape((b, 1, 1, 1))?)?
            .affine(1.0 - strength / 2.0, 0.0)?;
        let mut target = tint.broadcast_as((b, c, h, w))?.to_dtype(DType::F32)?;
        if let Some(style) = style.filter(|_| strength > 0.0) {
            if style.embedding.dims() != [1, c, h, w] {
                return Err(PaintError::inference(format!(
                    "style embedding {:?} does not match latents {:?}",
                    style.embedding.dims(),
                    latents.dims()
                )));
            }
            target = target.broadcast_add(&style.embedding.affine(strength / 2.0, 0.0)?)?;
        }

        let a = self.scheduler.alpha_cumprod(t);
        let var = self.prior_std * self.prior_std;
        let shrink = a.sqrt() * var / (a * var + 1.0 - a);
        // Posterior mean under x0 ~ N(target, std^2).
        let residual = (latents - target.affine(a.sqrt(), 0.0)?)?;
        let x0 = (target + residual.affine(shrink, 0.0)?)?;
        Ok((latents - x0.affine(a.sqrt(), 0.0)?)?.affine(1.0 / (1.0 - a).sqrt(), 0.0)?)
    }

    fn decode_latents(&self, latents: &Tensor) -> PaintResult<Vec<Raster>> {
        let (b, _, h, w) = latents.dims4()?;
        let f = self.vae_scale_factor();
        let images = latents
            .affine(0.5, 0.5)?
            .upsample_nearest2d(h * f, w * f)?
            .clamp(0f32, 1f32)?;
        (0..b)
            .map(|i| Raster::from_nchw(&images.get(i)?))
            .collect()
    }

    fn caption(&self, image: &Raster) -> PaintResult<String> {
        let name = nearest_color_name(dominant_color(&image.to_rgb_image()?));
        Ok(format!("a painting in {name} tones"))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/diffusion/analytic.rs"]
mod tests;
