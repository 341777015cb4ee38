use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use crate::foundation::core::Canvas;
use crate::foundation::error::{PaintError, PaintResult};

/// Full run configuration.
///
/// This is the JSON-facing representation; every section has defaults so a config file only
/// needs to name what it overrides.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PainterConfig {
    pub seed: u64,
    pub canvas: Canvas,
    /// Name of the diffusion backend, recorded in the run directory name.
    pub model_id: String,
    pub strokes: StrokeConfig,
    pub optim: OptimFlags,
    pub imit_stage: StageConfig,
    pub synth_stage: StageConfig,
    pub loss: LossConfig,
    pub diffusion: DiffusionConfig,
    pub output: OutputConfig,
    pub batch: BatchConfig,
}

impl Default for PainterConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            canvas: Canvas::default(),
            model_id: "analytic".to_owned(),
            strokes: StrokeConfig::default(),
            optim: OptimFlags::default(),
            imit_stage: StageConfig::default(),
            synth_stage: StageConfig {
                num_iter: 1000,
                lr: 0.5,
                color_lr: 0.01,
                width_lr: 0.05,
                ..StageConfig::default()
            },
            loss: LossConfig::default(),
            diffusion: DiffusionConfig::default(),
            output: OutputConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// Stroke set shape and initialization.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrokeConfig {
    /// Number of strokes (fixed for the whole run).
    pub num_paths: usize,
    /// Cubic segments per stroke.
    pub num_segments: usize,
    /// Polyline samples per cubic segment used by the rasterizer.
    pub samples_per_segment: usize,
    pub init_width: f32,
    pub max_width: f32,
    pub init_alpha: f32,
    pub max_alpha: f32,
    /// Maximum control-point offset at initialization, as a fraction of the canvas size.
    pub init_radius: f32,
    /// Uniform random placement instead of the style-seeded heuristic.
    pub random_init: bool,
    /// Slope of the coverage sigmoid, per pixel.
    pub edge_sharpness: f32,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            num_paths: 256,
            num_segments: 1,
            samples_per_segment: 16,
            init_width: 3.0,
            max_width: 12.0,
            init_alpha: 1.0,
            max_alpha: 1.0,
            init_radius: 0.05,
            random_init: false,
            edge_sharpness: 2.0,
        }
    }
}

/// Which parameter groups are optimized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimFlags {
    /// Optimize alpha only (ignored when `optimize_rgba` is set).
    pub optimize_opacity: bool,
    /// Optimize RGB and alpha.
    pub optimize_rgba: bool,
    pub optimize_width: bool,
}

impl Default for OptimFlags {
    fn default() -> Self {
        Self {
            optimize_opacity: true,
            optimize_rgba: true,
            optimize_width: true,
        }
    }
}

/// Learning-rate decay form applied at `decay_steps` boundaries.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum LrDecay {
    /// Multiply by `factor` at every boundary passed.
    Step { factor: f64 },
    /// Multiply by `gamma` for every step after the first boundary.
    Exponential { gamma: f64 },
}

impl Default for LrDecay {
    fn default() -> Self {
        Self::Step { factor: 0.4 }
    }
}

/// Per-stage optimization budget and learning rates.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    pub num_iter: u32,
    /// Control-point learning rate.
    pub lr: f64,
    pub color_lr: f64,
    pub width_lr: f64,
    pub lr_scheduler: bool,
    pub decay: LrDecay,
    pub decay_steps: Vec<u32>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            num_iter: 1000,
            lr: 1.0,
            color_lr: 0.01,
            width_lr: 0.1,
            lr_scheduler: true,
            decay: LrDecay::default(),
            decay_steps: vec![500, 750],
        }
    }
}

/// Structural similarity variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralMetric {
    #[default]
    Ssim,
    Msssim,
    None,
}

impl FromStr for StructuralMetric {
    type Err = PaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssim" => Ok(Self::Ssim),
            "msssim" | "ms-ssim" => Ok(Self::Msssim),
            "none" => Ok(Self::None),
            other => Err(PaintError::config(format!(
                "unsupported structural loss '{other}' (expected ssim, msssim or none)"
            ))),
        }
    }
}

/// Stroke positional/shape preservation variant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionLoss {
    /// MSE between relative control-point positions.
    #[default]
    Pos,
    /// MSE between sampled Bezier curves.
    Bez,
    /// Entropic optimal transport against the style raster.
    Sinkhorn,
}

impl FromStr for PositionLoss {
    type Err = PaintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pos" => Ok(Self::Pos),
            "bez" => Ok(Self::Bez),
            "sinkhorn" => Ok(Self::Sinkhorn),
            other => Err(PaintError::config(format!(
                "unsupported position loss type '{other}' (expected pos, bez or sinkhorn)"
            ))),
        }
    }
}

impl fmt::Display for PositionLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pos => "pos",
            Self::Bez => "bez",
            Self::Sinkhorn => "sinkhorn",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinkhornConfig {
    /// Entropic regularization strength.
    pub blur: f64,
    pub iterations: usize,
    /// Side of the square grid both rasters are pooled to before transport.
    pub resolution: usize,
}

impl Default for SinkhornConfig {
    fn default() -> Self {
        Self {
            blur: 0.05,
            iterations: 50,
            resolution: 32,
        }
    }
}

/// Stage-2 loss composition.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LossConfig {
    pub l2_weight: f64,
    pub struct_loss: StructuralMetric,
    pub struct_loss_weight: f64,
    pub pos_loss_weight: f64,
    pub pos_type: PositionLoss,
    pub sinkhorn: SinkhornConfig,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            l2_weight: 1.0,
            struct_loss: StructuralMetric::Ssim,
            struct_loss_weight: 1.0,
            pos_loss_weight: 1.0,
            pos_type: PositionLoss::Pos,
            sinkhorn: SinkhornConfig::default(),
        }
    }
}

/// Per-block attention scales for the style adapter, e.g. `{"up": {"block_0": [0, 1, 0]}}`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AdapterScale {
    pub blocks: BTreeMap<String, BTreeMap<String, Vec<f32>>>,
}

impl AdapterScale {
    /// Style-only injection into the first up block, as used for style transfer.
    pub fn style_only() -> Self {
        let mut up = BTreeMap::new();
        up.insert("block_0".to_owned(), vec![0.0, 1.0, 0.0]);
        let mut blocks = BTreeMap::new();
        blocks.insert("up".to_owned(), up);
        Self { blocks }
    }

    /// Strongest per-layer scale across all blocks, `0.0` when empty.
    pub fn peak(&self) -> f32 {
        self.blocks
            .values()
            .flat_map(|b| b.values())
            .flatten()
            .copied()
            .fold(0.0, f32::max)
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffusionConfig {
    pub num_inference_steps: usize,
    pub guidance_scale: f64,
    pub inversion_guidance_scale: f64,
    /// Denoising step whose inverted latent seeds the tracked generation branch.
    pub trajectory_offset: usize,
    /// Square resolution used for inversion and generation.
    pub resolution: u32,
    pub adapter_scale: AdapterScale,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            num_inference_steps: 50,
            guidance_scale: 7.5,
            inversion_guidance_scale: 2.0,
            trajectory_offset: 5,
            resolution: 1024,
            adapter_scale: AdapterScale::style_only(),
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Raster/SVG snapshot cadence in iterations.
    pub save_step: u32,
    pub make_video: bool,
    /// Stage-2 frame capture cadence in iterations.
    pub frame_freq: u32,
    pub framerate: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            save_step: 50,
            make_video: false,
            frame_freq: 5,
            framerate: 24,
        }
    }
}

/// Multi-run mode: one run per seed in `seed_range` (half-open).
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub multirun: bool,
    pub seed_range: Option<(u64, u64)>,
}

impl BatchConfig {
    /// Seeds to run: the configured range in multirun mode, otherwise just `base`.
    pub fn seeds(&self, base: u64) -> Vec<u64> {
        match (self.multirun, self.seed_range) {
            (true, Some((start, end))) => (start..end).collect(),
            _ => vec![base],
        }
    }
}

impl PainterConfig {
    /// Parse a config from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> PaintResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| PaintError::config(format!("parse painter config JSON: {e}")))
    }

    /// Parse a config from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> PaintResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            PaintError::config(format!("open painter config '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Check every static constraint. Runs before any optimization begins.
    pub fn validate(&self) -> PaintResult<()> {
        self.canvas.validate()?;

        let s = &self.strokes;
        if s.num_paths == 0 {
            return Err(PaintError::config("strokes.num_paths must be positive"));
        }
        if s.num_segments == 0 {
            return Err(PaintError::config("strokes.num_segments must be positive"));
        }
        if s.samples_per_segment == 0 {
            return Err(PaintError::config(
                "strokes.samples_per_segment must be positive",
            ));
        }
        check_positive("strokes.max_width", f64::from(s.max_width))?;
        check_positive("strokes.max_alpha", f64::from(s.max_alpha))?;
        check_positive("strokes.edge_sharpness", f64::from(s.edge_sharpness))?;
        check_non_negative("strokes.init_width", f64::from(s.init_width))?;
        check_non_negative("strokes.init_alpha", f64::from(s.init_alpha))?;
        check_non_negative("strokes.init_radius", f64::from(s.init_radius))?;
        if s.max_alpha > 1.0 {
            return Err(PaintError::config("strokes.max_alpha must be <= 1"));
        }

        for (name, stage) in [("imit_stage", &self.imit_stage), ("synth_stage", &self.synth_stage)]
        {
            check_non_negative(&format!("{name}.lr"), stage.lr)?;
            check_non_negative(&format!("{name}.color_lr"), stage.color_lr)?;
            check_non_negative(&format!("{name}.width_lr"), stage.width_lr)?;
            match stage.decay {
                LrDecay::Step { factor } if !(factor > 0.0 && factor <= 1.0) => {
                    return Err(PaintError::config(format!(
                        "{name}.decay.factor must be in (0, 1], got {factor}"
                    )));
                }
                LrDecay::Exponential { gamma } if !(gamma > 0.0 && gamma <= 1.0) => {
                    return Err(PaintError::config(format!(
                        "{name}.decay.gamma must be in (0, 1], got {gamma}"
                    )));
                }
                _ => {}
            }
            if !stage.decay_steps.windows(2).all(|w| w[0] <= w[1]) {
                return Err(PaintError::config(format!(
                    "{name}.decay_steps must be sorted ascending"
                )));
            }
        }

        let l = &self.loss;
        check_non_negative("loss.l2_weight", l.l2_weight)?;
        check_non_negative("loss.struct_loss_weight", l.struct_loss_weight)?;
        check_non_negative("loss.pos_loss_weight", l.pos_loss_weight)?;
        check_positive("loss.sinkhorn.blur", l.sinkhorn.blur)?;
        if l.sinkhorn.iterations == 0 || l.sinkhorn.resolution == 0 {
            return Err(PaintError::config(
                "loss.sinkhorn iterations and resolution must be positive",
            ));
        }

        let d = &self.diffusion;
        if d.num_inference_steps == 0 {
            return Err(PaintError::config(
                "diffusion.num_inference_steps must be positive",
            ));
        }
        if d.trajectory_offset >= d.num_inference_steps {
            return Err(PaintError::config(format!(
                "diffusion.trajectory_offset ({}) must be below num_inference_steps ({})",
                d.trajectory_offset, d.num_inference_steps
            )));
        }
        check_non_negative("diffusion.guidance_scale", d.guidance_scale)?;
        check_non_negative(
            "diffusion.inversion_guidance_scale",
            d.inversion_guidance_scale,
        )?;
        if d.resolution == 0 {
            return Err(PaintError::config("diffusion.resolution must be positive"));
        }
        if d.adapter_scale.blocks.values().flat_map(|b| b.values()).flatten().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(PaintError::config(
                "diffusion.adapter_scale entries must be finite and non-negative",
            ));
        }

        if self.output.save_step == 0 || self.output.frame_freq == 0 {
            return Err(PaintError::config(
                "output.save_step and output.frame_freq must be positive",
            ));
        }
        if self.output.make_video && self.output.framerate == 0 {
            return Err(PaintError::config("output.framerate must be positive"));
        }
        if let Some((start, end)) = self.batch.seed_range
            && start >= end
        {
            return Err(PaintError::config(format!(
                "batch.seed_range must be non-empty, got {start}..{end}"
            )));
        }
        Ok(())
    }
}

fn check_non_negative(name: &str, v: f64) -> PaintResult<()> {
    if !v.is_finite() || v < 0.0 {
        return Err(PaintError::config(format!(
            "{name} must be finite and non-negative, got {v}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, v: f64) -> PaintResult<()> {
    if !v.is_finite() || v <= 0.0 {
        return Err(PaintError::config(format!(
            "{name} must be finite and positive, got {v}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/config/model.rs"]
mod tests;
