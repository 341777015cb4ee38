use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};

use crate::assets::decode::{couple_image, fit_to_canvas, load_image, save_png, save_raster};
use crate::config::model::PainterConfig;
use crate::diffusion::inversion::invert;
use crate::diffusion::model::DiffusionModel;
use crate::diffusion::synthesis::{SynthesisRequest, synthesize};
use crate::foundation::core::{PipelineStage, Raster};
use crate::foundation::error::{PaintError, PaintResult, StageLocation};
use crate::loss::composer::{LossBreakdown, LossComposer, LossContext};
use crate::optim::optimizer::{ParamLimits, StrokeOptimizer};
use crate::pipeline::artifacts::{
    assemble_video, best_effort, record_frame, save_progress, save_snapshot,
};
use crate::pipeline::context::{RunContext, RunRequest};
use crate::render::painter::{Painter, StrokeRenderer};

/// Paths and final losses of a finished run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub seed: u64,
    pub style_prompt: String,
    /// Reconstruction loss of the last imitation step.
    pub imitation_loss: f32,
    /// Loss breakdown of the last synthesis step.
    pub synthesis_loss: LossBreakdown,
    pub final_svg: PathBuf,
    pub final_png: PathBuf,
    pub video: Option<PathBuf>,
}

// Products of the inversion and synthesis stage.
struct Guidance {
    style_prompt: String,
    target: Raster,
}

/// Drives one run through `Init -> Stage1Loop -> Stage1Done -> InversionAndSynthesis ->
/// Stage2Loop -> Finalize`.
pub struct Pipeline<M> {
    config: PainterConfig,
    model: M,
    device: Device,
}

impl<M: DiffusionModel> Pipeline<M> {
    /// Validate `config` up front so no iteration runs with a bad configuration.
    pub fn new(config: PainterConfig, model: M) -> PaintResult<Self> {
        config.validate()?;
        let f = model.vae_scale_factor() as u32;
        if !config.diffusion.resolution.is_multiple_of(f) {
            return Err(PaintError::config(format!(
                "diffusion.resolution {} must be a multiple of the model's VAE factor {f}",
                config.diffusion.resolution
            )));
        }
        let train = model.scheduler().config().train_timesteps;
        if config.diffusion.num_inference_steps > train {
            return Err(PaintError::config(format!(
                "diffusion.num_inference_steps {} exceeds the model's {train} training timesteps",
                config.diffusion.num_inference_steps
            )));
        }
        Ok(Self {
            config,
            model,
            device: Device::Cpu,
        })
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn config(&self) -> &PainterConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Execute a full run with the configured seed.
    pub fn run(&mut self, request: &RunRequest, out_root: &Path) -> PaintResult<RunSummary> {
        self.run_with_seed(request, self.config.seed, out_root)
    }

    /// Execute a full run with `seed` in place of the configured one.
    #[tracing::instrument(skip(self, request, out_root), fields(prompt = %request.prompt))]
    pub fn run_with_seed(
        &mut self,
        request: &RunRequest,
        seed: u64,
        out_root: &Path,
    ) -> PaintResult<RunSummary> {
        let mut config = self.config.clone();
        config.seed = seed;
        let mut ctx = RunContext::create(out_root, config, self.model.model_id())
            .map_err(|e| e.at_stage(PipelineStage::Init, StageLocation::Setup))?;
        tracing::info!(run_dir = %ctx.dirs.root.display(), "starting run");

        let (mut painter, style) = self.init(&mut ctx, request).map_err(|e| ctx.tag(e))?;
        let imitation_loss = self
            .imitate(&mut ctx, &mut painter, &style)
            .map_err(|e| ctx.tag(e))?;
        self.export_imitation(&mut ctx, &painter)
            .map_err(|e| ctx.tag(e))?;
        let guidance = self.guide(&mut ctx, request).map_err(|e| ctx.tag(e))?;
        let synthesis_loss = self
            .synthesize_strokes(&mut ctx, &mut painter, &guidance.target, &style)
            .map_err(|e| ctx.tag(e))?;
        let video = self.finalize(&mut ctx, &painter).map_err(|e| ctx.tag(e))?;

        Ok(RunSummary {
            run_dir: ctx.dirs.root.clone(),
            seed,
            style_prompt: guidance.style_prompt,
            imitation_loss,
            synthesis_loss,
            final_svg: ctx.dirs.final_svg(),
            final_png: ctx.dirs.final_png(),
            video,
        })
    }

    fn init(&self, ctx: &mut RunContext, request: &RunRequest) -> PaintResult<(Painter, Raster)> {
        ctx.enter(PipelineStage::Init);
        let cfg = &ctx.config;
        tracing::info!(prompt = %request.prompt, negative = %request.negative_prompt, "text prompt");

        let source = load_image(&request.style_path)?;
        let style = Raster::from_rgb_image(&fit_to_canvas(&source, cfg.canvas), &self.device)?;
        tracing::info!(path = %request.style_path.display(), dims = ?style.dims(), "loaded style image");
        if let Some(name) = request.style_path.file_name() {
            best_effort(
                "style copy",
                std::fs::copy(&request.style_path, ctx.dirs.style.join(name))
                    .map(|_| ())
                    .map_err(PaintError::from),
            )?;
        }
        best_effort(
            "style input",
            save_raster(&ctx.dirs.style.join("style_image_input.png"), &style),
        )?;

        let mut painter = Painter::new(cfg.canvas, &cfg.strokes, cfg.seed, &self.device)?;
        painter.set_style_image(&style)?;
        let init = painter.init_canvas(cfg.strokes.random_init)?;
        save_snapshot(&ctx.dirs.style, "stroke_init_style", &init, &painter)?;
        Ok((painter, style))
    }

    fn limits(&self) -> ParamLimits {
        ParamLimits {
            max_width: self.config.strokes.max_width,
            max_alpha: self.config.strokes.max_alpha,
        }
    }

    /// Stage 1: fit the strokes to the style image with plain MSE.
    #[tracing::instrument(skip_all, fields(strokes = painter.num_strokes()))]
    fn imitate(&self, ctx: &mut RunContext, painter: &mut Painter, style: &Raster) -> PaintResult<f32> {
        ctx.enter(PipelineStage::Stage1Loop);
        let stage = ctx.config.imit_stage.clone();
        let mut optimizer =
            StrokeOptimizer::init_groups(&*painter, &stage, ctx.config.optim, self.limits())?;
        let composer = LossComposer::reconstruction_only()?;
        tracing::info!(groups = ?optimizer.active_groups(), total = stage.num_iter, "stroke imitation");

        let mut last = 0.0;
        ctx.step = 0;
        while ctx.step < stage.num_iter {
            let raster = painter.render()?;
            let (loss, breakdown) = composer.compose(&raster, style, &LossContext::default())?;

            optimizer.zero_gradients();
            optimizer.backward(&loss)?;
            optimizer.apply_gradients()?;
            let lr = if stage.lr_scheduler {
                optimizer.decay_learning_rate(ctx.step, &stage.decay_steps)
            } else {
                optimizer.current_learning_rate()
            };
            last = breakdown.total;
            tracing::info!(step = ctx.step, lr, l_total = breakdown.total, "imitation");

            if ctx.is_save_step(ctx.step) {
                save_progress(
                    &ctx.dirs.imit_png_logs,
                    &ctx.dirs.imit_svg_logs,
                    ctx.step,
                    style,
                    &raster,
                    &*painter,
                )?;
            }
            ctx.step += 1;
        }
        Ok(last)
    }

    fn export_imitation(&self, ctx: &mut RunContext, painter: &Painter) -> PaintResult<()> {
        ctx.enter(PipelineStage::Stage1Done);
        best_effort("style result svg", painter.export_svg(&ctx.dirs.style_result_svg()))?;
        let raster = painter.render()?;
        best_effort("style result png", save_raster(&ctx.dirs.style_result_png(), &raster))
    }

    /// Invert the style image, generate with the trajectory override and pick the target.
    #[tracing::instrument(skip_all, fields(model = self.model.model_id()))]
    fn guide(&mut self, ctx: &mut RunContext, request: &RunRequest) -> PaintResult<Guidance> {
        ctx.enter(PipelineStage::InversionAndSynthesis);
        let d = ctx.config.diffusion.clone();
        let res = d.resolution;

        let source = load_image(&request.style_path)?;
        let resized =
            image::imageops::resize(&source, res, res, image::imageops::FilterType::Triangle);
        let style_hi = Raster::from_rgb_image(&resized, &self.device)?;

        let style_prompt = match &request.style_prompt {
            Some(p) => p.clone(),
            None => {
                let caption = self
                    .model
                    .caption(&style_hi)
                    .map_err(PaintError::into_inference)?;
                tracing::info!(caption = %caption, "captioned style image");
                caption
            }
        };

        let trajectory = invert(
            &mut self.model,
            &style_hi,
            &style_prompt,
            d.num_inference_steps,
            d.inversion_guidance_scale,
        )?;

        let output = synthesize(
            &mut self.model,
            SynthesisRequest {
                prompts: vec![
                    style_prompt.clone(),
                    request.prompt.clone(),
                    request.prompt.clone(),
                ],
                negative_prompts: vec![request.negative_prompt.clone()],
                trajectory: &trajectory,
                offset: d.trajectory_offset,
                style_image: &style_hi,
                adapter_scale: d.adapter_scale.clone(),
                height: res as usize,
                width: res as usize,
                num_steps: d.num_inference_steps,
                guidance_scale: d.guidance_scale,
                seed: ctx.config.seed,
            },
        )?;

        let sd = &ctx.dirs.sd_sample;
        best_effort("decoded zT", save_raster(&sd.join("decode_zT.png"), &output.injected))?;
        let grid: Vec<&Raster> = output.images.iter().collect();
        best_effort("samples", save_png(&sd.join("samples.png"), &couple_image(&grid)?))?;
        let target = output
            .target()
            .ok_or_else(|| PaintError::inference("generation returned no images"))?;
        best_effort("target", save_raster(&sd.join("target.png"), target))?;

        let canvas = ctx.config.canvas;
        let target = target.resize(canvas.width, canvas.height)?;
        Ok(Guidance {
            style_prompt,
            target,
        })
    }

    /// Stage 2: refine toward the generated target while keeping the stage-1 stroke layout.
    #[tracing::instrument(skip_all, fields(pos_type = %ctx.config.loss.pos_type))]
    fn synthesize_strokes(
        &self,
        ctx: &mut RunContext,
        painter: &mut Painter,
        target: &Raster,
        style: &Raster,
    ) -> PaintResult<LossBreakdown> {
        ctx.enter(PipelineStage::Stage2Loop);
        let stage = ctx.config.synth_stage.clone();
        let output = ctx.config.output.clone();
        // Parameters are updated in place, so the reference needs its own storage.
        let reference: Tensor = painter.control_points().copy()?.detach();
        let mut optimizer =
            StrokeOptimizer::init_groups(&*painter, &stage, ctx.config.optim, self.limits())?;
        let composer = LossComposer::new(&ctx.config.loss)?;
        tracing::info!(groups = ?optimizer.active_groups(), total = stage.num_iter, "synthesis with style supervision");

        let mut last = LossBreakdown::default();
        ctx.step = 0;
        while ctx.step < stage.num_iter {
            let raster = painter.render()?;

            if let Some(frames) = &ctx.dirs.frame_logs
                && (ctx.step.is_multiple_of(output.frame_freq) || ctx.step + 1 == stage.num_iter)
            {
                if record_frame(frames, ctx.frame_idx, &raster)? {
                    ctx.frame_idx += 1;
                }
            }

            let loss_ctx = LossContext {
                points: Some(painter.control_points()),
                reference_points: Some(&reference),
                style: Some(style),
            };
            let (loss, breakdown) = composer.compose(&raster, target, &loss_ctx)?;

            optimizer.zero_gradients();
            optimizer.backward(&loss)?;
            optimizer.apply_gradients()?;
            let lr = if stage.lr_scheduler {
                optimizer.decay_learning_rate(ctx.step, &stage.decay_steps)
            } else {
                optimizer.current_learning_rate()
            };
            last = breakdown;
            tracing::info!(
                step = ctx.step,
                lr,
                l_total = breakdown.total,
                l_recon = breakdown.reconstruction,
                l_struct = breakdown.structural,
                l_pos = breakdown.positional,
                "synthesis"
            );

            if ctx.is_save_step(ctx.step) {
                save_progress(
                    &ctx.dirs.png_logs,
                    &ctx.dirs.svg_logs,
                    ctx.step,
                    target,
                    &raster,
                    &*painter,
                )?;
            }
            ctx.step += 1;
        }
        Ok(last)
    }

    fn finalize(&self, ctx: &mut RunContext, painter: &Painter) -> PaintResult<Option<PathBuf>> {
        ctx.enter(PipelineStage::Finalize);
        painter.export_svg(&ctx.dirs.final_svg())?;
        save_raster(&ctx.dirs.final_png(), &painter.render()?)?;

        let Some(frames) = &ctx.dirs.frame_logs else {
            return Ok(None);
        };
        match assemble_video(
            frames,
            ctx.frame_idx,
            ctx.config.output.framerate,
            &ctx.dirs.video(),
        ) {
            Ok(path) => Ok(Some(path)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping progress video");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/orchestrator.rs"]
mod tests;
