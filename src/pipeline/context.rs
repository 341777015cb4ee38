use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::model::PainterConfig;
use crate::foundation::core::{Canvas, PipelineStage};
use crate::foundation::error::{PaintError, PaintResult, StageLocation};

/// Inputs of a single run.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub style_path: PathBuf,
    pub prompt: String,
    pub negative_prompt: String,
    /// Prompt describing the style image. Captioned by the model when absent.
    pub style_prompt: Option<String>,
}

impl RunRequest {
    pub fn new(style_path: impl Into<PathBuf>, prompt: impl Into<String>) -> Self {
        Self {
            style_path: style_path.into(),
            prompt: prompt.into(),
            negative_prompt: String::new(),
            style_prompt: None,
        }
    }
}

/// `seed{seed}-canvas-{w}-{h}-{model_id}-{unix_secs}`.
pub fn run_dir_name(seed: u64, canvas: Canvas, model_id: &str, unix_secs: u64) -> String {
    format!(
        "seed{seed}-canvas-{}-{}-{model_id}-{unix_secs}",
        canvas.width, canvas.height
    )
}

/// Output layout of one run.
#[derive(Clone, Debug)]
pub struct RunDirs {
    pub root: PathBuf,
    pub style: PathBuf,
    pub imit_png_logs: PathBuf,
    pub imit_svg_logs: PathBuf,
    pub sd_sample: PathBuf,
    pub png_logs: PathBuf,
    pub svg_logs: PathBuf,
    /// Present when progress video is enabled.
    pub frame_logs: Option<PathBuf>,
}

impl RunDirs {
    pub fn new(root: PathBuf, with_frames: bool) -> Self {
        Self {
            style: root.join("style_image"),
            imit_png_logs: root.join("imit_png_logs"),
            imit_svg_logs: root.join("imit_svg_logs"),
            sd_sample: root.join("sd_sample"),
            png_logs: root.join("png_logs"),
            svg_logs: root.join("svg_logs"),
            frame_logs: with_frames.then(|| root.join("frame_logs")),
            root,
        }
    }

    pub fn create_all(&self) -> PaintResult<()> {
        let mut dirs = vec![
            &self.root,
            &self.style,
            &self.imit_png_logs,
            &self.imit_svg_logs,
            &self.sd_sample,
            &self.png_logs,
            &self.svg_logs,
        ];
        dirs.extend(self.frame_logs.as_ref());
        for dir in dirs {
            std::fs::create_dir_all(dir).map_err(|e| {
                PaintError::io(format!(
                    "failed to create output directory '{}': {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(())
    }

    pub fn style_result_svg(&self) -> PathBuf {
        self.root.join("style_result.svg")
    }

    pub fn style_result_png(&self) -> PathBuf {
        self.root.join("style_result.png")
    }

    pub fn final_svg(&self) -> PathBuf {
        self.root.join("final_svg.svg")
    }

    pub fn final_png(&self) -> PathBuf {
        self.root.join("final_render.png")
    }

    pub fn video(&self) -> PathBuf {
        self.root.join("rendering.mp4")
    }
}

/// Mutable state of one run: configuration, output layout and counters.
///
/// The step counter restarts at zero when stage 2 begins.
#[derive(Debug)]
pub struct RunContext {
    pub config: PainterConfig,
    pub dirs: RunDirs,
    pub stage: PipelineStage,
    pub step: u32,
    pub frame_idx: u64,
}

impl RunContext {
    /// Create the run directory under `out_root` and every subdirectory.
    pub fn create(out_root: &Path, config: PainterConfig, model_id: &str) -> PaintResult<Self> {
        let unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let name = run_dir_name(config.seed, config.canvas, model_id, unix_secs);
        // Runs started within the same second get a numeric suffix.
        let mut root = out_root.join(&name);
        let mut n = 1;
        while root.exists() {
            root = out_root.join(format!("{name}-{n}"));
            n += 1;
        }
        let dirs = RunDirs::new(root, config.output.make_video);
        dirs.create_all()?;
        Ok(Self {
            config,
            dirs,
            stage: PipelineStage::Init,
            step: 0,
            frame_idx: 0,
        })
    }

    pub fn enter(&mut self, stage: PipelineStage) {
        tracing::info!(%stage, "entering stage");
        self.stage = stage;
    }

    /// Error location at the current counter, for loop stages.
    pub fn location(&self) -> StageLocation {
        match self.stage {
            PipelineStage::Stage1Loop | PipelineStage::Stage2Loop => {
                StageLocation::Iteration(self.step)
            }
            _ => StageLocation::Setup,
        }
    }

    /// Tag `err` with the active stage and location.
    pub fn tag(&self, err: PaintError) -> PaintError {
        err.at_stage(self.stage, self.location())
    }

    /// Whether `step` is a periodic log step.
    pub fn is_save_step(&self, step: u32) -> bool {
        step.is_multiple_of(self.config.output.save_step.max(1))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/context.rs"]
mod tests;
