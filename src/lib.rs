//! VectorPainter turns a text prompt and a reference style image into a stroke-based vector
//! painting.
//!
//! A run has two optimization stages over a differentiable stroke renderer:
//!
//! - imitate the style image with plain MSE
//! - invert the style image through a diffusion model, generate a content target along the
//!   inverted trajectory, then refine the strokes toward it while keeping their stage-1 layout
//!
//! The diffusion model is a trait ([`DiffusionModel`]); [`AnalyticDiffusion`] is a closed-form
//! backend that needs no weights.
#![forbid(unsafe_code)]

mod foundation;

/// Image loading and PNG artifacts.
pub mod assets;
/// Run configuration.
pub mod config;
/// Diffusion model contract, scheduling, inversion and guided synthesis.
pub mod diffusion;
/// Progress video sinks.
pub mod encode;
/// Loss terms and their composition.
pub mod loss;
/// Stroke parameter optimizers.
pub mod optim;
/// Stage orchestration, run directories and batches.
pub mod pipeline;
/// Differentiable stroke renderer and SVG export.
pub mod render;

pub use crate::foundation::core::{BezPath, Canvas, PipelineStage, Point, Raster, Rgba, Vec2};
pub use crate::foundation::error::{PaintError, PaintResult, StageLocation};

pub use crate::config::model::{
    AdapterScale, BatchConfig, DiffusionConfig, LossConfig, LrDecay, OptimFlags, OutputConfig,
    PainterConfig, PositionLoss, SinkhornConfig, StageConfig, StrokeConfig, StructuralMetric,
};
pub use crate::diffusion::analytic::AnalyticDiffusion;
pub use crate::diffusion::inversion::LatentTrajectory;
pub use crate::diffusion::model::{DiffusionModel, StepHook};
pub use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
pub use crate::encode::sink::{FrameSink, InMemorySink, SinkConfig};
pub use crate::loss::composer::{LossBreakdown, LossComposer, LossContext};
pub use crate::pipeline::batch::{BatchReport, run_batch};
pub use crate::pipeline::context::RunRequest;
pub use crate::pipeline::orchestrator::{Pipeline, RunSummary};
pub use crate::render::painter::{Painter, StrokeRenderer};
