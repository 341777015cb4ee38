use std::fmt;

use crate::foundation::core::PipelineStage;

/// Convenience result type used across the painter.
pub type PaintResult<T> = Result<T, PaintError>;

/// Top-level error taxonomy.
///
/// `Config`, `Inference`, `Numeric` and tensor failures are fatal for a run. `Io` is the only
/// recoverable category: periodic artifact writes log it and keep optimizing.
#[derive(thiserror::Error, Debug)]
pub enum PaintError {
    /// Invalid dimensions, counts, weights or unsupported loss selections.
    #[error("config error: {0}")]
    Config(String),

    /// A diffusion model call failed (including resource exhaustion).
    #[error("inference error: {0}")]
    Inference(String),

    /// NaN/Inf in a loss value or in stroke parameters.
    #[error("numeric error: {0}")]
    Numeric(String),

    /// Artifact read/write failure.
    #[error("io error: {0}")]
    Io(String),

    /// A fatal error annotated with the pipeline stage that produced it.
    #[error("{stage} failed at {location}: {source}")]
    Stage {
        /// Stage that was active when the error surfaced.
        stage: PipelineStage,
        /// Iteration inside the stage loop, or setup.
        location: StageLocation,
        /// Underlying error.
        source: Box<PaintError>,
    },

    /// Error raised by the tensor backend.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Where inside a stage a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageLocation {
    /// Before or after the stage loop.
    Setup,
    /// Inside the loop, at this step counter value.
    Iteration(u32),
}

impl fmt::Display for StageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup => f.write_str("setup"),
            Self::Iteration(step) => write!(f, "iteration {step}"),
        }
    }
}

impl PaintError {
    /// Build a [`PaintError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`PaintError::Inference`] value.
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    /// Build a [`PaintError::Numeric`] value.
    pub fn numeric(msg: impl Into<String>) -> Self {
        Self::Numeric(msg.into())
    }

    /// Build a [`PaintError::Io`] value.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Attach stage context. Already-tagged errors keep their original tag.
    pub fn at_stage(self, stage: PipelineStage, location: StageLocation) -> Self {
        match self {
            tagged @ Self::Stage { .. } => tagged,
            other => Self::Stage {
                stage,
                location,
                source: Box::new(other),
            },
        }
    }

    /// Reclassify untyped backend failures raised inside a model call as inference errors.
    pub fn into_inference(self) -> Self {
        match self {
            Self::Tensor(e) => Self::Inference(e.to_string()),
            Self::Other(e) => Self::Inference(format!("{e:#}")),
            other => other,
        }
    }

    /// Innermost error, skipping stage annotations.
    pub fn root(&self) -> &PaintError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// `false` only for recoverable artifact I/O failures.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.root(), Self::Io(_))
    }
}

impl From<std::io::Error> for PaintError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
