use crate::foundation::error::PaintResult;

/// Configuration provided to a [`FrameSink`] before the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    /// Output frames per second.
    pub framerate: u32,
}

/// Sink contract for consuming progress frames.
///
/// `push_frame` is called with strictly increasing frame indices.
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> PaintResult<()>;
    fn push_frame(&mut self, idx: u64, frame: &image::RgbImage) -> PaintResult<()>;
    fn end(&mut self) -> PaintResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    pub(crate) frames: Vec<(u64, image::RgbImage)>,
    finished: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    pub fn frames(&self) -> &[(u64, image::RgbImage)] {
        &self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> PaintResult<()> {
        self.cfg = Some(cfg);
        self.frames.clear();
        self.finished = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &image::RgbImage) -> PaintResult<()> {
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> PaintResult<()> {
        self.finished = true;
        Ok(())
    }
}
