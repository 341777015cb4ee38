//! Progress video encoding.
//!
//! Sinks consume stage-2 frames in capture order; the pipeline turns `frame_logs/` into
//! `rendering.mp4` through them.

/// `ffmpeg`-based sink (MP4 output via system `ffmpeg`).
pub mod ffmpeg;
/// Frame sink trait and the in-memory sink.
pub mod sink;
