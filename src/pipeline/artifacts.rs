use std::path::{Path, PathBuf};

use crate::assets::decode::{couple_image, load_image, save_png, save_raster};
use crate::encode::ffmpeg::{FfmpegSink, FfmpegSinkOpts};
use crate::encode::sink::{FrameSink, SinkConfig};
use crate::foundation::core::Raster;
use crate::foundation::error::{PaintError, PaintResult};
use crate::render::painter::StrokeRenderer;

/// Run a periodic artifact write. I/O failures are logged and swallowed; anything else is
/// returned to the caller.
pub fn best_effort(what: &str, result: PaintResult<()>) -> PaintResult<()> {
    match result {
        Err(e) if !e.is_fatal() => {
            tracing::warn!(artifact = what, error = %e, "skipping artifact");
            Ok(())
        }
        other => other,
    }
}

/// `{dir}/iter{step}.png` as `reference | current`, plus `{svg_dir}/svg_iter{step}.svg`.
pub fn save_progress(
    png_dir: &Path,
    svg_dir: &Path,
    step: u32,
    reference: &Raster,
    current: &Raster,
    renderer: &dyn StrokeRenderer,
) -> PaintResult<()> {
    let strip = couple_image(&[reference, current])?;
    best_effort(
        "progress png",
        save_png(&png_dir.join(format!("iter{step}.png")), &strip),
    )?;
    best_effort(
        "progress svg",
        renderer.export_svg(&svg_dir.join(format!("svg_iter{step}.svg"))),
    )
}

/// Save `{stem}.png` and `{stem}.svg` of the current strokes.
pub fn save_snapshot(
    dir: &Path,
    stem: &str,
    raster: &Raster,
    renderer: &dyn StrokeRenderer,
) -> PaintResult<()> {
    best_effort("snapshot png", save_raster(&dir.join(format!("{stem}.png")), raster))?;
    best_effort(
        "snapshot svg",
        renderer.export_svg(&dir.join(format!("{stem}.svg"))),
    )
}

pub fn frame_path(frame_dir: &Path, idx: u64) -> PathBuf {
    frame_dir.join(format!("iter{idx}.png"))
}

/// Write frame `idx` of the progress video. Returns `false` when the write was skipped, so the
/// caller keeps the frame sequence contiguous.
pub fn record_frame(frame_dir: &Path, idx: u64, raster: &Raster) -> PaintResult<bool> {
    match save_raster(&frame_path(frame_dir, idx), raster) {
        Ok(()) => Ok(true),
        Err(e) if !e.is_fatal() => {
            tracing::warn!(frame = idx, error = %e, "skipping frame");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Push `frame_logs/iter{0..count}.png` through `sink` in index order.
pub fn stream_frames(
    frame_dir: &Path,
    count: u64,
    framerate: u32,
    sink: &mut dyn FrameSink,
) -> PaintResult<u64> {
    if count == 0 {
        return Ok(0);
    }
    let first = load_image(&frame_path(frame_dir, 0))?;
    sink.begin(SinkConfig {
        width: first.width(),
        height: first.height(),
        framerate,
    })?;
    sink.push_frame(0, &first)?;
    for idx in 1..count {
        let frame = load_image(&frame_path(frame_dir, idx))?;
        if frame.dimensions() != first.dimensions() {
            return Err(PaintError::io(format!(
                "frame {idx} is {:?}, expected {:?}",
                frame.dimensions(),
                first.dimensions()
            )));
        }
        sink.push_frame(idx, &frame)?;
    }
    sink.end()?;
    Ok(count)
}

/// Encode the captured frames to MP4 with the system `ffmpeg`.
pub fn assemble_video(
    frame_dir: &Path,
    count: u64,
    framerate: u32,
    out_path: &Path,
) -> PaintResult<PathBuf> {
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(out_path));
    stream_frames(frame_dir, count, framerate, &mut sink)?;
    tracing::info!(frames = count, path = %out_path.display(), "wrote progress video");
    Ok(out_path.to_path_buf())
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/artifacts.rs"]
mod tests;
