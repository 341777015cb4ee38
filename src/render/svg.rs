use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use candle_core::Device;

use crate::foundation::core::{Canvas, Raster};
use crate::foundation::error::{PaintError, PaintResult};
use crate::render::stroke::Stroke;

/// Serialize strokes as a standalone SVG document over a white background.
pub fn strokes_to_svg(canvas: Canvas, strokes: &[Stroke]) -> String {
    let Canvas { width, height } = canvas;
    let mut out = String::with_capacity(128 + strokes.len() * 160);
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let _ = writeln!(
        out,
        r#"  <rect x="0" y="0" width="{width}" height="{height}" fill="rgb(255,255,255)"/>"#
    );
    for s in strokes {
        if s.points.is_empty() {
            continue;
        }
        let [r, g, b] = s.color.to_rgb8();
        let _ = writeln!(
            out,
            r#"  <path d="{}" fill="none" stroke="rgb({r},{g},{b})" stroke-opacity="{:.4}" stroke-width="{:.4}" stroke-linecap="round" stroke-linejoin="round"/>"#,
            s.to_bez_path().to_svg(),
            s.color.a.clamp(0.0, 1.0),
            s.width.max(0.0),
        );
    }
    out.push_str("</svg>\n");
    out
}

pub fn write_svg(path: &Path, svg: &str) -> PaintResult<()> {
    crate::encode::ffmpeg::ensure_parent_dir(path)?;
    std::fs::write(path, svg)
        .with_context(|| format!("write svg '{}'", path.display()))
        .map_err(|e| PaintError::io(format!("{e:#}")))
}

/// Parse SVG bytes into a `usvg` tree.
pub fn parse_svg(bytes: &[u8]) -> PaintResult<usvg::Tree> {
    let opts = usvg::Options::default();
    Ok(usvg::Tree::from_data(bytes, &opts).context("parse svg tree")?)
}

/// Rasterize an SVG tree to `width x height`, composited over white.
pub fn rasterize_svg(tree: &usvg::Tree, width: u32, height: u32, device: &Device) -> PaintResult<Raster> {
    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| PaintError::config("failed to allocate svg pixmap"))?;
    pixmap.fill(resvg::tiny_skia::Color::WHITE);

    let sx = (width as f32) / tree.size().width();
    let sy = (height as f32) / tree.size().height();
    let xform = resvg::tiny_skia::Transform::from_scale(sx, sy);
    resvg::render(tree, xform, &mut pixmap.as_mut());

    // The pixmap is opaque after the white fill, so premultiplied equals straight RGB.
    let rgb: Vec<u8> = pixmap
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    let img = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| PaintError::numeric("svg pixmap does not match its dimensions"))?;
    Raster::from_rgb_image(&img, device)
}

#[cfg(test)]
#[path = "../../tests/unit/render/svg.rs"]
mod tests;
