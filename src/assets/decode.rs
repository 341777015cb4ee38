use std::path::Path;

use anyhow::Context;
use candle_core::Device;

use crate::encode::ffmpeg::ensure_parent_dir;
use crate::foundation::core::{Canvas, Raster};
use crate::foundation::error::{PaintError, PaintResult};

/// Decode encoded image bytes to RGB8, compositing any alpha over white.
pub fn decode_image(bytes: &[u8]) -> PaintResult<image::RgbImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    Ok(flatten_on_white(&dyn_img.to_rgba8()))
}

/// Read and decode an image file.
pub fn load_image(path: &Path) -> PaintResult<image::RgbImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
    let dyn_img = image::load_from_memory(&bytes)
        .with_context(|| format!("decode image '{}'", path.display()))?;
    Ok(flatten_on_white(&dyn_img.to_rgba8()))
}

fn flatten_on_white(rgba: &image::RgbaImage) -> image::RgbImage {
    let (width, height) = rgba.dimensions();
    let mut out = Vec::with_capacity(width as usize * height as usize * 3);
    for px in rgba.as_raw().chunks_exact(4) {
        let a = u16::from(px[3]);
        for &c in &px[..3] {
            out.push(((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8);
        }
    }
    image::RgbImage::from_raw(width, height, out).unwrap_or_default()
}

/// Center-crop `img` to the canvas aspect ratio, then resize to the canvas.
pub fn fit_to_canvas(img: &image::RgbImage, canvas: Canvas) -> image::RgbImage {
    let (w, h) = img.dimensions();
    if (w, h) == (canvas.width, canvas.height) {
        return img.clone();
    }
    let target_aspect = f64::from(canvas.width) / f64::from(canvas.height);
    let (crop_w, crop_h) = if f64::from(w) / f64::from(h) > target_aspect {
        (((f64::from(h) * target_aspect).round() as u32).clamp(1, w), h)
    } else {
        (w, ((f64::from(w) / target_aspect).round() as u32).clamp(1, h))
    };
    let x = (w - crop_w) / 2;
    let y = (h - crop_h) / 2;
    let cropped = image::imageops::crop_imm(img, x, y, crop_w, crop_h).to_image();
    image::imageops::resize(
        &cropped,
        canvas.width,
        canvas.height,
        image::imageops::FilterType::Lanczos3,
    )
}

/// Load the style image at canvas resolution.
pub fn load_style_image(path: &Path, canvas: Canvas, device: &Device) -> PaintResult<Raster> {
    canvas.validate()?;
    let img = load_image(path)?;
    Raster::from_rgb_image(&fit_to_canvas(&img, canvas), device)
}

/// Write an RGB8 image as PNG, creating parent directories.
pub fn save_png(path: &Path, img: &image::RgbImage) -> PaintResult<()> {
    ensure_parent_dir(path)?;
    image::save_buffer_with_format(
        path,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .map_err(|e| PaintError::io(format!("write png '{}': {e}", path.display())))
}

pub fn save_raster(path: &Path, raster: &Raster) -> PaintResult<()> {
    save_png(path, &raster.to_rgb_image()?)
}

/// Side-by-side strip of equally sized images, left to right.
pub fn couple_image(images: &[&Raster]) -> PaintResult<image::RgbImage> {
    let first = images
        .first()
        .ok_or_else(|| PaintError::config("couple image needs at least one raster"))?;
    let (h, w, _) = first.dims();
    let mut out = image::RgbImage::new((w * images.len()) as u32, h as u32);
    for (i, raster) in images.iter().enumerate() {
        if raster.dims() != first.dims() {
            return Err(PaintError::config(format!(
                "couple image rasters differ in size: {:?} vs {:?}",
                raster.dims(),
                first.dims()
            )));
        }
        image::imageops::replace(&mut out, &raster.to_rgb_image()?, (i * w) as i64, 0);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
