use std::fmt;

use candle_core::{D, DType, Device, Tensor};

use crate::foundation::error::{PaintError, PaintResult};

pub use kurbo::{BezPath, Point, Vec2};

/// Output canvas size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> PaintResult<Self> {
        let canvas = Self { width, height };
        canvas.validate()?;
        Ok(canvas)
    }

    pub fn validate(self) -> PaintResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PaintError::config(format!(
                "canvas dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
        }
    }
}

/// Straight-alpha color with channels in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub fn to_rgb8(self) -> [u8; 3] {
        fn q(c: f32) -> u8 {
            (c.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        [q(self.r), q(self.g), q(self.b)]
    }
}

/// Named pipeline states, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Init,
    Stage1Loop,
    Stage1Done,
    InversionAndSynthesis,
    Stage2Loop,
    Finalize,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Stage1Loop => "stage-1 imitation",
            Self::Stage1Done => "stage-1 export",
            Self::InversionAndSynthesis => "inversion and synthesis",
            Self::Stage2Loop => "stage-2 synthesis",
            Self::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// An RGB image as a `(height, width, 3)` f32 tensor with values in `[0, 1]`.
///
/// The tensor may carry a gradient graph (renderer output) or be a detached constant (targets).
#[derive(Clone, Debug)]
pub struct Raster {
    tensor: Tensor,
}

impl Raster {
    pub const CHANNELS: usize = 3;

    pub fn new(tensor: Tensor) -> PaintResult<Self> {
        let dims = tensor.dims();
        if dims.len() != 3 || dims[2] != Self::CHANNELS {
            return Err(PaintError::config(format!(
                "raster tensor must be (height, width, 3), got {dims:?}"
            )));
        }
        if tensor.dtype() != DType::F32 {
            return Err(PaintError::config("raster tensor must be f32"));
        }
        Ok(Self { tensor })
    }

    pub fn filled(canvas: Canvas, rgb: [f32; 3], device: &Device) -> PaintResult<Self> {
        let color = Tensor::new(&rgb, device)?;
        let tensor = color.broadcast_as((
            canvas.height as usize,
            canvas.width as usize,
            Self::CHANNELS,
        ))?;
        Self::new(tensor.contiguous()?)
    }

    pub fn from_rgb_image(img: &image::RgbImage, device: &Device) -> PaintResult<Self> {
        let (w, h) = img.dimensions();
        let data: Vec<f32> = img.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
        let tensor = Tensor::from_vec(data, (h as usize, w as usize, Self::CHANNELS), device)?;
        Self::new(tensor)
    }

    /// Accepts `(1, 3, H, W)` or `(3, H, W)`.
    pub fn from_nchw(tensor: &Tensor) -> PaintResult<Self> {
        let chw = match tensor.rank() {
            4 => tensor.squeeze(0)?,
            3 => tensor.clone(),
            r => {
                return Err(PaintError::config(format!(
                    "expected a CHW or NCHW tensor, got rank {r}"
                )));
            }
        };
        Self::new(chw.permute((1, 2, 0))?.contiguous()?)
    }

    pub fn to_rgb_image(&self) -> PaintResult<image::RgbImage> {
        let (h, w, _) = self.dims();
        let data = self
            .tensor
            .detach()
            .clamp(0f32, 1f32)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let bytes: Vec<u8> = data.iter().map(|v| (v * 255.0).round() as u8).collect();
        image::RgbImage::from_raw(w as u32, h as u32, bytes)
            .ok_or_else(|| PaintError::numeric("raster buffer does not match its dimensions"))
    }

    /// Resample to a new size. The result is detached from any gradient graph.
    pub fn resize(&self, width: u32, height: u32) -> PaintResult<Self> {
        if self.width() == width as usize && self.height() == height as usize {
            return Ok(self.detach());
        }
        let img = self.to_rgb_image()?;
        let resized =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        Self::from_rgb_image(&resized, self.tensor.device())
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        let d = self.tensor.dims();
        (d[0], d[1], d[2])
    }

    pub fn height(&self) -> usize {
        self.dims().0
    }

    pub fn width(&self) -> usize {
        self.dims().1
    }

    pub fn channels(&self) -> usize {
        self.dims().2
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn device(&self) -> &Device {
        self.tensor.device()
    }

    /// `(1, 3, H, W)` view for convolution-based metrics.
    pub fn to_nchw(&self) -> PaintResult<Tensor> {
        Ok(self.tensor.permute((2, 0, 1))?.unsqueeze(0)?.contiguous()?)
    }

    /// Per-pixel luminance as `(H, W)`.
    pub fn luminance(&self) -> PaintResult<Tensor> {
        let weights = Tensor::new(&[0.299f32, 0.587, 0.114], self.tensor.device())?;
        Ok(self.tensor.broadcast_mul(&weights)?.sum(D::Minus1)?)
    }

    pub fn detach(&self) -> Self {
        Self {
            tensor: self.tensor.detach(),
        }
    }

    /// Mean absolute per-channel difference, in `[0, 1]`.
    pub fn mean_abs_diff(&self, other: &Raster) -> PaintResult<f32> {
        if self.dims() != other.dims() {
            return Err(PaintError::config(format!(
                "raster size mismatch: {:?} vs {:?}",
                self.dims(),
                other.dims()
            )));
        }
        let diff = (self.tensor.detach() - other.tensor.detach())?;
        Ok(diff.abs()?.mean_all()?.to_scalar::<f32>()?)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
