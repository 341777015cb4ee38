use std::path::Path;

use candle_core::{D, DType, Device, Tensor, Var};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::model::StrokeConfig;
use crate::foundation::core::{Canvas, Point, Raster, Rgba};
use crate::foundation::error::{PaintError, PaintResult};
use crate::foundation::math::sigmoid;
use crate::render::init::{random_strokes, style_seeded_strokes};
use crate::render::stroke::{
    Stroke, bezier_basis, control_point_count, pack_strokes, sample_polylines,
};
use crate::render::svg::{strokes_to_svg, write_svg};

const DIST_EPS: f64 = 1e-6;

/// Handles to the optimizable stroke parameters.
///
/// Each handle shares storage with the renderer, so optimizer steps are visible to the next
/// `render()` call.
#[derive(Clone, Debug)]
pub struct ParameterGroups {
    /// Control points, `(N, 3 * segments + 1, 2)` in pixel coordinates.
    pub points: Var,
    /// Stroke widths, `(N, 1)`.
    pub widths: Var,
    /// Stroke RGB, `(N, 3)`.
    pub rgb: Var,
    /// Stroke alpha, `(N, 1)`.
    pub alpha: Var,
}

/// Differentiable stroke renderer capability set.
pub trait StrokeRenderer {
    fn canvas(&self) -> Canvas;

    /// Rasterize the current strokes over white. Differentiable w.r.t. all parameter groups.
    fn render(&self) -> PaintResult<Raster>;

    fn parameter_groups(&self) -> ParameterGroups;

    /// Current SVG document. Does not mutate the strokes.
    fn to_svg(&self) -> PaintResult<String>;

    fn export_svg(&self, path: &Path) -> PaintResult<()> {
        write_svg(path, &self.to_svg()?)
    }
}

/// Stroke set plus the soft rasterizer.
pub struct Painter {
    canvas: Canvas,
    cfg: StrokeConfig,
    device: Device,
    rng: StdRng,
    basis: Tensor,
    groups: ParameterGroups,
    style: Option<image::RgbImage>,
}

impl Painter {
    /// Allocate `cfg.num_paths` strokes. Parameters are zero until [`Painter::init_canvas`].
    pub fn new(canvas: Canvas, cfg: &StrokeConfig, seed: u64, device: &Device) -> PaintResult<Self> {
        canvas.validate()?;
        if cfg.num_paths == 0 {
            return Err(PaintError::config("stroke count must be positive"));
        }
        if cfg.num_segments == 0 {
            return Err(PaintError::config("segment count must be positive"));
        }
        if cfg.samples_per_segment == 0 {
            return Err(PaintError::config("samples per segment must be positive"));
        }
        if !(cfg.max_width > 0.0 && cfg.edge_sharpness > 0.0) {
            return Err(PaintError::config(
                "max_width and edge_sharpness must be positive",
            ));
        }

        let n = cfg.num_paths;
        let p = control_point_count(cfg.num_segments);
        let groups = ParameterGroups {
            points: Var::zeros((n, p, 2), DType::F32, device)?,
            widths: Var::zeros((n, 1), DType::F32, device)?,
            rgb: Var::zeros((n, 3), DType::F32, device)?,
            alpha: Var::zeros((n, 1), DType::F32, device)?,
        };
        Ok(Self {
            canvas,
            cfg: cfg.clone(),
            device: device.clone(),
            rng: StdRng::seed_from_u64(seed),
            basis: bezier_basis(cfg.num_segments, cfg.samples_per_segment, device)?,
            groups,
            style: None,
        })
    }

    /// Style image used by the seeded initialization. Resized to the canvas.
    pub fn set_style_image(&mut self, style: &Raster) -> PaintResult<()> {
        let resized = style.resize(self.canvas.width, self.canvas.height)?;
        self.style = Some(resized.to_rgb_image()?);
        Ok(())
    }

    /// Place the initial strokes and return the first render.
    pub fn init_canvas(&mut self, random: bool) -> PaintResult<Raster> {
        let strokes = if random {
            random_strokes(&mut self.rng, self.canvas, &self.cfg)
        } else {
            let style = self.style.as_ref().ok_or_else(|| {
                PaintError::config("style-seeded initialization needs a style image")
            })?;
            style_seeded_strokes(&mut self.rng, self.canvas, &self.cfg, style)?
        };
        self.set_strokes(&strokes)?;
        tracing::debug!(strokes = strokes.len(), random, "initialized stroke set");
        self.render()
    }

    /// Overwrite all parameters. The stroke count must match.
    pub fn set_strokes(&mut self, strokes: &[Stroke]) -> PaintResult<()> {
        if strokes.len() != self.cfg.num_paths {
            return Err(PaintError::config(format!(
                "expected {} strokes, got {}",
                self.cfg.num_paths,
                strokes.len()
            )));
        }
        let n = strokes.len();
        let p = control_point_count(self.cfg.num_segments);
        let packed = pack_strokes(strokes, p)?;
        let g = &self.groups;
        g.points
            .set(&Tensor::from_vec(packed.points, (n, p, 2), &self.device)?)?;
        g.widths
            .set(&Tensor::from_vec(packed.widths, (n, 1), &self.device)?)?;
        g.rgb
            .set(&Tensor::from_vec(packed.rgb, (n, 3), &self.device)?)?;
        g.alpha
            .set(&Tensor::from_vec(packed.alpha, (n, 1), &self.device)?)?;
        Ok(())
    }

    /// Detached snapshot of the strokes with render-time clamps applied.
    pub fn strokes(&self) -> PaintResult<Vec<Stroke>> {
        let points = self.clamped_points()?.to_vec3::<f32>()?;
        let widths = self.clamped_widths()?.flatten_all()?.to_vec1::<f32>()?;
        let rgb = self.clamped_rgb()?.to_vec2::<f32>()?;
        let alpha = self.clamped_alpha()?.flatten_all()?.to_vec1::<f32>()?;
        Ok(points
            .into_iter()
            .enumerate()
            .map(|(i, pts)| Stroke {
                points: pts
                    .iter()
                    .map(|xy| Point::new(f64::from(xy[0]), f64::from(xy[1])))
                    .collect(),
                width: widths[i],
                color: Rgba {
                    r: rgb[i][0],
                    g: rgb[i][1],
                    b: rgb[i][2],
                    a: alpha[i],
                },
            })
            .collect())
    }

    /// Raw control points (with gradient tracking).
    pub fn control_points(&self) -> &Tensor {
        self.groups.points.as_tensor()
    }

    pub fn num_strokes(&self) -> usize {
        self.cfg.num_paths
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn clamped_points(&self) -> PaintResult<Tensor> {
        let limits = Tensor::new(
            &[self.canvas.width as f32, self.canvas.height as f32],
            &self.device,
        )?;
        let zero = limits.zeros_like()?;
        Ok(self
            .groups
            .points
            .as_tensor()
            .broadcast_maximum(&zero)?
            .broadcast_minimum(&limits)?)
    }

    fn clamped_widths(&self) -> PaintResult<Tensor> {
        Ok(self.groups.widths.as_tensor().clamp(0f32, self.cfg.max_width)?)
    }

    fn clamped_rgb(&self) -> PaintResult<Tensor> {
        Ok(self.groups.rgb.as_tensor().clamp(0f32, 1f32)?)
    }

    fn clamped_alpha(&self) -> PaintResult<Tensor> {
        Ok(self
            .groups
            .alpha
            .as_tensor()
            .clamp(0f32, self.cfg.max_alpha)?)
    }

    // Pixel-space window `[x0, x1) x [y0, y1)` a stroke can touch, from its detached polyline.
    fn stroke_window(&self, polyline: &[Vec<f32>], width: f32) -> Option<(usize, usize, usize, usize)> {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for xy in polyline {
            min_x = min_x.min(xy[0]);
            max_x = max_x.max(xy[0]);
            min_y = min_y.min(xy[1]);
            max_y = max_y.max(xy[1]);
        }
        // Sigmoid tail: coverage below ~2e-4 past this margin.
        let margin = width / 2.0 + 8.0 / self.cfg.edge_sharpness + 1.0;
        let clip = |v: f32, hi: u32| v.clamp(0.0, hi as f32) as usize;
        let x0 = clip((min_x - margin).floor(), self.canvas.width);
        let x1 = clip((max_x + margin).ceil(), self.canvas.width);
        let y0 = clip((min_y - margin).floor(), self.canvas.height);
        let y1 = clip((max_y + margin).ceil(), self.canvas.height);
        (x0 < x1 && y0 < y1).then_some((x0, x1, y0, y1))
    }

    // Soft coverage of one stroke over a pixel window, `(h, w, 1)`.
    fn stroke_coverage(
        &self,
        polyline: &Tensor,
        half_width: &Tensor,
        (x0, x1, y0, y1): (usize, usize, usize, usize),
    ) -> PaintResult<Tensor> {
        let (ww, wh) = (x1 - x0, y1 - y0);
        let mut centers = Vec::with_capacity(ww * wh * 2);
        for y in y0..y1 {
            for x in x0..x1 {
                centers.push(x as f32 + 0.5);
                centers.push(y as f32 + 0.5);
            }
        }
        let px = Tensor::from_vec(centers, (ww * wh, 1, 2), &self.device)?;

        let k = polyline.dim(0)?;
        let a = polyline.narrow(0, 0, k - 1)?;
        let b = polyline.narrow(0, 1, k - 1)?;
        let ab = (&b - &a)?;
        let len2 = ab.sqr()?.sum(D::Minus1)?.affine(1.0, DIST_EPS)?;
        let a = a.unsqueeze(0)?;
        let ab = ab.unsqueeze(0)?;

        let ap = px.broadcast_sub(&a)?;
        let t = ap
            .broadcast_mul(&ab)?
            .sum(D::Minus1)?
            .broadcast_div(&len2.unsqueeze(0)?)?
            .clamp(0f32, 1f32)?;
        let closest = a.broadcast_add(&t.unsqueeze(D::Minus1)?.broadcast_mul(&ab)?)?;
        let d2 = px.broadcast_sub(&closest)?.sqr()?.sum(D::Minus1)?.min(D::Minus1)?;
        let dist = d2.affine(1.0, DIST_EPS)?.sqrt()?;

        let signed = half_width.broadcast_sub(&dist)?;
        let cov = sigmoid(&signed.affine(f64::from(self.cfg.edge_sharpness), 0.0)?)?;
        Ok(cov.reshape((wh, ww, 1))?)
    }
}

impl StrokeRenderer for Painter {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn render(&self) -> PaintResult<Raster> {
        let (h, w) = (self.canvas.height as usize, self.canvas.width as usize);
        let polylines = sample_polylines(&self.clamped_points()?, &self.basis)?;
        let detached = polylines.detach().to_vec3::<f32>()?;
        let widths = self.clamped_widths()?;
        let width_vals = widths.detach().flatten_all()?.to_vec1::<f32>()?;
        let rgb = self.clamped_rgb()?;
        let alpha = self.clamped_alpha()?;

        let mut canvas = Tensor::ones((h, w, 3), DType::F32, &self.device)?;
        for (i, line) in detached.iter().enumerate() {
            let Some(window) = self.stroke_window(line, width_vals[i]) else {
                continue;
            };
            let (x0, x1, y0, y1) = window;
            let half_width = widths.get(i)?.affine(0.5, 0.0)?;
            let cov = self.stroke_coverage(&polylines.get(i)?, &half_width, window)?;
            let a = cov
                .broadcast_mul(&alpha.get(i)?)?
                .pad_with_zeros(0, y0, h - y1)?
                .pad_with_zeros(1, x0, w - x1)?;
            let color = rgb.get(i)?.reshape((1, 1, 3))?;
            // Source-over: dst * (1 - a) + src * a.
            canvas = (canvas.broadcast_mul(&a.affine(-1.0, 1.0)?)? + a.broadcast_mul(&color)?)?;
        }
        Raster::new(canvas.clamp(0f32, 1f32)?)
    }

    fn parameter_groups(&self) -> ParameterGroups {
        self.groups.clone()
    }

    fn to_svg(&self) -> PaintResult<String> {
        Ok(strokes_to_svg(self.canvas, &self.strokes()?))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/painter.rs"]
mod tests;
