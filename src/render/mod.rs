//! Differentiable stroke rendering and SVG export.

/// Stroke set initialization heuristics.
pub mod init;
/// Soft rasterizer over optimizable stroke parameters.
pub mod painter;
/// Bezier sampling and stroke snapshots.
pub mod stroke;
/// SVG document export and rasterization.
pub mod svg;
