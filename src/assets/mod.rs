//! Image loading and PNG artifacts.

/// Decode, fit and save raster images.
pub mod decode;
