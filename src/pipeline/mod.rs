//! Two-stage painting pipeline: imitation, inversion plus synthesis, then guided refinement.

/// Progress artifacts and video assembly.
pub mod artifacts;
/// Sequential multi-prompt, multi-seed runs.
pub mod batch;
/// Per-run state and output directory layout.
pub mod context;
/// Stage sequencing.
pub mod orchestrator;
