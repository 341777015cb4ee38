//! Latent diffusion services: model contract, DDIM scheduling, inversion and guided synthesis.

/// Closed-form model used for dry runs and tests.
pub mod analytic;
/// DDIM inversion, forward diffusion and trajectory replay.
pub mod inversion;
/// Model capability trait and generation plumbing.
pub mod model;
/// Noise schedules and DDIM updates.
pub mod scheduler;
/// Trajectory-guided generation.
pub mod synthesis;
