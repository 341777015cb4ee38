//! Per-group stroke parameter optimization.

/// Adam groups, gradient accumulation and post-step clamps.
pub mod optimizer;
/// Learning-rate decay multipliers.
pub mod schedule;
