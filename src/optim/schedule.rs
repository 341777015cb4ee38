use crate::config::model::LrDecay;

/// Learning-rate multiplier at `step` for the given decay form and sorted boundaries.
///
/// Always in `(0, 1]` and non-increasing in `step`.
pub fn decay_multiplier(decay: LrDecay, step: u32, boundaries: &[u32]) -> f64 {
    match decay {
        LrDecay::Step { factor } => {
            let passed = boundaries.iter().filter(|&&b| step >= b).count();
            factor.powi(passed as i32)
        }
        LrDecay::Exponential { gamma } => match boundaries.first() {
            Some(&first) if step >= first => gamma.powf(f64::from(step - first + 1)),
            _ => 1.0,
        },
    }
}

#[cfg(test)]
#[path = "../../tests/unit/optim/schedule.rs"]
mod tests;
