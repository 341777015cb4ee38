use std::path::Path;

use anyhow::Context;

use crate::diffusion::model::DiffusionModel;
use crate::foundation::error::{PaintError, PaintResult};
use crate::pipeline::context::RunRequest;
use crate::pipeline::orchestrator::{Pipeline, RunSummary};

/// A failed run inside a batch.
#[derive(Debug)]
pub struct BatchFailure {
    pub prompt: String,
    pub seed: u64,
    pub error: PaintError,
}

/// Outcome of every run of a batch, in execution order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<RunSummary>,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One prompt per non-empty line; `#` starts a comment line.
pub fn read_prompts_file(path: &Path) -> PaintResult<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read prompts file '{}'", path.display()))?;
    let prompts: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_owned)
        .collect();
    if prompts.is_empty() {
        return Err(PaintError::config(format!(
            "prompts file '{}' has no prompts",
            path.display()
        )));
    }
    Ok(prompts)
}

/// Run every `prompt x seed` combination sequentially. Each run gets its own directory and fresh
/// state; failures are recorded and the batch moves on.
#[tracing::instrument(skip_all, fields(prompts = prompts.len(), seeds = seeds.len()))]
pub fn run_batch<M: DiffusionModel>(
    pipeline: &mut Pipeline<M>,
    template: &RunRequest,
    prompts: &[String],
    seeds: &[u64],
    out_root: &Path,
) -> BatchReport {
    let mut report = BatchReport::default();
    for prompt in prompts {
        let request = RunRequest {
            prompt: prompt.clone(),
            ..template.clone()
        };
        for &seed in seeds {
            match pipeline.run_with_seed(&request, seed, out_root) {
                Ok(summary) => {
                    tracing::info!(prompt = %prompt, seed, run_dir = %summary.run_dir.display(), "run complete");
                    report.completed.push(summary);
                }
                Err(error) => {
                    tracing::error!(prompt = %prompt, seed, error = %error, "run failed");
                    report.failed.push(BatchFailure {
                        prompt: prompt.clone(),
                        seed,
                        error,
                    });
                }
            }
        }
    }
    tracing::info!(
        completed = report.completed.len(),
        failed = report.failed.len(),
        "batch finished"
    );
    report
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/batch.rs"]
mod tests;
