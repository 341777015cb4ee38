use candle_core::{DType, Device};

use super::*;
use crate::diffusion::analytic::AnalyticDiffusion;

struct CountingHook {
    steps: Vec<(usize, usize)>,
}

impl StepHook for CountingHook {
    fn on_step_end(&mut self, step: usize, timestep: usize, latents: Tensor) -> PaintResult<Tensor> {
        self.steps.push((step, timestep));
        Ok(latents)
    }
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
    (a - b)
        .unwrap()
        .abs()
        .unwrap()
        .max_all()
        .unwrap()
        .to_scalar::<f32>()
        .unwrap()
}

#[test]
fn unit_guidance_equals_conditional_prediction() {
    let model = AnalyticDiffusion::new(&Device::Cpu).unwrap();
    let latents = Tensor::randn(0f32, 1f32, (1, 3, 2, 2), &Device::Cpu).unwrap();
    let embeds = model.encode_prompt(&["", "a green hill"]).unwrap();
    let guided = model.guided_noise(&latents, 501, &embeds, None, 1.0).unwrap();
    let cond_only = model.encode_prompt(&["a green hill"]).unwrap();
    let direct = model.predict_noise(&latents, 501, &cond_only, None).unwrap();
    assert!(max_abs_diff(&guided, &direct) < 1e-5);
}

#[test]
fn generate_calls_the_hook_once_per_step_in_order() {
    let mut model = AnalyticDiffusion::new(&Device::Cpu).unwrap();
    let pos = model.encode_prompt(&["blue"]).unwrap();
    let neg = model.encode_prompt(&[""]).unwrap();
    let mut hook = CountingHook { steps: Vec::new() };
    let out = model
        .generate(
            GenerationRequest {
                prompt_embeds: &pos,
                negative_embeds: &neg,
                latents: Tensor::zeros((1, 3, 2, 2), DType::F32, &Device::Cpu).unwrap(),
                style: None,
                num_steps: 5,
                guidance_scale: 3.0,
            },
            &mut hook,
        )
        .unwrap();
    assert_eq!(out.dims(), &[1, 3, 2, 2]);
    assert_eq!(
        hook.steps,
        vec![(0, 801), (1, 601), (2, 401), (3, 201), (4, 1)]
    );
}

#[test]
fn generate_rejects_mismatched_embedding_batch() {
    let mut model = AnalyticDiffusion::new(&Device::Cpu).unwrap();
    let pos = model.encode_prompt(&["a", "b"]).unwrap();
    let neg = model.encode_prompt(&["", ""]).unwrap();
    let err = model
        .generate(
            GenerationRequest {
                prompt_embeds: &pos,
                negative_embeds: &neg,
                latents: Tensor::zeros((3, 3, 2, 2), DType::F32, &Device::Cpu).unwrap(),
                style: None,
                num_steps: 2,
                guidance_scale: 1.0,
            },
            &mut NoopHook,
        )
        .unwrap_err();
    assert!(matches!(err, PaintError::Config(_)));
}

#[test]
fn prompt_embeds_concat_stacks_rows() {
    let model = AnalyticDiffusion::new(&Device::Cpu).unwrap();
    let a = model.encode_prompt(&["red"]).unwrap();
    let b = model.encode_prompt(&["", "blue"]).unwrap();
    let both = PromptEmbeds::concat(&[&a, &b]).unwrap();
    assert_eq!(both.batch_size().unwrap(), 3);
    assert_eq!(both.pooled.flatten_all().unwrap().to_vec1::<f32>().unwrap(), vec![1.0, 0.0, 1.0]);
}
