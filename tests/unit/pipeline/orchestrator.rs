use super::*;
use crate::diffusion::analytic::AnalyticDiffusion;
use crate::foundation::core::Canvas;

fn tiny_config() -> PainterConfig {
    let mut cfg = PainterConfig::default();
    cfg.canvas = Canvas::new(32, 32).unwrap();
    cfg.strokes.num_paths = 4;
    cfg.strokes.samples_per_segment = 6;
    cfg.imit_stage.num_iter = 3;
    cfg.synth_stage.num_iter = 3;
    cfg.diffusion.num_inference_steps = 4;
    cfg.diffusion.trajectory_offset = 1;
    cfg.diffusion.resolution = 16;
    cfg.output.save_step = 2;
    cfg
}

fn write_style(dir: &Path) -> PathBuf {
    let path = dir.join("style.png");
    let img = image::RgbImage::from_fn(40, 40, |x, y| {
        if (x / 10 + y / 10) % 2 == 0 {
            image::Rgb([200, 40, 40])
        } else {
            image::Rgb([240, 240, 230])
        }
    });
    img.save(&path).unwrap();
    path
}

fn pipeline(cfg: PainterConfig) -> Pipeline<AnalyticDiffusion> {
    Pipeline::new(cfg, AnalyticDiffusion::new(&Device::Cpu).unwrap()).unwrap()
}

#[test]
fn rejects_invalid_config_before_running() {
    let model = || AnalyticDiffusion::new(&Device::Cpu).unwrap();
    let mut cfg = tiny_config();
    cfg.strokes.num_paths = 0;
    assert!(matches!(Pipeline::new(cfg, model()), Err(PaintError::Config(_))));

    let mut cfg = tiny_config();
    cfg.diffusion.resolution = 20;
    assert!(matches!(Pipeline::new(cfg, model()), Err(PaintError::Config(_))));

    let mut cfg = tiny_config();
    cfg.diffusion.num_inference_steps = 1001;
    assert!(matches!(Pipeline::new(cfg, model()), Err(PaintError::Config(_))));
}

#[test]
fn tiny_run_writes_all_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let style = write_style(dir.path());
    let out = dir.path().join("out");
    let mut p = pipeline(tiny_config());

    let summary = p.run(&RunRequest::new(&style, "a blue boat"), &out).unwrap();
    assert!(summary.style_prompt.starts_with("a painting in"));
    assert!(summary.imitation_loss.is_finite());
    assert!(summary.synthesis_loss.total.is_finite());
    assert!(summary.video.is_none());

    let root = &summary.run_dir;
    for rel in [
        "style_image/style.png",
        "style_image/style_image_input.png",
        "style_image/stroke_init_style.png",
        "style_image/stroke_init_style.svg",
        "imit_png_logs/iter0.png",
        "imit_png_logs/iter2.png",
        "imit_svg_logs/svg_iter0.svg",
        "style_result.svg",
        "style_result.png",
        "sd_sample/decode_zT.png",
        "sd_sample/samples.png",
        "sd_sample/target.png",
        "png_logs/iter0.png",
        "svg_logs/svg_iter2.svg",
        "final_svg.svg",
        "final_render.png",
    ] {
        assert!(root.join(rel).is_file(), "missing {rel}");
    }
    let samples = image::open(root.join("sd_sample/samples.png")).unwrap();
    assert_eq!((samples.width(), samples.height()), (48, 16));
    assert!(!root.join("imit_png_logs/iter1.png").exists());
}

#[test]
fn explicit_style_prompt_skips_captioning() {
    let dir = tempfile::tempdir().unwrap();
    let style = write_style(dir.path());
    let mut request = RunRequest::new(&style, "a boat");
    request.style_prompt = Some("checkered red cloth".to_owned());
    let summary = pipeline(tiny_config()).run(&request, dir.path()).unwrap();
    assert_eq!(summary.style_prompt, "checkered red cloth");
}

#[test]
fn frames_are_captured_when_video_is_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let style = write_style(dir.path());
    let mut cfg = tiny_config();
    cfg.output.make_video = true;
    cfg.output.frame_freq = 2;
    let summary = pipeline(cfg).run(&RunRequest::new(&style, "a boat"), dir.path()).unwrap();
    // Steps 0 and 2, where 2 is also the last step.
    let frames = summary.run_dir.join("frame_logs");
    assert!(frames.join("iter0.png").is_file());
    assert!(frames.join("iter1.png").is_file());
    assert!(!frames.join("iter2.png").exists());
}

#[test]
fn missing_style_image_fails_during_init() {
    let dir = tempfile::tempdir().unwrap();
    let err = pipeline(tiny_config())
        .run(&RunRequest::new(dir.path().join("nope.png"), "a boat"), dir.path())
        .unwrap_err();
    match err {
        PaintError::Stage {
            stage, location, ..
        } => {
            assert_eq!(stage, PipelineStage::Init);
            assert_eq!(location, StageLocation::Setup);
        }
        other => panic!("unexpected {other:?}"),
    }
}
