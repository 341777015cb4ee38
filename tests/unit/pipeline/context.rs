use super::*;

#[test]
fn run_dir_name_encodes_seed_canvas_and_model() {
    let canvas = Canvas::new(256, 128).unwrap();
    assert_eq!(
        run_dir_name(7, canvas, "analytic", 1_700_000_000),
        "seed7-canvas-256-128-analytic-1700000000"
    );
}

#[test]
fn create_lays_out_every_directory() {
    let out = tempfile::tempdir().unwrap();
    let mut config = PainterConfig::default();
    config.output.make_video = true;
    let ctx = RunContext::create(out.path(), config, "analytic").unwrap();
    let d = &ctx.dirs;
    for dir in [
        &d.root,
        &d.style,
        &d.imit_png_logs,
        &d.imit_svg_logs,
        &d.sd_sample,
        &d.png_logs,
        &d.svg_logs,
    ] {
        assert!(dir.is_dir(), "{}", dir.display());
    }
    assert!(d.frame_logs.as_ref().unwrap().is_dir());
    assert_eq!(d.final_svg().file_name().unwrap(), "final_svg.svg");
    assert_eq!(d.final_png().file_name().unwrap(), "final_render.png");
    assert!(d.root.file_name().unwrap().to_string_lossy().starts_with("seed1-canvas-256-256-analytic-"));
}

#[test]
fn frame_dir_only_with_video() {
    let out = tempfile::tempdir().unwrap();
    let ctx = RunContext::create(out.path(), PainterConfig::default(), "analytic").unwrap();
    assert!(ctx.dirs.frame_logs.is_none());
}

#[test]
fn same_second_runs_get_distinct_dirs() {
    let out = tempfile::tempdir().unwrap();
    let a = RunContext::create(out.path(), PainterConfig::default(), "m").unwrap();
    let b = RunContext::create(out.path(), PainterConfig::default(), "m").unwrap();
    assert_ne!(a.dirs.root, b.dirs.root);
}

#[test]
fn tags_use_iteration_only_inside_loops() {
    let out = tempfile::tempdir().unwrap();
    let mut ctx = RunContext::create(out.path(), PainterConfig::default(), "m").unwrap();
    ctx.enter(PipelineStage::Stage2Loop);
    ctx.step = 12;
    match ctx.tag(PaintError::numeric("nan")) {
        PaintError::Stage {
            stage, location, ..
        } => {
            assert_eq!(stage, PipelineStage::Stage2Loop);
            assert_eq!(location, StageLocation::Iteration(12));
        }
        other => panic!("unexpected {other:?}"),
    }
    ctx.enter(PipelineStage::Finalize);
    assert_eq!(ctx.location(), StageLocation::Setup);
}

#[test]
fn save_steps_follow_the_cadence() {
    let out = tempfile::tempdir().unwrap();
    let mut config = PainterConfig::default();
    config.output.save_step = 10;
    let ctx = RunContext::create(out.path(), config, "m").unwrap();
    assert!(ctx.is_save_step(0));
    assert!(!ctx.is_save_step(5));
    assert!(ctx.is_save_step(20));
}
