use super::*;

#[test]
fn prompts_file_skips_blanks_and_comments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prompts.txt");
    std::fs::write(&path, "a red boat\n\n# skipped\n  a blue house  \n").unwrap();
    assert_eq!(
        read_prompts_file(&path).unwrap(),
        vec!["a red boat".to_owned(), "a blue house".to_owned()]
    );
}

#[test]
fn empty_or_missing_prompts_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    std::fs::write(&path, "\n# nothing\n").unwrap();
    assert!(matches!(read_prompts_file(&path), Err(PaintError::Config(_))));
    assert!(read_prompts_file(&dir.path().join("missing.txt")).is_err());
}

#[test]
fn report_counts_runs() {
    let mut report = BatchReport::default();
    assert!(report.is_success());
    report.failed.push(BatchFailure {
        prompt: "p".to_owned(),
        seed: 1,
        error: PaintError::inference("boom"),
    });
    assert_eq!(report.total(), 1);
    assert!(!report.is_success());
}
