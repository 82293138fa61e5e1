use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env(backend: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(docs_dir.join("drafts")).unwrap();
    fs::write(
        docs_dir.join("intro.txt"),
        "Course Title: Intro to X\nCourse Link: https://example.com/x\nCourse Instructor: Ada Lovelace\n\n\
         Lesson 0: Welcome\nWelcome to the course.\n\n\
         Lesson 1: Foundations\nLesson Link: https://example.com/x/1\nFoundations cover variables and loops.\n",
    )
    .unwrap();
    fs::write(
        docs_dir.join("bread.txt"),
        "Course Title: Baking Bread Basics\n\nLesson 1: Starters\nFeed the sourdough starter every day.\n",
    )
    .unwrap();
    fs::write(docs_dir.join("broken.txt"), "Lesson 1: No header\nBody.\n").unwrap();
    fs::write(
        docs_dir.join("drafts/wip.txt"),
        "Course Title: Work In Progress\n\nLesson 1: Soon\nNot ready.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
backend = "{backend}"
path = "{root}/data/courses.sqlite"

[documents]
root = "{root}/docs"
include_globs = ["**/*.txt"]
exclude_globs = ["drafts/**"]

[embedding]
provider = "hash"
"#,
        backend = backend,
        root = root.display(),
    );

    let config_path = root.join("crag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_crag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_crag"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("ANTHROPIC_API_KEY")
        .output()
        .expect("failed to run crag");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env("sqlite");
    let (stdout, _, ok) = run_crag(&config, &["init"]);
    assert!(ok);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/courses.sqlite").exists());

    let (_, _, ok) = run_crag(&config, &["init"]);
    assert!(ok, "init should be idempotent");
}

#[test]
fn test_ingest_reports_failures_and_continues() {
    let (_tmp, config) = setup_test_env("sqlite");
    let (stdout, stderr, ok) = run_crag(&config, &["ingest"]);
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.contains("Intro to X (2 lessons, 2 chunks)"));
    assert!(stdout.contains("FAILED"));
    assert!(stdout.contains("broken.txt"));
    assert!(stdout.contains("Ingested 2 courses"));
    assert!(!stdout.contains("Work In Progress"));
}

#[test]
fn test_courses_after_ingest() {
    let (_tmp, config) = setup_test_env("sqlite");
    run_crag(&config, &["ingest"]);
    run_crag(&config, &["ingest"]);

    let (stdout, _, ok) = run_crag(&config, &["courses"]);
    assert!(ok);
    assert!(stdout.contains("2 courses"));
    let bread = stdout.find("Baking Bread Basics").unwrap();
    let intro = stdout.find("Intro to X").unwrap();
    assert!(bread < intro);
}

#[test]
fn test_outline_with_loose_title() {
    let (_tmp, config) = setup_test_env("memory");
    let (stdout, stderr, ok) = run_crag(&config, &["outline", "intro x"]);
    assert!(ok, "stderr: {}", stderr);
    assert!(stdout.contains("**Intro to X**"));
    assert!(stdout.contains("Instructor: Ada Lovelace"));
    assert!(stdout.contains("Course Link: https://example.com/x"));
    assert!(stdout.contains("  0. Welcome"));
    assert!(stdout.contains("  1. Foundations"));
}

#[test]
fn test_outline_unknown_course() {
    let (_tmp, config) = setup_test_env("memory");
    let (stdout, _, ok) = run_crag(&config, &["outline", "quantum chemistry"]);
    assert!(ok);
    assert!(stdout.contains("No course found matching 'quantum chemistry'"));
    assert!(stdout.contains("Available courses: Baking Bread Basics, Intro to X"));
}

#[test]
fn test_query_without_api_key_fails() {
    let (_tmp, config) = setup_test_env("memory");
    let (_, stderr, ok) = run_crag(&config, &["query", "What is X?"]);
    assert!(!ok);
    assert!(stderr.contains("ANTHROPIC_API_KEY"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run_crag(&tmp.path().join("nope.toml"), &["courses"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
