use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn cyd_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("cyd");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("index.json"),
        r#"{
  "embedding_model": "text-embedding-ada-002",
  "chunks": [
    { "id": "a#0", "source": "isw-2023-02-01.html", "text": "Russian forces continue offensive operations.", "embedding": [0.1, 0.9, 0.0] },
    { "id": "a#1", "source": "isw-2023-02-01.html", "text": "Ukrainian forces repelled attacks.", "embedding": [0.2, 0.8, 0.1] },
    { "id": "b#0", "source": "isw-2023-02-02.html", "text": "Wagner Group fighters near Bakhmut.", "embedding": [0.9, 0.1, 0.3] }
  ]
}"#,
    )
    .unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("cyd.toml");
    fs::write(
        &config_path,
        format!(
            r#"[index]
path = "{}/data/index.json"

[openai]
embedding_model = "text-embedding-3-small"

[logging]
level = "warn"
"#,
            root.display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_cyd(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = cyd_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run cyd binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_index_summary() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_cyd(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Chunks:      3"));
    assert!(stdout.contains("Sources:     2"));
    assert!(stdout.contains("Dimensions:  3"));
    assert!(stdout.contains("isw-2023-02-02.html"));
    // Index and query embedding models differ in this config.
    assert!(stdout.contains("WARNING"));
}

#[test]
fn test_ask_without_key_prints_fallback() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_cyd(&config_path, &["ask", "What is the focus of the Russian offensive?"]);
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(stdout.trim(), "Please paste your OpenAI key to use");
}

#[test]
fn test_ask_with_malformed_key_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_cyd(&config_path, &["ask", "hello", "--api-key", "sk-\u{7f}"]);
    assert!(!success);
    assert!(stderr.contains("Failed to construct chain"));
}

#[test]
fn test_missing_index_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_file(tmp.path().join("data/index.json")).unwrap();

    let (_, stderr, success) = run_cyd(&config_path, &["index"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read document index"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_cyd(&tmp.path().join("nope.toml"), &["index"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
