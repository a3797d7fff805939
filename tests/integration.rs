use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn loader_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("batch-loader");
    path
}

/// Fake deposit command: rejects any primary file with "bad" in its name,
/// otherwise appends its arguments to `calls.log` and prints a record id.
const DEPOSIT_SCRIPT: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --primaryfile=*bad*) echo "rejected: $arg" >&2; exit 1 ;;
  esac
done
echo "$@" >> calls.log
echo "Importing..."
echo "rec-$$"
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("alpha.pdf"), "alpha").unwrap();
    fs::write(files_dir.join("bad.pdf"), "bad").unwrap();
    fs::create_dir_all(files_dir.join("gamma")).unwrap();
    fs::write(files_dir.join("gamma").join("gamma.pdf"), "gamma").unwrap();
    fs::write(files_dir.join("gamma").join("cover.jpg"), "cover").unwrap();

    fs::write(root.join("deposit.sh"), DEPOSIT_SCRIPT).unwrap();

    let config_content = format!(
        r#"[deposit]
command = "sh {root}/deposit.sh"
working_dir = "{root}"
depositor = "openaccess@example.edu"

[fetch]
max_attempts = 1
retry_delay_secs = 0

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("batch-loader.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_loader(config_path: &Path, args: &[&str]) -> (String, String, Option<i32>) {
    let binary = loader_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run batch-loader binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.code())
}

fn write_csv(root: &Path, rows: &[&str]) -> PathBuf {
    let path = root.join("works.csv");
    let mut body = String::from(
        "identifier1,files,first_file,resource_type1,title1,creator1,creator2,license1,date\n",
    );
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

fn calls(root: &Path) -> Vec<String> {
    fs::read_to_string(root.join("calls.log"))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[test]
fn test_ingest_csv_with_one_rejected_item() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let csv = write_csv(
        root,
        &[
            "w1,files/alpha.pdf,,Thesis,Alpha,Doe,,CC-BY,2020",
            "w2,files/bad.pdf,,Thesis,Bad,Roe,,CC-BY,2021",
            "w3,files/gamma,files/gamma/gamma.pdf,Thesis,Gamma,Poe,Moe,CC-BY,2022",
        ],
    );

    let (stdout, stderr, code) = run_loader(
        &config_path,
        &["--report", "human", "ingest", csv.to_str().unwrap()],
    );
    assert_eq!(code, Some(2), "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("SUCCESS: Ingested w1"));
    assert!(stdout.contains("FAILURE: w2 was not ingested - DepositInvocationError"));
    assert!(stdout.contains("rejected: --primaryfile="));
    assert!(stdout.contains("SUCCESS: Ingested w3"));
    assert!(stdout.contains("Succeeded on 2 out of 3 total"));

    let retry = root.join("retry_ingest.csv");
    let text = fs::read_to_string(&retry).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "identifier1,files,first_file,resource_type1,title1,creator1,creator2,license1,date",
            "w2,files/bad.pdf,,Thesis,Bad,Roe,,CC-BY,2021",
        ]
    );
    assert!(stdout.contains(&format!("ingest {}", retry.display())));

    let calls = calls(root);
    assert_eq!(calls.len(), 2);
    assert!(calls[1].contains("--otherfiles="));
    assert!(calls[1].contains("cover.jpg"));
    assert!(calls[1].contains("--worktype=Etd"));
}

#[test]
fn test_resume_from_retry_file() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let csv = write_csv(
        root,
        &[
            "w1,files/alpha.pdf,,Thesis,Alpha,Doe,,CC-BY,2020",
            "w2,files/missing.pdf,,Thesis,Missing,Roe,,CC-BY,2021",
        ],
    );

    // No [retry] dir is configured and the binary runs from another
    // directory; the retry file still lands next to the batch file.
    let (_, _, code) = run_loader(&config_path, &["--report", "human", "ingest", csv.to_str().unwrap()]);
    assert_eq!(code, Some(2));
    let retry = root.join("retry_ingest.csv");
    assert!(retry.exists());

    // Fix the missing file and resume from the retry artifact.
    fs::write(root.join("files").join("missing.pdf"), "now here").unwrap();
    let (stdout, stderr, code) = run_loader(
        &config_path,
        &["--report", "human", "ingest", retry.to_str().unwrap()],
    );
    assert_eq!(code, Some(0), "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("SUCCESS: Ingested w2"));
    assert!(stdout.contains("Succeeded on 1 out of 1 total"));
    assert_eq!(calls(root).len(), 2);
}

#[test]
fn test_missing_required_column_is_fatal() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let csv = root.join("works.csv");
    fs::write(
        &csv,
        "identifier1,files,resource_type1,title1,creator1\nw1,files/alpha.pdf,Thesis,Alpha,Doe\n",
    )
    .unwrap();

    let (stdout, stderr, code) = run_loader(
        &config_path,
        &["--report", "human", "ingest", csv.to_str().unwrap()],
    );
    assert_eq!(code, Some(1));
    assert!(stdout.contains("CRITICAL FAILURE"));
    assert!(stderr.contains("license1"), "stderr={}", stderr);
    assert!(!stdout.contains("Succeeded on"));
    assert!(!root.join("retry_ingest.csv").exists());
    assert!(calls(root).is_empty());
}

#[test]
fn test_ingest_json_with_overrides() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let json = root.join("works.json");
    fs::write(
        &json,
        r#"[
  {"identifier": "j1", "title": ["Alpha"], "creator": ["Doe"], "license": ["CC-BY"],
   "resource_type": ["Article"], "files": "files/alpha.pdf", "repository_id": "abc123"},
  {"title": ["Gamma"], "creator": ["Poe", "Moe"], "license": ["CC-BY"],
   "resource_type": ["Article"], "files": ["files/gamma"], "first_file": "files/gamma/gamma.pdf"}
]"#,
    )
    .unwrap();

    let (stdout, stderr, code) = run_loader(
        &config_path,
        &[
            "--report",
            "human",
            "ingest",
            json.to_str().unwrap(),
            "--worktype",
            "Article",
            "--collection",
            "col9",
        ],
    );
    assert_eq!(code, Some(0), "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("SUCCESS: Ingested j1"));
    assert!(stdout.contains("SUCCESS: Ingested Gamma"));
    assert!(!root.join("retry_ingest.json").exists());

    let calls = calls(root);
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("--worktype=Article"));
    assert!(calls[0].contains("--collection=col9"));
    assert!(calls[0].contains("--update-item-id=abc123"));
    assert!(!calls[1].contains("--update-item-id"));
}

#[test]
fn test_json_failures_written_as_json() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let json = root.join("batch.json");
    fs::write(
        &json,
        r#"[{"title": ["No creator"], "license": ["CC-BY"], "resource_type": ["Article"],
             "files": "files/alpha.pdf", "pages": 12}]"#,
    )
    .unwrap();

    let (stdout, _, code) = run_loader(&config_path, &["--report", "human", "ingest", json.to_str().unwrap()]);
    assert_eq!(code, Some(2));
    assert!(stdout.contains("FAILURE: No creator was not ingested - ItemNormalizationError"));

    let retry: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("retry_ingest.json")).unwrap()).unwrap();
    assert_eq!(retry[0]["pages"], 12);
    assert_eq!(retry[0]["title"][0], "No creator");
}

#[test]
fn test_dry_run_deposits_nothing() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let csv = write_csv(root, &["w1,files/bad.pdf,,Thesis,Bad,Roe,,CC-BY,2021"]);

    let (stdout, stderr, code) = run_loader(
        &config_path,
        &["--report", "human", "ingest", csv.to_str().unwrap(), "--dry-run"],
    );
    assert_eq!(code, Some(0), "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Succeeded on 1 out of 1 total"));
    assert!(calls(root).is_empty());
}

#[test]
fn test_json_report_lines() {
    let (tmp, config_path) = setup_test_env();
    let root = tmp.path();
    let csv = write_csv(root, &["w1,files/alpha.pdf,,Thesis,Alpha,Doe,,CC-BY,2020"]);

    let (stdout, _, code) = run_loader(&config_path, &["--report", "json", "ingest", csv.to_str().unwrap()]);
    assert_eq!(code, Some(0));
    let events: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.iter().filter(|e| e["event"] == "success").count(), 1);
    let summary = events.iter().find(|e| e["event"] == "summary").unwrap();
    assert_eq!(summary["succeeded"], 1);
    assert_eq!(summary["total"], 1);
}

#[test]
fn test_check_needs_no_config() {
    let tmp = TempDir::new().unwrap();
    let csv = write_csv(
        tmp.path(),
        &[
            "w1,files/alpha.pdf,,Thesis,Alpha,Doe,,CC-BY,2020",
            "w2,,,Thesis,Beta,Roe,,CC-BY,2021",
        ],
    );
    let missing_config = tmp.path().join("nope.toml");

    let (stdout, stderr, code) = run_loader(&missing_config, &["check", csv.to_str().unwrap()]);
    assert_eq!(code, Some(2), "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("repeating    creator"));
    assert!(stdout.contains("singular     date"));
    assert!(stdout.contains("2 items, 1 invalid"));
}

#[test]
fn test_missing_config_is_fatal_for_ingest() {
    let tmp = TempDir::new().unwrap();
    let csv = write_csv(tmp.path(), &["w1,files/alpha.pdf,,Thesis,Alpha,Doe,,CC-BY,2020"]);
    let (_, stderr, code) = run_loader(&tmp.path().join("nope.toml"), &["ingest", csv.to_str().unwrap()]);
    assert_eq!(code, Some(1));
    assert!(stderr.contains("Failed to read config file"));
}
