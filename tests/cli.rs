use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn meanings(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_meanings"))
        .current_dir(dir)
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("LLM_MODEL")
        .env("RUST_LOG", "warn")
        .output()
        .expect("run meanings")
}

#[test]
fn compare_writes_report_and_json() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let input = temp_dir.path().join("enriched.csv");
    fs::write(
        &input,
        "code,name,meanings_gemini,meanings_openai\n\
         AAA,Alpha,,alpha\n\
         BBB,Bravo,Application (software),application; bee\n\
         CCC,Charlie,charlie,\n",
    )
    .expect("write input");

    let output = meanings(
        temp_dir.path(),
        &["compare", "--input", "enriched.csv", "--output", "report.html", "--json"],
    );
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let html = fs::read_to_string(temp_dir.path().join("report.html")).expect("read report");
    assert!(html.contains("Meanings Comparison Report"));
    assert!(html.contains("Gemini"));
    assert!(html.contains("Openai"));

    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    let json_end = stdout.rfind('}').expect("json in stdout");
    let stats: serde_json::Value =
        serde_json::from_str(&stdout[..=json_end]).expect("parse stats json");
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["pairwise"][0]["both"], 1);
    assert_eq!(stats["agreement"][0]["agree_count"], 1);
    assert!(stdout.contains("Report written to report.html"));
}

#[test]
fn compare_without_annotation_columns_fails() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    fs::write(temp_dir.path().join("plain.csv"), "code,name\nAAA,Alpha\n").expect("write input");

    let output = meanings(temp_dir.path(), &["compare", "--input", "plain.csv"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no meanings_* columns"), "stderr: {stderr}");
    assert!(!temp_dir.path().join("meanings_comparison.html").exists());
}

#[test]
fn enrich_with_missing_input_fails() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let output = meanings(temp_dir.path(), &["enrich", "--input", "missing.csv"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("input file not found"), "stderr: {stderr}");
}

#[test]
fn enrich_without_credential_fails_before_any_output() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    fs::write(temp_dir.path().join("codes.csv"), "code,name\nBYE,Bye\n").expect("write input");

    let output = meanings(
        temp_dir.path(),
        &["enrich", "--provider", "openai", "--input", "codes.csv"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {stderr}");
    assert!(!temp_dir
        .path()
        .join("airport-code-dataset-enriched.csv")
        .exists());
    assert!(!temp_dir.path().join("enrichment_checkpoint.json").exists());
}

#[test]
fn enrich_rejects_unknown_provider() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    fs::write(temp_dir.path().join("codes.csv"), "code\nBYE\n").expect("write input");

    let output = meanings(
        temp_dir.path(),
        &["enrich", "--provider", "nope", "--input", "codes.csv"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown provider"), "stderr: {stderr}");
}
