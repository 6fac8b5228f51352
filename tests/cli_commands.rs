//! End-to-end tests for the hldflow binary
//!
//! Every test runs in a fresh temporary directory with `HOME` and
//! `XDG_CONFIG_HOME` pointed inside it, so no user or repository
//! configuration leaks in.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        // Stops upward config discovery at the workspace.
        fs::create_dir(dir.path().join(".git")).unwrap();
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn pdf(&self) -> PathBuf {
        self.file("requirements.pdf", "%PDF-1.7\n")
    }

    fn hldflow(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_hldflow"));
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env_remove("HLDFLOW_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_stages_json_describes_default_pipeline() {
    let ws = Workspace::new();
    let output = ws.hldflow().args(["stages", "--json"]).output().unwrap();
    assert!(output.status.success());

    let info = stdout_json(&output);
    assert_eq!(info["strategy"], "sequential");
    assert_eq!(info["supports_resume"], false);
    let names: Vec<&str> = info["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        [
            "pdf_extraction",
            "auth_integrations",
            "domain_api_design",
            "behavior_quality",
            "diagram_generation",
            "output_composition",
        ]
    );
}

#[test]
fn test_stages_parallel_alias_groups_analysis_stages() {
    let ws = Workspace::new();
    let output = ws
        .hldflow()
        .args(["stages", "--strategy", "parallel", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let info = stdout_json(&output);
    assert_eq!(info["strategy"], "optimized-sequential");
    assert_eq!(info["batches"].as_array().unwrap().len(), 4);
    assert_eq!(info["batches"][1].as_array().unwrap().len(), 3);
}

#[test]
fn test_dry_run_succeeds_and_writes_state() {
    let ws = Workspace::new();
    let input = ws.pdf();

    let output = ws
        .hldflow()
        .arg("run")
        .arg(&input)
        .args(["--dry-run", "--json", "--state-out", "out/run.json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");

    let report = stdout_json(&output);
    assert_eq!(report["outcome"], "succeeded");
    assert_eq!(report["completed"], 6);
    assert_eq!(report["identity"], "requirements");

    let state: Value =
        serde_json::from_str(&fs::read_to_string(ws.path().join("out/run.json")).unwrap())
            .unwrap();
    assert_eq!(state["results"].as_object().unwrap().len(), 6);
}

#[test]
fn test_text_report_lists_stages() {
    let ws = Workspace::new();
    let input = ws.pdf();

    ws.hldflow()
        .arg("run")
        .arg(&input)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Outcome: succeeded"))
        .stdout(predicate::str::contains("✓ pdf_extraction"))
        .stdout(predicate::str::contains("[optional]"));
}

#[test]
fn test_non_pdf_input_is_an_input_error() {
    let ws = Workspace::new();
    let input = ws.file("requirements.docx", "not a pdf");

    ws.hldflow()
        .arg("run")
        .arg(&input)
        .arg("--dry-run")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_missing_input_is_an_input_error() {
    let ws = Workspace::new();
    ws.hldflow()
        .args(["run", "absent.pdf", "--dry-run"])
        .assert()
        .code(3);
}

#[test]
fn test_invalid_cli_value_exits_with_config_code() {
    let ws = Workspace::new();
    let input = ws.pdf();

    ws.hldflow()
        .arg("run")
        .arg(&input)
        .args(["--strategy", "round-robin"])
        .assert()
        .code(2);

    ws.hldflow()
        .arg("run")
        .arg(&input)
        .args(["--run-timeout-secs", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("run_timeout_secs"));
}

#[test]
fn test_unknown_credential_stage_in_config_file() {
    let ws = Workspace::new();
    let input = ws.pdf();
    ws.file(
        ".hldflow/config.toml",
        "[credentials.stages]\nextract = \"GEMINI_API_KEY_4\"\n",
    );

    ws.hldflow()
        .arg("run")
        .arg(&input)
        .arg("--dry-run")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("credentials.stages.extract"));
}

#[test]
fn test_status_reads_saved_state() {
    let ws = Workspace::new();
    let input = ws.pdf();
    ws.hldflow()
        .arg("run")
        .arg(&input)
        .args(["--dry-run", "--state-out", "run.json"])
        .assert()
        .success();

    let output = ws
        .hldflow()
        .args(["status", "run.json", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["outcome"], "succeeded");
    assert_eq!(report["strategy"], "sequential");

    ws.hldflow()
        .args(["status", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn test_resume_after_reset_reruns_stage() {
    let ws = Workspace::new();
    let input = ws.pdf();
    ws.hldflow()
        .arg("run")
        .arg(&input)
        .args(["--dry-run", "--state-out", "run.json"])
        .assert()
        .success();

    let output = ws
        .hldflow()
        .args([
            "resume",
            "run.json",
            "--reset",
            "diagram_generation",
            "--dry-run",
            "--json",
            "--state-out",
            "resumed.json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{output:?}");
    let report = stdout_json(&output);
    assert_eq!(report["outcome"], "succeeded");
    assert_eq!(report["strategy"], "conditional");
    assert!(ws.path().join("resumed.json").is_file());
}

#[test]
fn test_resume_rejects_bad_stage_requests() {
    let ws = Workspace::new();
    let input = ws.pdf();
    ws.hldflow()
        .arg("run")
        .arg(&input)
        .args(["--dry-run", "--state-out", "run.json"])
        .assert()
        .success();

    ws.hldflow()
        .args(["resume", "run.json", "--reset", "summarize", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--reset"));

    ws.hldflow()
        .args(["resume", "run.json", "--retry", "pdf_extraction", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("critical"));

    // auth_integrations completed, so there is nothing to retry.
    ws.hldflow()
        .args(["resume", "run.json", "--retry", "auth_integrations", "--dry-run"])
        .assert()
        .code(2);
}

#[cfg(unix)]
mod analyzer {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Analyzer that fails for `auth_integrations` and answers every other
    /// stage with a small JSON object.
    fn analyzer(ws: &Workspace) -> PathBuf {
        let script = ws.file(
            "analyzer.sh",
            "#!/bin/sh\n\
             cat > /dev/null\n\
             if [ \"$1\" = auth_integrations ]; then\n\
             echo 'quota exceeded' >&2\n\
             exit 1\n\
             fi\n\
             printf '{\"stage\":\"%s\"}\\n' \"$1\"\n",
        );
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();
        script
    }

    #[test]
    fn test_optional_stage_failure_degrades_run() {
        let ws = Workspace::new();
        let input = ws.pdf();
        let script = analyzer(&ws);

        let output = ws
            .hldflow()
            .arg("run")
            .arg(&input)
            .arg("--analyzer-command")
            .arg(&script)
            .args(["--json", "--state-out", "run.json"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(4), "{output:?}");

        let report = stdout_json(&output);
        assert_eq!(report["outcome"], "degraded");
        assert_eq!(report["failed"], 1);
        assert_eq!(report["completed"], 5);
        assert!(
            report["warnings"]
                .as_array()
                .unwrap()
                .iter()
                .any(|w| w.as_str().unwrap().contains("auth_integrations"))
        );
    }

    #[test]
    fn test_reset_reruns_stages_that_consumed_the_reset_stage() {
        let ws = Workspace::new();
        let input = ws.pdf();
        let script = analyzer(&ws);

        ws.hldflow()
            .arg("run")
            .arg(&input)
            .arg("--analyzer-command")
            .arg(&script)
            .args(["--state-out", "run.json"])
            .assert()
            .code(4);

        let output = ws
            .hldflow()
            .args(["resume", "run.json", "--reset", "auth_integrations", "--dry-run"])
            .args(["--json", "--state-out", "resumed.json"])
            .output()
            .unwrap();
        assert!(output.status.success(), "{output:?}");

        let state: Value =
            serde_json::from_str(&fs::read_to_string(ws.path().join("resumed.json")).unwrap())
                .unwrap();
        let results = &state["results"];
        // Untouched upstream work keeps the analyzer's answer.
        assert_eq!(results["pdf_extraction"], serde_json::json!({"stage": "pdf_extraction"}));
        assert_eq!(results["domain_api_design"]["stage"], "domain_api_design");
        assert!(results["domain_api_design"].get("dry_run").is_none());
        // Everything built on the reset stage ran again and saw its result.
        assert_eq!(results["auth_integrations"]["dry_run"], true);
        assert_eq!(results["diagram_generation"]["dry_run"], true);
        assert!(
            results["diagram_generation"]["inputs"]
                .as_array()
                .unwrap()
                .iter()
                .any(|input| input == "auth_integrations")
        );
        assert_eq!(results["output_composition"]["dry_run"], true);
    }

    #[test]
    fn test_conditional_retry_of_failed_optional_stage() {
        let ws = Workspace::new();
        let input = ws.pdf();
        let script = analyzer(&ws);

        ws.hldflow()
            .arg("run")
            .arg(&input)
            .arg("--analyzer-command")
            .arg(&script)
            .args(["--state-out", "run.json"])
            .assert()
            .code(4);

        // The retried stage fails again; nothing else runs.
        let output = ws
            .hldflow()
            .args(["resume", "run.json", "--retry", "auth_integrations", "--json"])
            .arg("--analyzer-command")
            .arg(&script)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(4), "{output:?}");
        let report = stdout_json(&output);
        assert_eq!(report["errors"].as_array().unwrap().len(), 2);

        ws.hldflow()
            .args(["resume", "run.json", "--retry", "auth_integrations"])
            .args(["--strategy", "sequential", "--dry-run"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("conditional"));
    }
}
