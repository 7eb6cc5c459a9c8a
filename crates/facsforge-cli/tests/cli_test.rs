//! 実際の facsforge プロセスを通したテスト

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const CONFIG: &str = r#"
metadata:
  experiment_name: cli test
panel:
  FSC-A: {}
  SSC-A: {}
  CD3: {fluor: FITC}
  Time: {ignore: true}
celltypes:
  Lymphocytes:
    gate:
      type: rectangle
      channels: [FSC-A, SSC-A]
      vertices: [[0, 0], [100000, 100000]]
  T cells:
    parent: Lymphocytes
    positive: [CD3]
  B cells:
    parent: Lymphocytes
    negative: [CD19]
celltypes_of_interest: [Lymphocytes, T cells]
"#;

const EVENTS: &str = "\
FSC-A,SSC-A,CD3,Time
10000,10000,50,0
60000,60000,800,1
120000,20000,900,2
80000,80000,700,3
20000,130000,30,4
";

fn facsforge(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_facsforge"))
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "info")
        .output()
        .expect("Failed to run facsforge")
}

fn data_lines(path: &Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count() - 1
}

#[test]
fn test_analyze_single_sample() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.yaml"), CONFIG).unwrap();
    fs::write(dir.path().join("s1.csv"), EVENTS).unwrap();

    let out = facsforge(&["analyze", "s1.csv", "--config", "config.yaml", "-o", "out"], dir.path());
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let outdir = dir.path().join("out");
    assert_eq!(data_lines(&outdir.join("gated_Lymphocytes.csv")), 3);
    assert!(outdir.join("gated_T cells.csv").exists());
    // celltypes_of_interest にないので書き出さない
    assert!(!outdir.join("gated_B cells.csv").exists());

    let header = fs::read_to_string(outdir.join("gated_Lymphocytes.csv")).unwrap();
    assert!(header.starts_with("FSC-A,SSC-A,CD3\n"), "Time must be dropped: {header}");

    let thresholds: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(outdir.join("thresholds.json")).unwrap()).unwrap();
    assert!(thresholds.get("CD3").is_some());
    assert!(thresholds.get("FSC-A").is_none());

    let summary = fs::read_to_string(outdir.join("summary.csv")).unwrap();
    assert!(summary.starts_with("population,parent,events,percent_of_parent,sample_id\n"));
    assert_eq!(summary.lines().count(), 4);

    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("CD19"), "missing-threshold warning expected: {stderr}");
}

#[test]
fn test_analyze_multiple_samples_merges() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.yaml"), CONFIG).unwrap();
    fs::write(dir.path().join("a.csv"), EVENTS).unwrap();
    fs::write(dir.path().join("b.csv"), EVENTS).unwrap();

    let out = facsforge(&["analyze", "a.csv", "b.csv", "--config", "config.yaml"], dir.path());
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let outdir = dir.path().join("analysis_out");
    assert!(outdir.join("a").join("gated_Lymphocytes.csv").exists());
    assert!(outdir.join("b").join("gated_Lymphocytes.csv").exists());

    let merged = fs::read_to_string(outdir.join("merged").join("gated_Lymphocytes.csv")).unwrap();
    assert!(merged.starts_with("FSC-A,SSC-A,CD3,sample_id\n"));
    assert_eq!(merged.lines().count(), 7);
    assert_eq!(merged.lines().filter(|l| l.ends_with(",a")).count(), 3);
    assert_eq!(merged.lines().filter(|l| l.ends_with(",b")).count(), 3);
}

#[test]
fn test_analyze_cycle_fails() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        "celltypes:\n  A: {parent: C}\n  B: {parent: A}\n  C: {parent: B}\n",
    )
    .unwrap();
    fs::write(dir.path().join("s1.csv"), EVENTS).unwrap();

    let out = facsforge(&["analyze", "s1.csv", "--config", "config.yaml"], dir.path());
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unresolved: {A, B, C}"), "{stderr}");
}

#[test]
fn test_analyze_duplicate_sample_ids_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.yaml"), CONFIG).unwrap();
    fs::create_dir(dir.path().join("d1")).unwrap();
    fs::create_dir(dir.path().join("d2")).unwrap();
    fs::write(dir.path().join("d1").join("s.csv"), EVENTS).unwrap();
    fs::write(dir.path().join("d2").join("s.csv"), EVENTS).unwrap();

    let out = facsforge(&["analyze", "d1/s.csv", "d2/s.csv", "--config", "config.yaml"], dir.path());
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("duplicate sample id 's'"), "{stderr}");
    // どちらのサンプルも書き出す前に止まる
    assert!(!dir.path().join("analysis_out").join("s").exists());
}

#[test]
fn test_analyze_failure_exports_resolved_populations() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.yaml"),
        "celltypes:\n  Root: {}\n  A: {parent: C}\n  B: {parent: A}\n  C: {parent: B}\n",
    )
    .unwrap();
    fs::write(dir.path().join("s1.csv"), EVENTS).unwrap();

    let out = facsforge(&["analyze", "s1.csv", "--config", "config.yaml"], dir.path());
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unresolved: {A, B, C}"), "{stderr}");

    let outdir = dir.path().join("analysis_out");
    assert_eq!(data_lines(&outdir.join("gated_Root.csv")), 5);
    assert!(!outdir.join("gated_A.csv").exists());
    assert!(!outdir.join("summary.csv").exists());
}

#[test]
fn test_analyze_bad_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.yaml"), "celltypes:\n  A: {parent: Missing}\n").unwrap();
    fs::write(dir.path().join("s1.csv"), EVENTS).unwrap();

    let out = facsforge(&["analyze", "s1.csv", "--config", "config.yaml"], dir.path());
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Missing"), "{stderr}");
}

#[test]
fn test_generate_config_skeleton() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("s1.csv"), EVENTS).unwrap();

    let out = facsforge(&["generate-config", "s1.csv", "skeleton.yaml"], dir.path());
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let yaml: serde_yaml::Value =
        serde_yaml::from_str(&fs::read_to_string(dir.path().join("skeleton.yaml")).unwrap()).unwrap();
    let panel = yaml["panel"].as_mapping().unwrap();
    assert_eq!(panel.len(), 4);
    for (_, info) in panel {
        assert_eq!(info["ignore"].as_bool(), Some(true));
    }
    assert_eq!(yaml["metadata"]["experiment_name"].as_str(), Some("s1"));
}
