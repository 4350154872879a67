use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("arclus");
    let mut cmd = Command::new(path);
    for var in [
        "ARCLUS_CLAIMS",
        "ARCLUS_PREMISES",
        "ARCLUS_SCORES",
        "ARCLUS_ASSIGNMENTS",
        "ARCLUS_OUTPUT_ROOT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Claims 1 and 2 point along the two axes; premise `a` matches claim 1,
/// `c` matches claim 2 and `b` is a near-duplicate of `a`.
fn write_fixture(dir: &Path) {
    fs::write(
        dir.join("claims.jsonl"),
        "{\"id\": 1, \"embedding\": [1.0, 0.0]}\n{\"id\": 2, \"embedding\": [0.0, 1.0]}\n",
    )
    .unwrap();
    fs::write(
        dir.join("premises.jsonl"),
        "{\"id\": \"a\", \"embedding\": [1.0, 0.0]}\n\
         {\"id\": \"b\", \"embedding\": [0.9, 0.1]}\n\
         {\"id\": \"c\", \"embedding\": [0.0, 1.0]}\n",
    )
    .unwrap();
    fs::write(
        dir.join("assignments.tsv"),
        "claim_id\tpremise_id\trelevance\tpremise_cluster\n\
         1\ta\t2\t0\n\
         1\tb\t1\t0\n\
         1\tc\t0\t1\n\
         2\ta\t0\t0\n\
         2\tc\t2\t1\n",
    )
    .unwrap();
}

fn evaluate_args(dir: &Path) -> Vec<String> {
    let path = |name: &str| dir.join(name).display().to_string();
    vec![
        "evaluate".into(),
        "--method".into(),
        "zero_shot_knn".into(),
        "--similarity".into(),
        "cosine".into(),
        "--claims".into(),
        path("claims.jsonl"),
        "--premises".into(),
        path("premises.jsonl"),
        "--assignments".into(),
        path("assignments.tsv"),
        "--output-root".into(),
        path("out"),
        "--k".into(),
        "1".into(),
    ]
}

fn result_files(dir: &Path, extension: &str) -> Vec<std::path::PathBuf> {
    fs::read_dir(dir.join("out"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect()
}

#[test]
fn evaluate_writes_results_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    bin()
        .args(evaluate_args(dir.path()))
        .assert()
        .success()
        .stdout(predicate::str::contains("k=1 ndcg=1.0000 evaluated=2 skipped=0"));

    let tsvs = result_files(dir.path(), "tsv");
    assert_eq!(tsvs.len(), 1);
    let stem = tsvs[0].file_stem().unwrap().to_str().unwrap().to_string();
    assert_eq!(stem.len(), 20);

    let text = fs::read_to_string(&tsvs[0]).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("claim_id\tk\tndcg"));
    assert!(lines[1].starts_with("1\t1\t1\t"));
    assert!(lines[2].starts_with("2\t1\t1\t"));
    assert!(lines[3].starts_with("mean\t1\t1\t"));

    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out").join(format!("{stem}.json"))).unwrap())
            .unwrap();
    assert_eq!(manifest["status"], "completed");
    assert_eq!(manifest["run_id"], Value::String(stem));
    assert_eq!(manifest["claims"], 2);
}

#[test]
fn evaluate_skips_existing_results() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    bin().args(evaluate_args(dir.path())).assert().success();
    let first = fs::read_to_string(&result_files(dir.path(), "tsv")[0]).unwrap();

    bin()
        .args(evaluate_args(dir.path()))
        .assert()
        .success()
        .stdout(predicate::str::contains("output="))
        .stdout(predicate::str::contains("ndcg=").not());

    let tsvs = result_files(dir.path(), "tsv");
    assert_eq!(tsvs.len(), 1);
    assert_eq!(fs::read_to_string(&tsvs[0]).unwrap(), first);
}

#[test]
fn unknown_method_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let mut args = evaluate_args(dir.path());
    args[2] = "nearest_neighbour_magic".into();
    bin()
        .args(args)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown ranking method name"));
}

#[test]
fn unused_argument_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let mut args = evaluate_args(dir.path());
    args.extend(["--cluster-ratio".to_string(), "0.5".to_string()]);
    bin()
        .args(args)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unused argument(s) for zero_shot_knn: cluster_ratio"));
    assert!(result_files(dir.path(), "tsv").is_empty());
}

#[test]
fn rank_prints_json_ranking() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());

    let assert = bin()
        .args([
            "rank",
            "--method",
            "zero-shot-knn",
            "--similarity",
            "cosine",
            "--claims",
            dir.path().join("claims.jsonl").to_str().unwrap(),
            "--premises",
            dir.path().join("premises.jsonl").to_str().unwrap(),
            "--claim-id",
            "1",
            "--premise",
            "c",
            "--premise",
            "b",
            "--premise",
            "a",
            "--k",
            "2",
            "--output",
            "json",
        ])
        .assert()
        .success();

    let output = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(json["method"], "zero_shot_knn");
    assert_eq!(json["premises"], serde_json::json!(["a", "b"]));
}
