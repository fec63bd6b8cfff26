mod common;

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;

use common::TestWorkspace;

const COLLIDING_CANONICAL: &str = "period,entity,metric_name,metric_value\n\
    2024-01,Overall,revenue,100\n\
    2024-01,Overall,revenue,999\n\
    2024-02,Overall,revenue,150\n";

#[test]
fn pivot_rebuilds_wide_rows_from_canonical_data() {
    let workspace = TestWorkspace::new();
    let input = common::write_sales_csv(&workspace);
    let canonical = workspace.path().join("canonical.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            canonical.to_str().unwrap(),
        ])
        .assert()
        .success();

    let wide = workspace.path().join("wide.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "pivot",
            "-i",
            canonical.to_str().unwrap(),
            "-o",
            wide.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&wide).expect("read wide output");
    let mut lines = contents.lines();
    assert_eq!(
        lines.next().expect("header"),
        "\"period\",\"category\",\"revenue\",\"units\""
    );
    assert_eq!(lines.next().expect("first row"), "\"2024-01\",\"A\",\"100\",\"10\"");
    assert_eq!(contents.lines().count(), 5);
}

#[test]
fn pivot_keeps_first_value_by_default() {
    let workspace = TestWorkspace::new();
    let canonical = workspace.write("canonical.csv", COLLIDING_CANONICAL);
    let wide = workspace.path().join("wide.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "pivot",
            "-i",
            canonical.to_str().unwrap(),
            "-o",
            wide.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&wide).expect("read wide output");
    assert!(contents.contains("\"2024-01\",\"100\""));
    assert!(!contents.contains("999"));
}

#[test]
fn pivot_collision_policy_last_takes_the_newest_value() {
    let workspace = TestWorkspace::new();
    let canonical = workspace.write("canonical.csv", COLLIDING_CANONICAL);
    let wide = workspace.path().join("wide.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "pivot",
            "-i",
            canonical.to_str().unwrap(),
            "-o",
            wide.to_str().unwrap(),
            "--collisions",
            "last",
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&wide).expect("read wide output");
    assert!(contents.contains("\"2024-01\",\"999\""));
}

#[test]
fn pivot_collision_policy_error_rejects_duplicates() {
    let workspace = TestWorkspace::new();
    let canonical = workspace.write("canonical.csv", COLLIDING_CANONICAL);
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "pivot",
            "-i",
            canonical.to_str().unwrap(),
            "--collisions",
            "error",
        ])
        .assert()
        .failure()
        .stderr(contains("Duplicate canonical value"));
}
