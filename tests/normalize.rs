mod common;

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;

use common::TestWorkspace;

#[test]
fn normalize_emits_one_record_per_measure_cell() {
    let workspace = TestWorkspace::new();
    let input = common::write_sales_csv(&workspace);
    let output = workspace.path().join("canonical.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read canonical output");
    let mut lines = contents.lines();
    assert_eq!(
        lines.next().expect("header"),
        "\"period\",\"entity\",\"metric_name\",\"metric_value\",\"category\""
    );
    assert_eq!(
        lines.next().expect("first record"),
        "\"2024-01\",\"category:A\",\"revenue\",\"100\",\"A\""
    );
    // 4 rows x 2 measures
    assert_eq!(contents.lines().count(), 9);
    assert!(contents.contains("\"2024-02\",\"category:B\",\"units\",\"20\",\"B\""));
}

#[test]
fn normalize_errors_without_time_column() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "no_time.csv",
        "category,revenue\nA,100.0\nB,200.0\n",
    );
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args(["normalize", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("No time column"));
}

#[test]
fn normalize_errors_without_measure_columns() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "no_measures.csv",
        "month,category\n2024-01,A\n2024-02,B\n",
    );
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args(["normalize", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("No measure columns"));
}

#[test]
fn normalize_reuses_saved_schema_map() {
    let workspace = TestWorkspace::new();
    let input = common::write_sales_csv(&workspace);
    let map_path = workspace.path().join("schema_map.json");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "detect",
            "-i",
            input.to_str().unwrap(),
            "-s",
            map_path.to_str().unwrap(),
        ])
        .assert()
        .success();

    let output = workspace.path().join("canonical.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-s",
            map_path.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read canonical output");
    assert_eq!(contents.lines().count(), 9);
}

#[test]
fn normalize_skips_rows_with_missing_periods() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "gappy.csv",
        "month,category,revenue\n2024-01,A,100.0\n,A,120.0\n2024-02,A,150.0\n",
    );
    let output = workspace.path().join("canonical.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read canonical output");
    // header + 2 surviving records
    assert_eq!(contents.lines().count(), 3);
    assert!(!contents.contains("120"));
}

#[test]
fn normalize_decodes_windows_1252_input() {
    let workspace = TestWorkspace::new();
    // 0xFC and 0xF6 are cp1252 for u-umlaut and o-umlaut, invalid as UTF-8.
    let input = workspace.write_bytes(
        "sales_cp1252.csv",
        b"month,region,revenue\n\
          2024-01,Z\xFCrich,100.0\n\
          2024-01,K\xF6ln,200.0\n\
          2024-02,Z\xFCrich,150.0\n\
          2024-02,K\xF6ln,180.0\n",
    );
    let output = workspace.path().join("canonical.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--input-encoding",
            "windows-1252",
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read canonical output");
    assert_eq!(
        contents.lines().nth(1).expect("first record"),
        "\"2024-01\",\"region:Z\u{00FC}rich\",\"revenue\",\"100\",\"Z\u{00FC}rich\""
    );
    assert!(contents.contains("region:K\u{00F6}ln"));
    assert!(!contents.contains('\u{FFFD}'));
}

#[test]
fn normalize_accepts_utf8_bom_input_by_default() {
    let workspace = TestWorkspace::new();
    let input = workspace.write_bytes(
        "sales_bom.csv",
        b"\xEF\xBB\xBFmonth,category,revenue\n\
          2024-01,A,100.0\n\
          2024-02,A,150.0\n",
    );
    let output = workspace.path().join("canonical.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read canonical output");
    assert_eq!(
        contents.lines().next().expect("header"),
        "\"period\",\"entity\",\"metric_name\",\"metric_value\",\"category\""
    );
    assert_eq!(contents.lines().count(), 3);
    assert!(!contents.contains('\u{FEFF}'));
}

#[test]
fn normalize_drops_nan_measure_values() {
    let workspace = TestWorkspace::new();
    // Bare "nan" is a missing token; the signed form parses as f64 NaN.
    let input = workspace.write(
        "nan_cells.csv",
        "month,category,revenue\n\
         2024-01,A,+nan\n\
         2024-01,B,200.0\n\
         2024-02,A,150.0\n\
         2024-02,B,180.0\n",
    );
    let output = workspace.path().join("canonical.csv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read canonical output");
    // header + 3 surviving records
    assert_eq!(contents.lines().count(), 4);
    assert!(!contents.contains("\"2024-01\",\"category:A\""));

    // The emitted canonical file must stay readable by the next stage.
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args(["classify", "-i", output.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("revenue"));
}

#[test]
fn normalize_writes_tab_delimited_output_for_tsv_extension() {
    let workspace = TestWorkspace::new();
    let input = common::write_sales_csv(&workspace);
    let output = workspace.path().join("canonical.tsv");
    Command::cargo_bin("csv-variance")
        .expect("binary exists")
        .args([
            "normalize",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read canonical output");
    assert!(
        contents
            .lines()
            .next()
            .expect("header")
            .contains("\"period\"\t\"entity\"")
    );
}
