mod common;

use std::fs;

use assert_cmd::Command;
use common::{FixtureWorkbook, SheetView, TestWorkspace, sheet_data};
use items_matcher::config::MatchConfig;
use predicates::str::contains;

const LOOKUP_CSV: &str = "Model Number,Items\nABC-100,Widget\nABC-1,Gadget\n";

fn orders_workbook() -> Vec<u8> {
    FixtureWorkbook::new()
        .sheet(
            "Orders",
            sheet_data(&[&["Model Number", "Qty"], &["49 x ABC-100", "1"], &["XYZ", "2"]]),
        )
        .sheet("Notes", sheet_data(&[&["FN SKU"], &["ABC-1"]]))
        .build()
}

fn items_matcher() -> Command {
    Command::cargo_bin("items-matcher").expect("binary exists")
}

#[test]
fn match_writes_update_file_next_to_input() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write_bytes("orders.xlsx", &orders_workbook());
    let lookup = workspace.write("map.csv", LOOKUP_CSV);

    items_matcher()
        .args([
            "match",
            "-w",
            workbook.to_str().unwrap(),
            "-l",
            lookup.to_str().unwrap(),
        ])
        .assert()
        .success();

    let output = workspace.path().join("orders_update.xlsx");
    let bytes = fs::read(&output).expect("output workbook written");
    let view = SheetView::open(&bytes, "Orders");
    assert_eq!(view.text("C1").as_deref(), Some("Items"));
    assert_eq!(view.text("C2").as_deref(), Some("Widget"));
    assert_eq!(view.text("C3").as_deref(), Some("N/A"));
    assert_eq!(fs::read(&workbook).expect("input"), orders_workbook());
}

#[test]
fn report_lists_processed_and_skipped_sheets() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write_bytes("orders.xlsx", &orders_workbook());
    let lookup = workspace.write("map.csv", LOOKUP_CSV);
    let output = workspace.path().join("out.xlsx");

    items_matcher()
        .args([
            "match",
            "-w",
            workbook.to_str().unwrap(),
            "-l",
            lookup.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--placement",
            "insert-adjacent",
            "--report",
        ])
        .assert()
        .success()
        .stdout(contains("processed (insert-adjacent)"))
        .stdout(contains("Model Number (A)"))
        .stdout(contains("skipped: no recognised key header"));

    let view = SheetView::open(&fs::read(&output).expect("output"), "Orders");
    assert_eq!(view.text("B1").as_deref(), Some("Items"));
    assert_eq!(view.text("C1").as_deref(), Some("Qty"));
}

#[test]
fn dry_run_writes_nothing() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write_bytes("orders.xlsx", &orders_workbook());
    let lookup = workspace.write("map.csv", LOOKUP_CSV);

    items_matcher()
        .args([
            "match",
            "-w",
            workbook.to_str().unwrap(),
            "-l",
            lookup.to_str().unwrap(),
            "--dry-run",
            "--report",
        ])
        .assert()
        .success()
        .stdout(contains("Orders"));

    assert!(!workspace.path().join("orders_update.xlsx").exists());
}

#[test]
fn workbook_can_stream_through_stdin_and_stdout() {
    let workspace = TestWorkspace::new();
    let lookup = workspace.write("map.csv", LOOKUP_CSV);

    let assert = items_matcher()
        .args(["match", "-w", "-", "-l", lookup.to_str().unwrap(), "--report"])
        .write_stdin(orders_workbook())
        .assert()
        .success()
        .stderr(contains("processed (append-last)"));

    let bytes = assert.get_output().stdout.clone();
    let view = SheetView::open(&bytes, "Orders");
    assert_eq!(view.text("C2").as_deref(), Some("Widget"));
}

#[test]
fn key_header_flag_replaces_configured_labels() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write_bytes(
        "parts.xlsx",
        &FixtureWorkbook::new()
            .sheet("Parts", sheet_data(&[&["Part No", "SKU"], &["ABC-1", "ABC-100"]]))
            .build(),
    );
    let lookup = workspace.write("map.csv", LOOKUP_CSV);

    items_matcher()
        .args([
            "match",
            "-w",
            workbook.to_str().unwrap(),
            "-l",
            lookup.to_str().unwrap(),
            "--key-header",
            "Part No",
        ])
        .assert()
        .success();

    let bytes = fs::read(workspace.path().join("parts_update.xlsx")).expect("output");
    let view = SheetView::open(&bytes, "Parts");
    assert_eq!(view.text("C2").as_deref(), Some("Gadget"));
}

#[test]
fn config_file_sets_placement_and_suffix() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write_bytes("orders.xlsx", &orders_workbook());
    let lookup = workspace.write("map.csv", LOOKUP_CSV);
    let config = workspace.write(
        "matcher.yaml",
        "placement: insert-adjacent\noutput_suffix: _matched\nderived_header: Resolved\n",
    );

    items_matcher()
        .args([
            "match",
            "-w",
            workbook.to_str().unwrap(),
            "-l",
            lookup.to_str().unwrap(),
            "-c",
            config.to_str().unwrap(),
        ])
        .assert()
        .success();

    let bytes = fs::read(workspace.path().join("orders_matched.xlsx")).expect("output");
    let view = SheetView::open(&bytes, "Orders");
    assert_eq!(view.text("B1").as_deref(), Some("Resolved"));
    assert_eq!(view.text("B2").as_deref(), Some("Widget"));
}

#[test]
fn single_column_lookup_reports_mapping_error() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write_bytes("orders.xlsx", &orders_workbook());
    let lookup = workspace.write("map.csv", "Model Number\nABC-100\n");

    items_matcher()
        .args([
            "match",
            "-w",
            workbook.to_str().unwrap(),
            "-l",
            lookup.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("error: lookup table needs at least two columns, found 1"));

    assert!(!workspace.path().join("orders_update.xlsx").exists());
}

#[test]
fn invalid_workbook_reports_load_error() {
    let workspace = TestWorkspace::new();
    let workbook = workspace.write("orders.xlsx", "plain text, not a package");
    let lookup = workspace.write("map.csv", LOOKUP_CSV);

    items_matcher()
        .args([
            "match",
            "-w",
            workbook.to_str().unwrap(),
            "-l",
            lookup.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("error: could not load workbook"));
}

#[test]
fn resolve_shows_each_token() {
    let workspace = TestWorkspace::new();
    let lookup = workspace.write("map.csv", LOOKUP_CSV);

    items_matcher()
        .args([
            "resolve",
            "-l",
            lookup.to_str().unwrap(),
            "-v",
            "49 x ABC-100, XYZ",
            "-v",
            "  ",
        ])
        .assert()
        .success()
        .stdout(contains("ABC-100"))
        .stdout(contains("Widget"))
        .stdout(contains("N/A"))
        .stdout(contains("(blank, skipped)"));
}

#[test]
fn config_prints_and_writes_defaults() {
    items_matcher()
        .arg("config")
        .assert()
        .success()
        .stdout(contains("placement: append-last"))
        .stdout(contains("highlight_color: FFFF9999"));

    let workspace = TestWorkspace::new();
    let path = workspace.path().join("defaults.yaml");
    items_matcher()
        .args(["config", "-o", path.to_str().unwrap()])
        .assert()
        .success();
    let loaded = MatchConfig::load(&path).expect("load written config");
    assert_eq!(loaded, MatchConfig::default());
}
