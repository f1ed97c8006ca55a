//! End-to-end tests of the `heapsift` binary

use assert_cmd::Command;
use predicates::prelude::*;

use super::common::dump_fixtures::{TestDump, A, C, D, DATA, ORPHAN};

/// The binary, pointed at a config file that does not exist.
fn heapsift(dump: &TestDump) -> Command {
    let mut cmd = Command::cargo_bin("heapsift").expect("binary is built");
    cmd.arg(dump.path_str())
        .arg("--config")
        .arg(dump.sibling("none.toml"));
    cmd
}

#[test]
fn test_anchors_explains_chain() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["anchors", &format!("{C:#x}")])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "0xc000030000 (main.node, 8 bytes) is kept alive by 1 root:",
        ))
        .stdout(predicate::str::contains("  [global] data\n"))
        .stdout(predicate::str::contains("-> 0xc000030000"));
}

#[test]
fn test_anchors_of_interior_address_names_object() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["anchors", &format!("{:#x}", C + 4)])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "0xc000030000 (main.node, 8 bytes) is kept alive by 1 root:",
        ));
}

#[test]
fn test_anchors_accepts_decimal_addresses() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["anchors", &D.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("[stack] goroutine 1 main.main"));
}

#[test]
fn test_oid_file_names_globals() {
    let dump = TestDump::chain();
    let oids = dump.sibling("names.oid");
    std::fs::write(&oids, format!("# globals\n{DATA:#x} main.cache\n")).unwrap();

    heapsift(&dump)
        .args(["anchors", &format!("{A:#x}"), "--oid"])
        .arg(&oids)
        .assert()
        .success()
        .stdout(predicate::str::contains("[global] main.cache"));
}

#[test]
fn test_unreachable_object() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["anchors", &format!("{ORPHAN:#x}")])
        .assert()
        .success()
        .stdout(predicate::str::contains("is not reachable from any root"));
}

#[test]
fn test_unknown_address_fails() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["hexdump", "0x10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No object at address 0x10"));
}

#[test]
fn test_bad_address_is_rejected() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["anchors", "0xnothex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_missing_dump_fails() {
    let dump = TestDump::chain();
    Command::cargo_bin("heapsift")
        .unwrap()
        .arg(dump.sibling("absent.dump"))
        .args(["anchors", "0x1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open heap dump"));
}

#[test]
fn test_hexdump_prints_contents() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["hexdump", &format!("{C:#x}")])
        .assert()
        .success()
        .stdout(predicate::str::contains("|leaf-obj|"));
}

#[test]
fn test_print_filters_records() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["print", "--find", "main.node"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name=\"main.node\""))
        .stdout(predicate::str::contains("leaf-obj").not());
}

#[test]
fn test_owners_json() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["owners", &format!("{C:#x}"), "--depth", "1", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"levels\""))
        .stdout(predicate::str::contains(&format!("\"from\": {A}")));
}

#[test]
fn test_anchors_json() {
    let dump = TestDump::chain();
    heapsift(&dump)
        .args(["--format", "json", "anchors", &format!("{C:#x}")])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kind\": \"global\""));
}

#[test]
fn test_svg_writes_file() {
    let dump = TestDump::chain();
    let out = dump.sibling("graph.svg");
    heapsift(&dump)
        .args(["svg", &format!("{A:#x}"), "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 3 objects to"));

    let svg = std::fs::read_to_string(&out).unwrap();
    assert!(svg.contains("main.node"));
    assert!(svg.trim_end().ends_with("</svg>"));
}

#[test]
fn test_svg_limit_is_reported() {
    let dump = TestDump::chain();
    let out = dump.sibling("small.svg");
    heapsift(&dump)
        .args(["svg", &format!("{A:#x}"), "--max-nodes", "1", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 objects to"))
        .stderr(predicate::str::contains("SVG truncated"));
}

#[test]
fn test_intersect_relocated_dump() {
    let ours = TestDump::chain();
    let theirs = TestDump::relocated(0x100000);
    heapsift(&ours)
        .arg("intersect")
        .arg(&theirs.path)
        .assert()
        .success()
        .stdout(predicate::str::contains("# 5 objects in common"))
        .stdout(predicate::str::contains("address=0xc000010000"));
}
