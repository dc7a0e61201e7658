use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn calla_run_quickstart() {
    let mut cmd = Command::cargo_bin("calla").expect("binary exists");
    cmd.arg("run").arg("demos/quickstart.ca");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("add(2, 3) = 5"))
        .stdout(predicate::str::contains("apply_twice(add, 5) = 15"))
        .stdout(predicate::str::contains("doubled(21) = 42"));
}

#[test]
fn calla_run_captures_demo() {
    let mut cmd = Command::cargo_bin("calla").expect("binary exists");
    cmd.arg("run").arg("demos/captures.ca");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("hits = 2"))
        .stdout(predicate::str::contains("offset(5) = 15"))
        .stdout(predicate::str::contains("counter() = 13"))
        .stdout(predicate::str::contains("seed is still 10"))
        .stdout(predicate::str::contains("base is still 99"));
}

#[test]
fn calla_run_boxes_demo() {
    let mut cmd = Command::cargo_bin("calla").expect("binary exists");
    cmd.arg("run").arg("demos/boxes.ca");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("triple via box: 21"))
        .stdout(predicate::str::contains("scaler via box: 70"))
        .stdout(predicate::str::contains("lambda via box: 107"));
}

#[test]
fn calla_eval_prints_result() {
    let mut cmd = Command::cargo_bin("calla").expect("binary exists");
    cmd.arg("eval").arg("1 + 2 + 3");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("6"));
}

#[test]
fn calla_run_script_from_file() {
    let dir = tempdir().expect("create temp dir");
    let script = dir.path().join("main.ca");
    fs::write(
        &script,
        r#"
        var mut count = 0;
        var bump = [&count]() { count = count + 1; };
        bump();
        bump();
        bump();
        println("count:", count);
        "#,
    )
    .expect("write script");

    let mut cmd = Command::cargo_bin("calla").expect("binary exists");
    cmd.arg("run").arg(&script);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("count: 3"));
}

#[test]
fn calla_eval_reports_check_errors() {
    let mut cmd = Command::cargo_bin("calla").expect("binary exists");
    cmd.arg("eval").arg("var x = 1; x = 2;");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("cannot assign to immutable binding"));
}

#[test]
fn calla_run_missing_file_fails() {
    let mut cmd = Command::cargo_bin("calla").expect("binary exists");
    cmd.arg("run").arg("demos/no-such-script.ca");
    cmd.assert().failure();
}
