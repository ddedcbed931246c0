//! Smoke tests for the thin CLI binary, in the teacher's `assert_cmd` style.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn count_mode_prints_pi_of_1000() {
    let mut cmd = Command::cargo_bin("calcprime").unwrap();
    cmd.args(["--from", "0", "--to", "1000", "--mode", "count"]);
    cmd.assert().success().stdout(predicate::str::contains("168"));
}

#[test]
fn nth_mode_requires_n() {
    let mut cmd = Command::cargo_bin("calcprime").unwrap();
    cmd.args(["--from", "0", "--to", "1000", "--mode", "nth"]);
    cmd.assert().failure();
}

#[test]
fn enumerate_mode_lists_primes_in_order() {
    let mut cmd = Command::cargo_bin("calcprime").unwrap();
    cmd.args(["--from", "10", "--to", "30", "--mode", "enumerate"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("11\n").and(predicate::str::contains("29\n")));
}

#[test]
fn invalid_range_fails_cleanly() {
    let mut cmd = Command::cargo_bin("calcprime").unwrap();
    cmd.args(["--from", "100", "--to", "10", "--mode", "count"]);
    cmd.assert().failure();
}
