use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_both_subcommands() {
    let mut cmd = Command::cargo_bin("ragent").unwrap();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("vectorize"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn version_matches_cargo_package_version() {
    let mut cmd = Command::cargo_bin("ragent").unwrap();
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn vectorize_rejects_follow_with_blank_directory() {
    let mut cmd = Command::cargo_bin("ragent").unwrap();
    cmd.args(["vectorize", "--directory", " ", "--follow"]);
    cmd.assert().failure();
}
