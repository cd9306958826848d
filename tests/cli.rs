use assert_cmd::Command;
use predicates::prelude::*;

fn bin() -> Command {
    Command::cargo_bin("kodegen_bundler_dmg").unwrap()
}

#[test]
fn help_lists_build_options() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--app"))
        .stdout(predicate::str::contains("--compression-level"))
        .stdout(predicate::str::contains("--window-width"));
}

#[test]
fn app_or_config_is_required() {
    bin()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--app"));
}

#[test]
fn compression_level_out_of_range_is_rejected() {
    bin()
        .args(["--app", "MyApp.app", "--cl", "12"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("compression level"));
}

#[test]
fn unknown_format_is_rejected() {
    bin()
        .args(["--app", "MyApp.app", "-f", "ISO9660"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ISO9660"));
}

#[test]
fn non_bundle_app_exits_with_usage_code() {
    let tmp = tempfile::tempdir().unwrap();
    let not_an_app = tmp.path().join("tool");
    std::fs::create_dir_all(&not_an_app).unwrap();

    bin()
        .arg("--app")
        .arg(&not_an_app)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("app bundle"));
}

#[test]
fn missing_config_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    bin()
        .arg("--config")
        .arg(tmp.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}
