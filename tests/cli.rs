use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("covid19-scrapers").unwrap()
}

#[test]
fn test_help_lists_main_options() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--include-beta"))
        .stdout(predicate::str::contains("--validation-dir"))
        .stdout(predicate::str::contains("--refresh"));
}

#[test]
fn test_generate_config_writes_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("scrapers.toml");

    cmd()
        .arg("--generate-config")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated sample configuration file"));

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[fetch]"));
    assert!(content.contains("use_cache = true"));
}

#[test]
fn test_list_shows_registered_scrapers() {
    cmd()
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Florida"))
        .stdout(predicate::str::contains("Georgia"))
        .stdout(predicate::str::contains("New Jersey (beta)"));
}

#[test]
fn test_dry_run_skips_beta_by_default() {
    let temp_dir = TempDir::new().unwrap();

    cmd()
        .current_dir(temp_dir.path())
        .args(["--dry-run", "--output-format", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Florida"))
        .stdout(predicate::str::contains("Georgia"))
        .stdout(predicate::str::contains("New Jersey").not());
}

#[test]
fn test_dry_run_with_named_beta_scraper() {
    let temp_dir = TempDir::new().unwrap();

    cmd()
        .current_dir(temp_dir.path())
        .args(["new_jersey", "--dry-run", "--output-format", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("New Jersey"));
}

#[test]
fn test_unknown_state_exit_code() {
    let temp_dir = TempDir::new().unwrap();

    cmd()
        .current_dir(temp_dir.path())
        .args(["Atlantis", "--output-format", "plain"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Atlantis"));
}

#[test]
fn test_missing_config_file_exit_code() {
    let temp_dir = TempDir::new().unwrap();

    cmd()
        .current_dir(temp_dir.path())
        .args(["--config", "missing.toml", "--dry-run"])
        .assert()
        .code(3);
}
