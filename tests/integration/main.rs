//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn kiln() -> Command {
        cargo_bin_cmd!("kiln")
    }

    /// Write a config file pointing the cache into `dir`
    fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
        let config_path = dir.join("config.toml");
        let content = format!(
            "[cache]\nroot = \"{}\"\n{}",
            dir.join("cache").display(),
            extra
        );
        std::fs::write(&config_path, content).unwrap();
        config_path
    }

    /// Config with a stub builder that records every invocation
    fn builder_config(dir: &Path) -> std::path::PathBuf {
        let marker = dir.join("builds.log");
        write_config(
            dir,
            &format!(
                concat!(
                    "[build]\n",
                    "command = \"sh\"\n",
                    "args = [\"-c\", \"echo run >> {}; printf bytes > \\\"$KILN_OUTPUT\\\"\"]\n",
                ),
                marker.display()
            ),
        )
    }

    #[test]
    fn help_displays() {
        kiln()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("disk-image cache"));
    }

    #[test]
    fn version_displays() {
        kiln()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");
        kiln()
            .args(["--config", config.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");
        kiln()
            .args(["--config", config.to_str().unwrap(), "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn list_empty_cache() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");
        kiln()
            .args(["--config", config.to_str().unwrap(), "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No images found"));
    }

    #[test]
    fn invalid_config_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "not = [valid").unwrap();

        kiln()
            .args(["--config", config_path.to_str().unwrap(), "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn unknown_config_section_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "[mystery]\nkey = 1\n");

        kiln()
            .args(["--config", config.to_str().unwrap(), "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("mystery"));
    }

    #[test]
    fn build_produces_cached_image() {
        let temp = TempDir::new().unwrap();
        let config = builder_config(temp.path());

        kiln()
            .args(["--config", config.to_str().unwrap(), "build", "demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains("demo"));

        kiln()
            .args([
                "--config",
                config.to_str().unwrap(),
                "list",
                "demo",
                "--format",
                "plain",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("demo_"));
    }

    #[test]
    fn second_run_reuses_cached_image() {
        let temp = TempDir::new().unwrap();
        let config = builder_config(temp.path());

        for _ in 0..2 {
            kiln()
                .args(["--config", config.to_str().unwrap(), "build", "demo"])
                .assert()
                .success();
        }

        // The stub builder appends one line per invocation
        let log = std::fs::read_to_string(temp.path().join("builds.log")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn failed_build_leaves_cache_empty() {
        let temp = TempDir::new().unwrap();
        let config = write_config(
            temp.path(),
            "[build]\ncommand = \"sh\"\nargs = [\"-c\", \"echo kaput >&2; exit 1\"]\n",
        );

        kiln()
            .args(["--config", config.to_str().unwrap(), "build", "newimg"])
            .assert()
            .failure()
            .stderr(
                predicate::str::contains("Build failed")
                    .and(predicate::str::contains("newimg")),
            );

        kiln()
            .args([
                "--config",
                config.to_str().unwrap(),
                "list",
                "--format",
                "plain",
            ])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn build_without_builder_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        kiln()
            .args(["--config", config.to_str().unwrap(), "build", "demo"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No build command configured"));
    }

    #[test]
    fn build_export_writes_file() {
        let temp = TempDir::new().unwrap();
        let config = builder_config(temp.path());
        let export = temp.path().join("exported.qcow2");

        kiln()
            .args([
                "--config",
                config.to_str().unwrap(),
                "build",
                "demo",
                "--export",
                export.to_str().unwrap(),
            ])
            .assert()
            .success();

        assert_eq!(std::fs::read(&export).unwrap(), b"bytes");
    }

    #[test]
    fn push_missing_image_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        kiln()
            .args(["--config", config.to_str().unwrap(), "push", "ghost"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Image not found"));
    }

    #[test]
    fn pull_without_remotes_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        kiln()
            .args(["--config", config.to_str().unwrap(), "pull", "base"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no remote repositories"));
    }

    #[test]
    fn prune_requires_retention() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "");

        kiln()
            .args(["--config", config.to_str().unwrap(), "prune", "base"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("keep"));
    }

    #[test]
    fn prune_keeps_most_recent() {
        let temp = TempDir::new().unwrap();
        let config = builder_config(temp.path());

        // A freshness bound the first version cannot meet forces a second
        // build, leaving two versions of the same name in the cache
        kiln()
            .args(["--config", config.to_str().unwrap(), "build", "demo"])
            .assert()
            .success();
        kiln()
            .args([
                "--config",
                config.to_str().unwrap(),
                "build",
                "demo",
                "--not-older-than",
                "2099-01-01T00:00:00Z",
            ])
            .assert()
            .success();

        let log = std::fs::read_to_string(temp.path().join("builds.log")).unwrap();
        assert_eq!(log.lines().count(), 2);

        kiln()
            .args([
                "--config",
                config.to_str().unwrap(),
                "prune",
                "demo",
                "--keep",
                "1",
            ])
            .assert()
            .success();

        let list = kiln()
            .args([
                "--config",
                config.to_str().unwrap(),
                "list",
                "demo",
                "--format",
                "plain",
            ])
            .assert()
            .success();
        let stdout = String::from_utf8_lossy(&list.get_output().stdout).to_string();
        assert_eq!(stdout.lines().count(), 1);
    }
}
