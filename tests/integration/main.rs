//! Integration tests for Stemmer

mod pipeline;

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn stemmer() -> Command {
        cargo_bin_cmd!("stemmer")
    }

    /// A config file rooting every path in `dir`
    fn config_in(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        let content = format!("[paths]\nroot = {:?}\n", dir.display().to_string());
        fs::write(&path, content).unwrap();
        path
    }

    fn project(dir: &Path, name: &str, json: &str) {
        let project_dir = dir.join("projects").join(name);
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(project_dir.join("project.json"), json).unwrap();
    }

    #[test]
    fn help_displays() {
        stemmer()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Root filesystem image builder"));
    }

    #[test]
    fn version_displays() {
        stemmer()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stemmer"));
    }

    #[test]
    fn config_path_follows_flag() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[paths]").and(predicate::str::contains("[emulation]")));
    }

    #[test]
    fn config_init_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("nested/config.toml");

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["config", "init"])
            .assert()
            .success();

        let written = fs::read_to_string(&config).unwrap();
        assert!(written.contains("resolv_conf"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        fs::write(&config, "[paths\nroot = 1").unwrap();

        stemmer()
            .arg("--config")
            .arg(&config)
            .arg("list")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn list_empty() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());

        stemmer()
            .arg("--config")
            .arg(&config)
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No projects found"));
    }

    #[test]
    fn list_shows_projects() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        project(temp.path(), "kiosk", r#"{ "platform": "raspbian" }"#);
        project(temp.path(), "gateway", r#"{ "platform": "raspbian" }"#);

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::eq("gateway\nkiosk\n"));
    }

    #[test]
    fn build_missing_project() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["build", "ghost"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Project not found: ghost"));
    }

    #[test]
    fn build_without_platform_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        project(temp.path(), "bare", r#"{ "hostname": "bare" }"#);

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["build", "bare"])
            .assert()
            .failure()
            .stderr(
                predicate::str::contains("requires field 'platform'")
                    .and(predicate::str::contains("Hint:")),
            );

        assert!(!temp.path().join("build/bare").exists());
    }

    #[test]
    fn clean_without_publish() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["clean", "kiosk"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing published for kiosk"));
    }

    #[test]
    fn clean_discards_published_build() {
        let temp = TempDir::new().unwrap();
        let config = config_in(temp.path());
        let published = temp.path().join("build/kiosk/rootfs/etc");
        fs::create_dir_all(&published).unwrap();
        fs::write(published.join("hostname"), "kiosk\n").unwrap();

        stemmer()
            .arg("--config")
            .arg(&config)
            .args(["clean", "kiosk"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Discarded"));

        assert!(!temp.path().join("build/kiosk").exists());
    }
}
