//! Integration tests for repocache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const SLUG: &str = "acme-widgets-9f1c2e3d4b5a69788796a5b4c3d2e1f0a9b8c7d6";

    /// Isolated config, state and working-copy directories
    struct Sandbox {
        temp: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
            }
        }

        fn config_path(&self) -> PathBuf {
            self.temp.path().join("config.toml")
        }

        fn base_dir(&self) -> PathBuf {
            self.temp.path().join("envs")
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("repocache");
            cmd.arg("--config")
                .arg(self.config_path())
                .env("REPOCACHE_BASE_DIR", self.base_dir())
                .env("REPOCACHE_STATE_DIR", self.temp.path().join("state"))
                .env_remove("REPOCACHE_CALLER")
                .env_remove("REPOCACHE_CONFIG")
                .env_remove("REPOCACHE_TTL_SECS")
                .env_remove("GITHUB_TOKEN");
            cmd
        }

        /// Point the analysis tool at a shell script
        fn use_tool(&self, body: &str) {
            let tool = self.temp.path().join("ccontext");
            std::fs::write(&tool, body).unwrap();
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
            }
            let config = format!(
                "[analysis]\ntool = {:?}\ntimeout_secs = 10\n",
                tool.display().to_string()
            );
            std::fs::write(self.config_path(), config).unwrap();
        }

        fn working_copy(&self, namespace: &str) -> PathBuf {
            let dir = self.base_dir().join(namespace).join(SLUG);
            std::fs::create_dir_all(&dir).unwrap();
            dir
        }
    }

    fn exists(path: &Path) -> bool {
        path.exists()
    }

    #[test]
    fn help_displays() {
        Sandbox::new()
            .cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("per-caller repository working copies"));
    }

    #[test]
    fn version_displays() {
        Sandbox::new()
            .cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("repocache"));
    }

    #[test]
    fn config_path() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        Sandbox::new()
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("ttl_secs = 43200"));
    }

    #[test]
    fn config_set_persists() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "set", "cache.ttl_secs", "60"])
            .assert()
            .success();

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ttl_secs = 60"));

        sandbox
            .cmd()
            .args(["config", "set", "cache.nope", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown key"));
    }

    #[test]
    fn invalid_url_rejected() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["prepare", "https://example.com/acme/widgets"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid repository URL"));

        assert!(!exists(&sandbox.base_dir().join("anonymous")));
    }

    #[test]
    fn result_missing_slug() {
        Sandbox::new()
            .cmd()
            .args(["--caller", "user_42", "result", SLUG])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No working copy"));
    }

    #[test]
    fn list_empty() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("No working copies"));

        sandbox
            .cmd()
            .args(["list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::diff("[]\n"));
    }

    #[test]
    fn sweep_empty() {
        Sandbox::new()
            .cmd()
            .arg("sweep")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to evict"));
    }

    #[test]
    fn sweep_removes_stale_orphan() {
        let sandbox = Sandbox::new();
        let orphan = sandbox.working_copy("anonymous");
        std::thread::sleep(std::time::Duration::from_millis(20));

        sandbox
            .cmd()
            .env("REPOCACHE_TTL_SECS", "0")
            .args(["sweep", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"orphansRemoved\": 1"));

        assert!(!exists(&orphan));
    }

    #[cfg(unix)]
    #[test]
    fn run_by_slug_uses_existing_copy() {
        let sandbox = Sandbox::new();
        sandbox.use_tool(
            "#!/bin/sh\n\
             echo '## FILE TREE ##'\n\
             echo '📁 src'\n\
             echo '## END FILE TREE ##'\n\
             echo \"Total context size: 4821 args: $*\"\n\
             echo '# Report' > ccontext-output.md\n",
        );
        let copy = sandbox.working_copy("user_42");

        sandbox
            .cmd()
            .args(["--caller", "user_42", "run", "--slug", SLUG, "-x", "ccontext -m 10", "-f", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"fileTree\": \"📁 src\""))
            .stdout(predicate::str::contains("\"tokenCount\": 4821"))
            .stdout(predicate::str::contains("args: -m 10 -gm -g"));

        assert!(copy.join("ccontext-output.md").is_file());

        sandbox
            .cmd()
            .args(["--caller", "user_42", "result", SLUG])
            .assert()
            .success()
            .stdout(predicate::str::contains("# Report"));

        sandbox
            .cmd()
            .args(["--caller", "user_42", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains(SLUG));
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_reports_exit_code() {
        let sandbox = Sandbox::new();
        sandbox.use_tool("#!/bin/sh\necho partial\necho boom >&2\nexit 3\n");
        sandbox.working_copy("user_42");

        sandbox
            .cmd()
            .args(["--caller", "user_42", "run", "--slug", SLUG])
            .assert()
            .failure()
            .stdout(predicate::str::contains("partial"))
            .stderr(predicate::str::contains("boom"))
            .stderr(predicate::str::contains("exited with code 3"));
    }

    #[test]
    fn unsafe_caller_rejected() {
        Sandbox::new()
            .cmd()
            .args(["--caller", "../etc", "result", SLUG])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid caller identity"));
    }
}
