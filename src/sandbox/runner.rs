//! Analysis tool subprocess execution

use super::{stream_child_output, CommandSpec, GroupKill, OutputStream};
use crate::config::schema::AnalysisConfig;
use crate::error::{RepoCacheError, RepoCacheResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

/// Exit code reported in the final event when the run was killed
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Captured result of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// One line-delimited event of a streaming run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunEvent {
    /// A line of output; stderr lines carry an `Error: ` prefix
    Output { output: String },
    /// Terminal event, always last
    Status(RunStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error { code: i32 },
}

impl RunEvent {
    pub fn output(line: impl Into<String>) -> Self {
        Self::Output {
            output: line.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Status(_))
    }

    /// Serialize as a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> RepoCacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Default)]
struct Captured {
    stdout: String,
    stderr: String,
}

impl Captured {
    fn push(&mut self, stream: OutputStream, line: &str) {
        let buf = match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        buf.push_str(line);
        buf.push('\n');
    }
}

/// Runs the configured analysis tool inside working copies
#[derive(Debug, Clone)]
pub struct CommandRunner {
    tool: String,
    fixed_args: Vec<String>,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(tool: impl Into<String>, fixed_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            fixed_args,
            timeout,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.tool.clone(),
            config.fixed_args.clone(),
            config.timeout(),
        )
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn fixed_args(&self) -> &[String] {
        &self.fixed_args
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Parse a free-text command against this runner's tool
    pub fn spec_from_raw(&self, raw: &str) -> RepoCacheResult<CommandSpec> {
        CommandSpec::from_raw(raw, &self.tool)
    }

    /// Printable command line for `spec`
    pub fn display(&self, spec: &CommandSpec) -> String {
        spec.display(&self.tool, &self.fixed_args)
    }

    /// Run to completion, capturing stdout and stderr in full.
    ///
    /// A non-zero exit is `CommandFailed` and a kill on timeout is
    /// `TimedOut`; both carry whatever output was captured.
    pub async fn run(&self, dir: &Path, spec: &CommandSpec) -> RepoCacheResult<RunOutput> {
        self.execute(dir, spec, &mut |_, _| {}).await
    }

    /// Like [`run`](Self::run), emitting each line as a [`RunEvent`] as it
    /// is produced, then one terminal status event.
    pub async fn run_streaming(
        &self,
        dir: &Path,
        spec: &CommandSpec,
        on_event: &mut (dyn FnMut(RunEvent) + Send),
    ) -> RepoCacheResult<RunOutput> {
        let result = self
            .execute(dir, spec, &mut |stream, line| match stream {
                OutputStream::Stdout => on_event(RunEvent::output(line)),
                OutputStream::Stderr => on_event(RunEvent::output(format!("Error: {}", line))),
            })
            .await;

        let status = match &result {
            Ok(_) => Some(RunStatus::Success),
            Err(RepoCacheError::CommandFailed { code, .. }) => Some(RunStatus::Error { code: *code }),
            Err(RepoCacheError::TimedOut { .. }) => Some(RunStatus::Error {
                code: TIMEOUT_EXIT_CODE,
            }),
            // Never started: nothing was streamed
            Err(_) => None,
        };
        if let Some(status) = status {
            on_event(RunEvent::Status(status));
        }

        result
    }

    #[instrument(skip(self, spec, on_line), fields(tool = %self.tool))]
    async fn execute(
        &self,
        dir: &Path,
        spec: &CommandSpec,
        on_line: &mut (dyn FnMut(OutputStream, &str) + Send),
    ) -> RepoCacheResult<RunOutput> {
        let argv = spec.argv(&self.fixed_args);
        debug!("Executing: {} {:?} in {}", self.tool, argv, dir.display());

        let mut cmd = Command::new(&self.tool);
        cmd.args(&argv)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| RepoCacheError::spawn(self.tool.clone(), e))?;
        let mut group = GroupKill::new(child.id());

        let started = Instant::now();
        let mut captured = Captured::default();
        let waited = tokio::time::timeout(
            self.timeout,
            collect(&mut child, &mut |stream, line| {
                on_line(stream, &line);
                captured.push(stream, &line);
            }),
        )
        .await;

        let status = match waited {
            Ok(Ok(status)) => {
                group.disarm();
                status
            }
            Ok(Err(e)) => {
                return Err(RepoCacheError::io(
                    format!("waiting for {}", self.tool),
                    e,
                ))
            }
            Err(_) => {
                warn!(
                    "{} exceeded {}s, killing process group",
                    self.tool,
                    self.timeout.as_secs()
                );
                drop(group);
                let _ = child.kill().await;
                return Err(RepoCacheError::TimedOut {
                    timeout: self.timeout,
                    stdout: captured.stdout,
                    stderr: captured.stderr,
                });
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        info!(
            "{} exited with {} after {}ms",
            self.tool,
            exit_code,
            started.elapsed().as_millis()
        );

        if !status.success() {
            return Err(RepoCacheError::CommandFailed {
                code: exit_code,
                stdout: captured.stdout,
                stderr: captured.stderr,
            });
        }

        Ok(RunOutput {
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit_code,
        })
    }
}

async fn collect(
    child: &mut Child,
    on_line: &mut (dyn FnMut(OutputStream, String) + Send),
) -> std::io::Result<ExitStatus> {
    stream_child_output(child, on_line).await;
    child.wait().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    #[cfg(target_os = "linux")]
    use crate::test_support::{is_running, wait_until_gone};
    use crate::test_support::{recorded_pid, write_script};
    use tempfile::TempDir;

    /// Backgrounds a long sleep, records its pid, then waits on it
    const SPAWNS_GRANDCHILD: &str = "#!/bin/sh\nsleep 30 &\necho $! > sleeper.pid\nwait\n";

    fn runner(tool: &str, timeout: Duration) -> CommandRunner {
        CommandRunner::new(tool, vec![], timeout)
    }

    fn script_runner(dir: &Path, body: &str, timeout: Duration) -> CommandRunner {
        let path = write_script(dir, "tool.sh", body);
        runner(&path.to_string_lossy(), timeout)
    }

    #[tokio::test]
    async fn captures_stdout() {
        let dir = TempDir::new().unwrap();
        let runner = runner("echo", Duration::from_secs(10));
        let spec = runner.spec_from_raw("hello 'big world'").unwrap();

        let out = runner.run(dir.path(), &spec).await.unwrap();

        assert_eq!(out.stdout, "hello big world\n");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn runs_in_working_copy() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let runner = runner("ls", Duration::from_secs(10));

        let out = runner.run(dir.path(), &CommandSpec::default()).await.unwrap();

        assert!(out.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn fixed_args_follow_caller_args() {
        let dir = TempDir::new().unwrap();
        let runner = CommandRunner::new(
            "echo",
            vec!["-gm".to_string(), "-g".to_string()],
            Duration::from_secs(10),
        );
        let spec = runner.spec_from_raw("echo -m 10").unwrap();

        let out = runner.run(dir.path(), &spec).await.unwrap();

        assert_eq!(out.stdout.trim(), "-m 10 -gm -g");
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_output() {
        let dir = TempDir::new().unwrap();
        let runner = runner("ls", Duration::from_secs(10));
        let spec = runner.spec_from_raw("/definitely/not/here").unwrap();

        let err = runner.run(dir.path(), &spec).await.unwrap_err();

        match err {
            RepoCacheError::CommandFailed { code, stderr, .. } => {
                assert_ne!(code, 0);
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_the_command() {
        let dir = TempDir::new().unwrap();
        let runner = runner("sleep", Duration::from_millis(200));
        let spec = runner.spec_from_raw("5").unwrap();

        let started = Instant::now();
        let err = runner.run(dir.path(), &spec).await.unwrap_err();

        assert!(matches!(err, RepoCacheError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_background_children() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(dir.path(), SPAWNS_GRANDCHILD, Duration::from_millis(500));

        let err = runner
            .run(dir.path(), &CommandSpec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoCacheError::TimedOut { .. }));

        let pid = recorded_pid(&dir.path().join("sleeper.pid")).await;
        assert!(wait_until_gone(pid).await, "sleep {pid} outlived the timeout");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_the_run_kills_the_tool() {
        let dir = TempDir::new().unwrap();
        let runner = script_runner(dir.path(), SPAWNS_GRANDCHILD, Duration::from_secs(60));

        let workdir = dir.path().to_path_buf();
        let task = tokio::spawn(async move {
            runner.run(&workdir, &CommandSpec::default()).await
        });

        let pid = recorded_pid(&dir.path().join("sleeper.pid")).await;
        assert!(is_running(pid));

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(wait_until_gone(pid).await, "sleep {pid} outlived the cancelled run");
    }

    #[tokio::test]
    async fn missing_tool_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let runner = runner("repocache-no-such-tool", Duration::from_secs(1));

        let err = runner
            .run(dir.path(), &CommandSpec::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RepoCacheError::Spawn { .. }));
    }

    #[tokio::test]
    async fn streaming_emits_lines_then_status() {
        let dir = TempDir::new().unwrap();
        let runner = runner("printf", Duration::from_secs(10));
        let spec = runner.spec_from_raw(r"'one\ntwo\n'").unwrap();

        let mut events = Vec::new();
        let out = runner
            .run_streaming(dir.path(), &spec, &mut |e| events.push(e))
            .await
            .unwrap();

        assert_eq!(out.stdout, "one\ntwo\n");
        assert_eq!(
            events,
            vec![
                RunEvent::output("one"),
                RunEvent::output("two"),
                RunEvent::Status(RunStatus::Success),
            ]
        );
    }

    #[tokio::test]
    async fn streaming_prefixes_stderr_and_reports_code() {
        let dir = TempDir::new().unwrap();
        let runner = runner("ls", Duration::from_secs(10));
        let spec = runner.spec_from_raw("/definitely/not/here").unwrap();

        let mut events = Vec::new();
        let result = runner
            .run_streaming(dir.path(), &spec, &mut |e| events.push(e))
            .await;

        assert!(result.is_err());
        assert!(matches!(
            events.first(),
            Some(RunEvent::Output { output }) if output.starts_with("Error: ")
        ));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Status(RunStatus::Error { code })) if *code != 0
        ));
    }

    #[test]
    fn event_wire_format() {
        assert_eq!(
            RunEvent::output("x").to_json_line().unwrap(),
            r#"{"output":"x"}"#
        );
        assert_eq!(
            RunEvent::Status(RunStatus::Success).to_json_line().unwrap(),
            r#"{"status":"success"}"#
        );
        assert_eq!(
            RunEvent::Status(RunStatus::Error { code: 2 })
                .to_json_line()
                .unwrap(),
            r#"{"status":"error","code":2}"#
        );
    }
}
