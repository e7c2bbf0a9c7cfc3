//! Sandboxed execution of the analysis tool
//!
//! The tool runs with its working directory set to the working copy, no
//! shell, no stdin, a hard timeout, and in its own process group so that a
//! timeout or a dropped request takes its children down with it.

mod command;
mod runner;

pub use command::{sanitize, tokenize, AnalysisOptions, CommandSpec, SHELL_METACHARACTERS};
pub use runner::{CommandRunner, RunEvent, RunOutput, RunStatus};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Kills the child's whole process group unless disarmed.
///
/// Covers both the timeout path and a caller dropping the run future.
pub(crate) struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    pub(crate) fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    pub(crate) fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid.and_then(|p| libc::pid_t::try_from(p).ok()) {
            // SAFETY: killpg has no memory-safety preconditions; the group
            // was created for this child and has not been reaped yet.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Stream stdout+stderr from a child process, calling `on_line` for each
/// line as it arrives. Returns once both pipes are closed.
///
/// Invalid UTF-8 is replaced rather than ending the read, so a chatty child
/// never blocks on a full pipe.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_line: &mut (dyn FnMut(OutputStream, String) + Send),
) {
    let mut stdout = child.stdout.take().map(lines);
    let mut stderr = child.stderr.take().map(lines);

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => match line {
                Some(line) => on_line(OutputStream::Stdout, line),
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line {
                Some(line) => on_line(OutputStream::Stderr, line),
                None => stderr = None,
            },
        }
    }
}

type Lines<R> = tokio::io::Split<BufReader<R>>;

fn lines<R: AsyncRead + Unpin>(pipe: R) -> Lines<R> {
    BufReader::new(pipe).split(b'\n')
}

async fn next_line<R: AsyncRead + Unpin>(reader: &mut Option<Lines<R>>) -> Option<String> {
    let segment = reader.as_mut()?.next_segment().await.ok()??;
    let mut line = String::from_utf8_lossy(&segment).into_owned();
    if line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}
