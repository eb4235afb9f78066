//! Child processes with a timeout and bounded output capture.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a finished (or killed) child.
#[derive(Debug)]
pub struct ChildOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes discarded beyond the capture limit.
    pub stdout_dropped: usize,
    pub stderr_dropped: usize,
    pub timed_out: bool,
}

impl ChildOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Last few lines of stderr, for error messages.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Spawn `argv`, feed `stdin`, and wait at most `timeout`.
///
/// stdout and stderr are drained on reader threads so a chatty child cannot
/// block on a full pipe; at most `output_limit_bytes` of each is kept.
#[instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or(""), timeout_secs = timeout.as_secs()))]
pub fn run_child(
    argv: &[String],
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ChildOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child");
    let mut child = cmd.spawn().with_context(|| format!("spawn {program}"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    if let Some(input) = stdin {
        let written = match child.stdin.take() {
            Some(mut child_stdin) => write_input(&mut child_stdin, input).context("write stdin"),
            None => Err(anyhow!("stdin was not piped")),
        };
        if let Err(err) = written {
            reap(&mut child);
            let _ = join_reader(stdout_handle);
            let _ = join_reader(stderr_handle);
            return Err(err);
        }
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for child")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "child timed out, killing");
            timed_out = true;
            child.kill().context("kill child")?;
            child.wait().context("wait for child after kill")?
        }
    };

    let (stdout, stdout_dropped) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_dropped) = join_reader(stderr_handle).context("join stderr")?;
    if stdout_dropped > 0 || stderr_dropped > 0 {
        warn!(stdout_dropped, stderr_dropped, "child output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "child finished");
    Ok(ChildOutput {
        status,
        stdout,
        stderr,
        stdout_dropped,
        stderr_dropped,
        timed_out,
    })
}

/// Write all of `input`. A child that exits without reading stdin is judged by
/// its exit status, so a broken pipe is not an error here.
fn write_input<W: Write>(writer: &mut W, input: &[u8]) -> std::io::Result<()> {
    match writer.write_all(input) {
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Kill and wait for a child whose run is being abandoned.
fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(error = %err, "kill abandoned child");
    }
    if let Err(err) = child.wait() {
        warn!(error = %err, "wait for abandoned child");
    }
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read child output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        let keep = n.min(room);
        kept.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }
    Ok((kept, dropped))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn captures_stdout_from_stdin() {
        let out = run_child(&argv(&["cat"]), Some(b"hello"), Duration::from_secs(10), 1024)
            .expect("run");
        assert!(out.status.success());
        assert_eq!(out.stdout_text(), "hello");
        assert!(!out.timed_out);
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_child(&argv(&["cat"]), Some(b"0123456789"), Duration::from_secs(10), 4)
            .expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_dropped, 6);
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_child(&argv(&["sleep", "5"]), None, Duration::from_millis(100), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.status.success());
    }

    struct FailingWriter(ErrorKind);

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(self.0))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn only_broken_pipe_is_tolerated_on_stdin() {
        assert!(write_input(&mut FailingWriter(ErrorKind::BrokenPipe), b"x").is_ok());
        assert!(write_input(&mut FailingWriter(ErrorKind::PermissionDenied), b"x").is_err());
    }

    #[test]
    fn reap_kills_and_waits_for_the_child() {
        let mut child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("spawn sleep");
        reap(&mut child);
        let status = child.try_wait().expect("try_wait").expect("child exited");
        assert!(!status.success());
    }

    #[test]
    fn empty_argv_is_an_error() {
        assert!(run_child(&[], None, Duration::from_secs(1), 16).is_err());
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let out = run_child(
            &argv(&["sh", "-c", "printf 'a\\nb\\nc\\n' >&2; exit 3"]),
            None,
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stderr_tail(2), "b\nc");
    }
}
