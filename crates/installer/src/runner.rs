//! External process execution with wall-clock timeouts and spinner
//! decoration.
//!
//! A timed-out command is a distinct outcome, never conflated with the
//! command's own exit codes; the child is killed and reaped so neither a
//! timer nor a zombie survives the call.

use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::ui::{self, RenderConfig};

/// How many lines of captured output are surfaced when a decorated command
/// fails.
const FAILURE_EXCERPT_LINES: usize = 5;

/// Captured result of a completed command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout and stderr concatenated, for diagnostics.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Outcome of a timeout-bounded command.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The command finished on its own; its real exit status is inside.
    Completed(CommandOutput),
    /// The wall-clock limit expired and the command was killed.
    TimedOut,
}

/// Run a command to completion, capturing output.
///
/// `stdin_data`, when given, is written to the child's stdin and the pipe
/// closed; otherwise stdin is null.
///
/// # Errors
///
/// Returns an error if the command cannot be spawned or its output
/// collected. A non-zero exit is not an error; callers inspect the output.
pub async fn run(
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
    stdin_data: Option<&str>,
) -> Result<CommandOutput> {
    match run_bounded(program, args, dir, stdin_data, None).await? {
        CommandOutcome::Completed(out) => Ok(out),
        // Unreachable without a limit, but keep the type honest.
        CommandOutcome::TimedOut => bail!("{program} timed out"),
    }
}

/// Run a command with an enforced wall-clock timeout.
///
/// # Errors
///
/// Returns an error only for spawn/plumbing failures; both normal exits
/// (any code) and timeouts are values of [`CommandOutcome`].
pub async fn run_with_timeout(
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
    stdin_data: Option<&str>,
    limit: Duration,
) -> Result<CommandOutcome> {
    run_bounded(program, args, dir, stdin_data, Some(limit)).await
}

async fn run_bounded(
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
    stdin_data: Option<&str>,
    limit: Option<Duration>,
) -> Result<CommandOutcome> {
    debug!(program, ?args, ?limit, "running external command");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to run '{program}'. Is it installed and on PATH?"))?;

    if let Some(data) = stdin_data {
        let mut stdin = child
            .stdin
            .take()
            .context("Failed to open child stdin")?;
        stdin
            .write_all(data.as_bytes())
            .await
            .context("Failed to write to child stdin")?;
        // Drop closes the pipe so the child sees EOF.
        drop(stdin);
    }

    let mut stdout = child.stdout.take().context("Failed to capture stdout")?;
    let mut stderr = child.stderr.take().context("Failed to capture stderr")?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        String::from_utf8_lossy(&buf).into_owned()
    });

    let status = if let Some(limit) = limit {
        match timeout(limit, child.wait()).await {
            Ok(status) => status.context("Failed waiting for command")?,
            Err(_) => {
                warn!(program, timeout_secs = limit.as_secs(), "command timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(program, error = %e, "failed to kill timed-out command");
                }
                // Reap so no zombie outlives the call; the readers finish
                // once the pipes close.
                let _ = timeout(Duration::from_secs(5), child.wait()).await;
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return Ok(CommandOutcome::TimedOut);
            }
        }
    } else {
        child.wait().await.context("Failed waiting for command")?
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandOutcome::Completed(CommandOutput {
        exit_code: status.code(),
        stdout,
        stderr,
    }))
}

/// The spinner currently animating, if any, so the interrupt path can
/// clear it before printing diagnostics.
static ACTIVE_SPINNER: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Stop and erase the active spinner, if one is running.
///
/// Called on every abnormal exit path; a no-op when nothing is animating.
pub fn abandon_active_spinner() {
    if let Ok(mut slot) = ACTIVE_SPINNER.lock() {
        if let Some(pb) = slot.take() {
            pb.finish_and_clear();
        }
    }
}

fn start_spinner(rc: &RenderConfig, label: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().tick_chars(rc.spinner_ticks()));
    pb.set_message(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    if let Ok(mut slot) = ACTIVE_SPINNER.lock() {
        *slot = Some(pb.clone());
    }
    pb
}

fn stop_spinner(pb: &ProgressBar) {
    if let Ok(mut slot) = ACTIVE_SPINNER.lock() {
        slot.take();
    }
    pb.finish_and_clear();
}

/// Run a command behind an animated spinner.
///
/// On success the spinner is replaced by a success mark and the label; on
/// failure by a failure mark, the label, and the first few lines of the
/// command's combined output.
///
/// # Errors
///
/// Returns an error if the command cannot be run or exits non-zero.
pub async fn run_with_spinner(
    rc: &RenderConfig,
    label: &str,
    program: &str,
    args: &[&str],
    dir: Option<&Path>,
) -> Result<()> {
    let pb = start_spinner(rc, label);
    let result = run(program, args, dir, None).await;
    stop_spinner(&pb);

    match result {
        Ok(out) if out.success() => {
            ui::print_success(rc, label);
            Ok(())
        }
        Ok(out) => {
            ui::print_error(rc, label);
            for line in out.combined().lines().take(FAILURE_EXCERPT_LINES) {
                println!("    {line}");
            }
            bail!(
                "'{program} {}' exited with code {}",
                args.join(" "),
                out.exit_code
                    .map_or_else(|| "unknown".to_string(), |c| c.to_string())
            )
        }
        Err(e) => {
            ui::print_error(rc, label);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_returns_distinguished_outcome() {
        let outcome = run_with_timeout(
            "sh",
            &["-c", "sleep 5"],
            None,
            None,
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, CommandOutcome::TimedOut));
    }

    #[tokio::test]
    async fn test_fast_nonzero_exit_is_not_a_timeout() {
        let outcome = run_with_timeout(
            "sh",
            &["-c", "exit 3"],
            None,
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        match outcome {
            CommandOutcome::Completed(out) => assert_eq!(out.exit_code, Some(3)),
            CommandOutcome::TimedOut => panic!("fast exit reported as timeout"),
        }
    }

    #[tokio::test]
    async fn test_captures_output() {
        let out = run("sh", &["-c", "echo hello; echo oops >&2"], None, None)
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
        assert!(out.combined().contains("hello"));
        assert!(out.combined().contains("oops"));
    }

    #[tokio::test]
    async fn test_stdin_data_is_delivered() {
        let out = run("cat", &[], None, Some("credential\n")).await.unwrap();
        assert_eq!(out.stdout, "credential\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let result = run("definitely-not-a-real-binary-xyz", &[], None, None).await;
        assert!(result.is_err());
    }
}
