//! Adapter over the container engine CLI.
//!
//! Everything the installer knows about `docker` / `docker compose` lives
//! here: version and daemon probes, pull/up/down, status listing, log
//! access, and registry login. The engine's free-text status lines are
//! interpreted in exactly one place, [`parse_service_status`]; the rest of
//! the system only ever sees [`ServiceStatus`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::debug;

use crate::runner::{self, CommandOutcome, CommandOutput};
use crate::ui::RenderConfig;

/// The four services of the stack, in display order.
pub const SERVICES: [&str; 4] = ["postgres", "extractor", "server", "watcher"];

/// The main HTTP server; its exit is fatal during the health wait.
pub const MAIN_SERVICE: &str = "server";

/// Compose project name; containers and the engine's port-proxy helpers
/// carry it, which is how a port conflict is attributed to a prior install.
pub const PROJECT_NAME: &str = "repolens";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Set while the foreground log tail is running; the interrupt handler
/// treats Ctrl-C during the tail as a normal exit.
static LOG_TAIL_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Whether the foreground log tail is currently running.
#[must_use]
pub fn log_tail_active() -> bool {
    LOG_TAIL_ACTIVE.load(Ordering::SeqCst)
}

/// Last-observed state of one service, classified from the engine's
/// free-text status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not yet observed by the engine.
    Waiting,
    /// Created/restarting, or up with its health check still starting.
    Starting,
    /// Up, no health verdict yet.
    Running,
    /// Up and passing its health check.
    Healthy,
    /// Exited zero (one-shot jobs end here).
    Completed,
    /// Exited non-zero, with the exit code.
    Failed(i32),
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Healthy => write!(f, "healthy"),
            Self::Completed => write!(f, "completed"),
            Self::Failed(code) => write!(f, "failed (exit {code})"),
        }
    }
}

/// Classify one raw status line for one service.
///
/// Input is whatever `docker compose ps` printed for the service, e.g.
/// `Up 2 minutes (healthy)` or `Exited (1) 3 seconds ago`. Unrecognized
/// but non-empty text is read as [`ServiceStatus::Starting`]: the engine
/// knows about the container but it is not serving yet.
#[must_use]
pub fn parse_service_status(raw: &str) -> ServiceStatus {
    let line = raw.trim();
    if line.is_empty() {
        return ServiceStatus::Waiting;
    }

    if let Some(code) = parse_exit_code(line) {
        return if code == 0 {
            ServiceStatus::Completed
        } else {
            ServiceStatus::Failed(code)
        };
    }

    if line.starts_with("Up") {
        if line.contains("(healthy)") {
            return ServiceStatus::Healthy;
        }
        if line.contains("health: starting") {
            return ServiceStatus::Starting;
        }
        return ServiceStatus::Running;
    }

    ServiceStatus::Starting
}

/// Pull the `N` out of `Exited (N) ...`.
fn parse_exit_code(line: &str) -> Option<i32> {
    let rest = line.strip_prefix("Exited (")?;
    let end = rest.find(')')?;
    rest[..end].parse().ok()
}

/// A fresh per-poll view of the stack; no identity across polls.
#[derive(Debug, Clone, Default)]
pub struct StackSnapshot {
    entries: Vec<(String, ServiceStatus)>,
}

impl StackSnapshot {
    /// Build a snapshot from `service<TAB>status` lines.
    #[must_use]
    pub fn from_ps_output(output: &str) -> Self {
        let observed: Vec<(String, ServiceStatus)> = output
            .lines()
            .filter_map(|line| {
                let (service, status) = line.split_once('\t')?;
                Some((service.trim().to_string(), parse_service_status(status)))
            })
            .collect();

        // Every named service gets an entry; unobserved ones are Waiting.
        let entries = SERVICES
            .iter()
            .map(|name| {
                let status = observed
                    .iter()
                    .find(|(s, _)| s == name)
                    .map_or(ServiceStatus::Waiting, |(_, st)| *st);
                ((*name).to_string(), status)
            })
            .collect();

        Self { entries }
    }

    /// Status of one named service.
    #[must_use]
    pub fn status_of(&self, service: &str) -> ServiceStatus {
        self.entries
            .iter()
            .find(|(s, _)| s == service)
            .map_or(ServiceStatus::Waiting, |(_, st)| *st)
    }

    /// Exit code of the main service, if it failed.
    #[must_use]
    pub fn main_service_failure(&self) -> Option<i32> {
        match self.status_of(MAIN_SERVICE) {
            ServiceStatus::Failed(code) => Some(code),
            _ => None,
        }
    }

    /// Services in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ServiceStatus)> {
        self.entries.iter().map(|(s, st)| (s.as_str(), *st))
    }
}

/// Handle on the compose project in one install directory.
#[derive(Debug, Clone)]
pub struct ComposeClient {
    project_dir: PathBuf,
}

impl ComposeClient {
    #[must_use]
    pub fn new(project_dir: PathBuf) -> Self {
        Self { project_dir }
    }

    #[must_use]
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    fn dir(&self) -> Option<&Path> {
        Some(&self.project_dir)
    }

    /// Client version of the container engine, e.g. `24.0.7`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine binary is missing or prints nothing
    /// recognizable.
    pub async fn engine_version() -> Result<String> {
        let out = runner::run(
            "docker",
            &["version", "--format", "{{.Client.Version}}"],
            None,
            None,
        )
        .await?;
        if out.success() {
            let version = out.stdout.trim();
            if !version.is_empty() {
                return Ok(version.to_string());
            }
        }
        // The daemon being down fails the formatted query; fall back to the
        // client-only banner.
        let out = runner::run("docker", &["--version"], None, None).await?;
        crate::version::extract_version(&out.stdout)
            .context("Could not determine the Docker client version")
    }

    /// Probe daemon reachability with a bounded `docker info`.
    pub async fn daemon_reachable() -> bool {
        matches!(
            runner::run_with_timeout("docker", &["info"], None, None, PROBE_TIMEOUT).await,
            Ok(CommandOutcome::Completed(out)) if out.success()
        )
    }

    /// Version of the compose v2 plugin, if present.
    pub async fn compose_version() -> Option<String> {
        let out = runner::run("docker", &["compose", "version", "--short"], None, None)
            .await
            .ok()?;
        if !out.success() {
            return None;
        }
        let version = out.stdout.trim().to_string();
        if version.is_empty() {
            None
        } else {
            Some(version)
        }
    }

    /// Version of the legacy standalone `docker-compose` binary, if present.
    pub async fn legacy_compose_version() -> Option<String> {
        if which::which("docker-compose").is_err() {
            return None;
        }
        let out = runner::run("docker-compose", &["--version"], None, None)
            .await
            .ok()?;
        crate::version::extract_version(&out.stdout)
    }

    /// Authenticate against the image registry, token on stdin.
    ///
    /// # Errors
    ///
    /// Returns an error only for spawn failures; auth rejection and timeout
    /// come back as [`CommandOutcome`] values for the caller to rank.
    pub async fn registry_login(
        registry: &str,
        username: &str,
        token: &str,
        limit: Duration,
    ) -> Result<CommandOutcome> {
        runner::run_with_timeout(
            "docker",
            &[
                "login",
                registry,
                "--username",
                username,
                "--password-stdin",
            ],
            None,
            Some(token),
            limit,
        )
        .await
    }

    /// Names of any containers publishing `port`, for conflict attribution.
    pub async fn port_owner(port: u16) -> Option<String> {
        let filter = format!("publish={port}");
        let out = runner::run(
            "docker",
            &["ps", "--filter", &filter, "--format", "{{.Names}}"],
            None,
            None,
        )
        .await
        .ok()?;
        let names = out.stdout.trim();
        if out.success() && !names.is_empty() {
            Some(names.to_string())
        } else {
            None
        }
    }

    /// `docker compose pull` behind a spinner.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    pub async fn pull(&self, rc: &RenderConfig) -> Result<()> {
        runner::run_with_spinner(
            rc,
            "Pulling service images",
            "docker",
            &["compose", "-p", PROJECT_NAME, "pull"],
            self.dir(),
        )
        .await
    }

    /// `docker compose up -d` behind a spinner.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack fails to start.
    pub async fn up(&self, rc: &RenderConfig) -> Result<()> {
        runner::run_with_spinner(
            rc,
            "Starting services",
            "docker",
            &["compose", "-p", PROJECT_NAME, "up", "-d"],
            self.dir(),
        )
        .await
    }

    /// Tear down containers and volumes behind a spinner.
    ///
    /// # Errors
    ///
    /// Returns an error if the teardown command fails.
    pub async fn down(&self, rc: &RenderConfig) -> Result<()> {
        runner::run_with_spinner(
            rc,
            "Removing containers and volumes",
            "docker",
            &["compose", "-p", PROJECT_NAME, "down", "--volumes"],
            self.dir(),
        )
        .await
    }

    /// One fresh status snapshot of all services.
    ///
    /// # Errors
    ///
    /// Returns an error if the status listing cannot be run at all.
    pub async fn snapshot(&self) -> Result<StackSnapshot> {
        let out: CommandOutput = runner::run(
            "docker",
            &[
                "compose",
                "-p",
                PROJECT_NAME,
                "ps",
                "--all",
                "--format",
                "{{.Service}}\t{{.Status}}",
            ],
            self.dir(),
            None,
        )
        .await?;
        debug!(stdout = %out.stdout, "compose ps");
        Ok(StackSnapshot::from_ps_output(&out.stdout))
    }

    /// The last `lines` lines of one service's logs.
    ///
    /// # Errors
    ///
    /// Returns an error if the log command cannot be run.
    pub async fn recent_logs(&self, service: &str, lines: u32) -> Result<String> {
        let tail = lines.to_string();
        let out = runner::run(
            "docker",
            &[
                "compose",
                "-p",
                PROJECT_NAME,
                "logs",
                "--no-color",
                "--tail",
                &tail,
                service,
            ],
            self.dir(),
            None,
        )
        .await?;
        Ok(out.combined())
    }

    /// Stream stack logs to the terminal until the child exits.
    ///
    /// Runs in the foreground with inherited stdio; Ctrl-C reaches the
    /// child through the process group and is a normal way to stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the log process cannot be spawned.
    pub async fn tail_logs(&self) -> Result<()> {
        LOG_TAIL_ACTIVE.store(true, Ordering::SeqCst);
        let result = Command::new("docker")
            .args(["compose", "-p", PROJECT_NAME, "logs", "--follow", "--tail", "50"])
            .current_dir(&self.project_dir)
            .status()
            .await
            .context("Failed to stream service logs");
        LOG_TAIL_ACTIVE.store(false, Ordering::SeqCst);
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_healthy() {
        assert_eq!(
            parse_service_status("Up 2 minutes (healthy)"),
            ServiceStatus::Healthy
        );
    }

    #[test]
    fn test_parse_health_starting() {
        assert_eq!(
            parse_service_status("Up 10 seconds (health: starting)"),
            ServiceStatus::Starting
        );
    }

    #[test]
    fn test_parse_plain_up() {
        assert_eq!(
            parse_service_status("Up About a minute"),
            ServiceStatus::Running
        );
    }

    #[test]
    fn test_parse_clean_exit() {
        assert_eq!(
            parse_service_status("Exited (0) 5 minutes ago"),
            ServiceStatus::Completed
        );
    }

    #[test]
    fn test_parse_failed_exit_carries_code() {
        assert_eq!(
            parse_service_status("Exited (137) 2 seconds ago"),
            ServiceStatus::Failed(137)
        );
        assert_eq!(
            parse_service_status("Exited (1) About an hour ago"),
            ServiceStatus::Failed(1)
        );
    }

    #[test]
    fn test_parse_created_and_restarting() {
        assert_eq!(parse_service_status("Created"), ServiceStatus::Starting);
        assert_eq!(
            parse_service_status("Restarting (1) 5 seconds ago"),
            ServiceStatus::Starting
        );
    }

    #[test]
    fn test_parse_empty_is_waiting() {
        assert_eq!(parse_service_status(""), ServiceStatus::Waiting);
        assert_eq!(parse_service_status("   "), ServiceStatus::Waiting);
    }

    #[test]
    fn test_snapshot_fills_unobserved_services() {
        let output = "server\tUp 2 minutes (healthy)\nextractor\tExited (0) 1 minute ago\n";
        let snap = StackSnapshot::from_ps_output(output);
        assert_eq!(snap.status_of("server"), ServiceStatus::Healthy);
        assert_eq!(snap.status_of("extractor"), ServiceStatus::Completed);
        assert_eq!(snap.status_of("postgres"), ServiceStatus::Waiting);
        assert_eq!(snap.status_of("watcher"), ServiceStatus::Waiting);
    }

    #[test]
    fn test_snapshot_main_service_failure() {
        let output = "server\tExited (1) 3 seconds ago\npostgres\tUp 1 minute (healthy)\n";
        let snap = StackSnapshot::from_ps_output(output);
        assert_eq!(snap.main_service_failure(), Some(1));

        let ok = StackSnapshot::from_ps_output("server\tUp 1 minute\n");
        assert_eq!(ok.main_service_failure(), None);
    }

    #[test]
    fn test_snapshot_display_order_is_fixed() {
        let snap = StackSnapshot::from_ps_output("watcher\tUp 1 minute\n");
        let names: Vec<&str> = snap.iter().map(|(s, _)| s).collect();
        assert_eq!(names, SERVICES.to_vec());
    }
}
