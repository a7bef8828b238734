//! Prerequisite checks.
//!
//! A fixed, ordered battery of environment probes. Every check runs even
//! after a failure so the operator sees the complete picture; the
//! aggregate failure count decides whether the install may proceed.
//! Warnings never block.

use std::net::TcpListener;
use std::path::{Path, PathBuf};

use anyhow::Result;
use sysinfo::{Disks, System};
use tracing::debug;

use crate::compose::{self, ComposeClient};
use crate::platform::{Arch, Platform};
use crate::prompt;
use crate::ui::{self, CheckStatus, RenderConfig};
use crate::version::version_gte;

const MIN_DOCKER_VERSION: &str = "20.10";
const MIN_COMPOSE_VERSION: &str = "2.0";
const MIN_DISK_GIB: u64 = 10;
const MIN_RAM_GIB: u64 = 4;

const GIB: u64 = 1024 * 1024 * 1024;

/// Aggregate outcome of the check battery.
#[derive(Debug)]
pub struct CheckReport {
    pub failures: u32,
    pub warnings: u32,
    /// The port to use for the rest of the run; differs from the requested
    /// port when the operator chose an alternate during negotiation.
    pub port: u16,
    hints: Vec<String>,
}

impl CheckReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures == 0
    }

    /// Print the remediation hints collected for failed checks.
    pub fn print_remediation(&self, rc: &RenderConfig) {
        if self.hints.is_empty() {
            return;
        }
        println!();
        ui::print_info(rc, "To fix the failed checks:");
        for (i, hint) in self.hints.iter().enumerate() {
            ui::print_numbered_step(i + 1, hint);
        }
    }
}

/// Runs the prerequisite battery for one platform/port combination.
pub struct PrerequisiteChecker<'a> {
    rc: &'a RenderConfig,
    platform: Platform,
    arch: Arch,
    port: u16,
}

impl<'a> PrerequisiteChecker<'a> {
    #[must_use]
    pub fn new(rc: &'a RenderConfig, platform: Platform, arch: Arch, port: u16) -> Self {
        Self {
            rc,
            platform,
            arch,
            port,
        }
    }

    /// Run every check in order and aggregate the result.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid operator input during port
    /// negotiation; check failures are counted, not raised.
    pub async fn run(&self) -> Result<CheckReport> {
        let mut report = CheckReport {
            failures: 0,
            warnings: 0,
            port: self.port,
            hints: Vec::new(),
        };

        println!();
        self.check_platform(&mut report);
        self.check_git(&mut report);
        self.check_docker(&mut report).await;
        self.check_daemon(&mut report).await;
        self.check_compose(&mut report).await;
        self.check_disk(&mut report);
        self.check_ram(&mut report);
        self.check_port(&mut report).await?;
        self.check_downloader(&mut report);
        println!();

        if report.passed() {
            ui::print_success(self.rc, "All prerequisite checks passed");
        }

        Ok(report)
    }

    fn pass(&self, name: &str, msg: Option<&str>) {
        ui::print_check_result(self.rc, name, CheckStatus::Pass, msg);
    }

    fn warn(&self, report: &mut CheckReport, name: &str, msg: &str) {
        report.warnings += 1;
        ui::print_check_result(self.rc, name, CheckStatus::Warn, Some(msg));
    }

    fn fail(&self, report: &mut CheckReport, name: &str, msg: &str, hint: &str) {
        report.failures += 1;
        report.hints.push(hint.to_string());
        ui::print_check_result(self.rc, name, CheckStatus::Fail, Some(msg));
    }

    fn check_platform(&self, report: &mut CheckReport) {
        match self.platform {
            Platform::Unknown => self.fail(
                report,
                "Platform",
                "unsupported operating system",
                "RepoLens supports macOS, Linux, WSL2 and Git Bash on Windows.",
            ),
            p => self.pass("Platform", Some(&p.to_string())),
        }

        match self.arch {
            Arch::Armv7 => self.fail(
                report,
                "Architecture",
                "32-bit ARM is not supported",
                "The service images are only published for x64 and arm64.",
            ),
            a => self.pass("Architecture", Some(&a.to_string())),
        }
    }

    fn check_git(&self, report: &mut CheckReport) {
        if which::which("git").is_ok() {
            self.pass("Git", None);
        } else {
            let hint = match self.platform {
                Platform::MacOs => "Install git: xcode-select --install (or brew install git)",
                Platform::Linux | Platform::Wsl2 => {
                    "Install git with your package manager, e.g. apt-get install git"
                }
                Platform::WindowsGitBash => {
                    "Reinstall Git for Windows from https://gitforwindows.org"
                }
                Platform::Unknown => "Install git from https://git-scm.com",
            };
            self.fail(report, "Git", "not found", hint);
        }
    }

    async fn check_docker(&self, report: &mut CheckReport) {
        if which::which("docker").is_err() {
            let hint = match self.platform {
                Platform::MacOs | Platform::WindowsGitBash => {
                    "Install Docker Desktop from https://docker.com"
                }
                Platform::Linux | Platform::Wsl2 | Platform::Unknown => {
                    "Install Docker Engine: https://docs.docker.com/engine/install/"
                }
            };
            self.fail(report, "Docker", "not found", hint);
            return;
        }

        match ComposeClient::engine_version().await {
            Ok(version) if version_gte(&version, MIN_DOCKER_VERSION) => {
                self.pass("Docker", Some(&format!("v{version}")));
            }
            Ok(version) => self.fail(
                report,
                "Docker",
                &format!("v{version} is older than the required v{MIN_DOCKER_VERSION}"),
                "Upgrade Docker to a current release.",
            ),
            Err(e) => {
                debug!(error = %e, "docker version probe failed");
                self.fail(
                    report,
                    "Docker",
                    "could not determine version",
                    "Check that 'docker --version' works in this shell.",
                );
            }
        }
    }

    async fn check_daemon(&self, report: &mut CheckReport) {
        if ComposeClient::daemon_reachable().await {
            self.pass("Docker daemon", Some("reachable"));
        } else {
            let hint = match self.platform {
                Platform::MacOs | Platform::WindowsGitBash => {
                    "Start Docker Desktop and wait for it to finish booting."
                }
                Platform::Linux | Platform::Wsl2 | Platform::Unknown => {
                    "Start the daemon: sudo systemctl start docker"
                }
            };
            self.fail(report, "Docker daemon", "not reachable", hint);
        }
    }

    async fn check_compose(&self, report: &mut CheckReport) {
        if let Some(version) = ComposeClient::compose_version().await {
            if version_gte(&version, MIN_COMPOSE_VERSION) {
                self.pass("Docker Compose", Some(&format!("v{version}")));
            } else {
                self.fail(
                    report,
                    "Docker Compose",
                    &format!("v{version} is older than the required v{MIN_COMPOSE_VERSION}"),
                    "Upgrade the Docker Compose plugin.",
                );
            }
            return;
        }

        // The plugin is missing; a standalone v1 binary is explicitly too
        // old, not a substitute.
        if let Some(legacy) = ComposeClient::legacy_compose_version().await {
            self.fail(
                report,
                "Docker Compose",
                &format!("legacy docker-compose v{legacy} is too old"),
                "Install the Compose v2 plugin: https://docs.docker.com/compose/install/",
            );
        } else {
            self.fail(
                report,
                "Docker Compose",
                "not found",
                "Install the Compose v2 plugin: https://docs.docker.com/compose/install/",
            );
        }
    }

    fn check_disk(&self, report: &mut CheckReport) {
        let Some(home) = dirs::home_dir() else {
            return; // no measurable location; skip silently
        };
        let disks = Disks::new_with_refreshed_list();
        let entries: Vec<(PathBuf, u64)> = disks
            .list()
            .iter()
            .map(|d| (d.mount_point().to_path_buf(), d.available_space()))
            .collect();

        match free_space_for(&home, &entries) {
            None => {} // measurement unavailable; skip silently
            Some(free) if free / GIB >= MIN_DISK_GIB => {
                self.pass("Disk space", Some(&format!("{} GiB free", free / GIB)));
            }
            Some(free) => self.warn(
                report,
                "Disk space",
                &format!(
                    "{} GiB free, {MIN_DISK_GIB} GiB recommended - large repositories may not fit",
                    free / GIB
                ),
            ),
        }
    }

    fn check_ram(&self, report: &mut CheckReport) {
        let mut sys = System::new();
        sys.refresh_memory();
        let total = sys.total_memory();
        if total / GIB >= MIN_RAM_GIB {
            self.pass("Memory", Some(&format!("{} GiB", total / GIB)));
        } else {
            self.warn(
                report,
                "Memory",
                &format!(
                    "{} GiB total, {MIN_RAM_GIB} GiB recommended - indexing may be slow",
                    total / GIB
                ),
            );
        }
    }

    /// Port availability, with negotiation when a foreign process holds it.
    async fn check_port(&self, report: &mut CheckReport) -> Result<()> {
        let name = format!("Port {}", self.port);

        if TcpListener::bind(("127.0.0.1", self.port)).is_ok() {
            self.pass(&name, Some("available"));
            return Ok(());
        }

        // Occupied. Our own prior stack (or the engine's proxy for it) will
        // release the port when services restart; that is not a conflict.
        if let Some(owner) = ComposeClient::port_owner(self.port).await {
            if owner.contains(compose::PROJECT_NAME) {
                self.pass(
                    &name,
                    Some("held by a previous RepoLens install; it will be reclaimed"),
                );
                return Ok(());
            }
            self.warn(
                report,
                &name,
                &format!("in use by container '{owner}'"),
            );
        } else {
            self.warn(report, &name, "in use by another process");
        }

        let answer = prompt::input_optional(&format!(
            "Enter an alternate port (1024-65535), or leave empty to keep {}",
            self.port
        ))?;
        match prompt::validate_port(&answer)? {
            Some(port) => {
                report.port = port;
                ui::print_info(self.rc, &format!("Using port {port} instead"));
            }
            None => ui::print_warning(
                self.rc,
                &format!(
                    "Keeping port {} - startup will fail if it is still occupied",
                    self.port
                ),
            ),
        }
        Ok(())
    }

    fn check_downloader(&self, report: &mut CheckReport) {
        if which::which("curl").is_ok() || which::which("wget").is_ok() {
            self.pass("Download tool", Some("curl or wget"));
        } else {
            self.warn(
                report,
                "Download tool",
                "neither curl nor wget found - handy for troubleshooting, not required",
            );
        }
    }
}

/// Free space on the mount that contains `home`: the entry with the
/// longest mount point that is a prefix of the home path.
fn free_space_for(home: &Path, entries: &[(PathBuf, u64)]) -> Option<u64> {
    entries
        .iter()
        .filter(|(mount, _)| home.starts_with(mount))
        .max_by_key(|(mount, _)| mount.as_os_str().len())
        .map(|(_, free)| *free)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_space_picks_longest_matching_mount() {
        let entries = vec![
            (PathBuf::from("/"), 100 * GIB),
            (PathBuf::from("/home"), 42 * GIB),
        ];
        assert_eq!(
            free_space_for(Path::new("/home/alice"), &entries),
            Some(42 * GIB)
        );
    }

    #[test]
    fn test_free_space_falls_back_to_root() {
        let entries = vec![(PathBuf::from("/"), 7 * GIB)];
        assert_eq!(
            free_space_for(Path::new("/home/alice"), &entries),
            Some(7 * GIB)
        );
    }

    #[test]
    fn test_free_space_none_when_unmeasurable() {
        assert_eq!(free_space_for(Path::new("/home/alice"), &[]), None);
        let entries = vec![(PathBuf::from("/mnt/data"), GIB)];
        assert_eq!(free_space_for(Path::new("/home/alice"), &entries), None);
    }
}
