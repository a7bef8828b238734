//! Liveness polling and the in-place status dashboard.
//!
//! A cooperative loop: every few seconds it probes the server's HTTP
//! endpoint, takes a fresh status snapshot of all services, infers a
//! display-only indexing phase from recent log text, and redraws a small
//! panel in place. The loop ends on the first HTTP response (healthy), on
//! the main service exiting non-zero (failed), or - only when the operator
//! configured a ceiling - on the ceiling expiring.

use std::time::{Duration, Instant};

use anyhow::Result;
use colored::Colorize;
use tracing::debug;

use crate::compose::{ComposeClient, ServiceStatus, StackSnapshot, MAIN_SERVICE};
use crate::ui::{self, CursorGuard, RenderConfig};

/// Poll interval between observation cycles.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How many recent log lines feed phase inference.
const LOG_WINDOW: u32 = 60;

/// Probe timeout; slower than this counts as "not up yet".
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Terminal outcome of the health wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// The server answered an HTTP request.
    Healthy,
    /// The main service exited non-zero; carries the exit code.
    MainServiceFailed(i32),
    /// The configured ceiling expired while still progressing.
    TimedOut,
}

/// Display-only classification of where indexing currently is.
///
/// Ordered least to most advanced; inference checks the most advanced
/// markers first so a log tail holding several accumulated markers reports
/// the latest true phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexPhase {
    Starting,
    Cloning,
    Extracting,
    Embedding,
    Indexing,
    Ready,
}

impl IndexPhase {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Starting => "starting up",
            Self::Cloning => "cloning repositories",
            Self::Extracting => "extracting code structure",
            Self::Embedding => "generating embeddings",
            Self::Indexing => "building the search index",
            Self::Ready => "ready",
        }
    }
}

/// Infer the current indexing phase from a window of recent log text.
///
/// Cosmetic only; never gates the health or failure determination.
#[must_use]
pub fn infer_phase(log_tail: &str) -> IndexPhase {
    let text = log_tail.to_lowercase();
    let contains_any =
        |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    // Most advanced signatures first.
    if contains_any(&["listening on", "server ready", "serving requests"]) {
        return IndexPhase::Ready;
    }
    if contains_any(&["building index", "writing index", "index commit"]) {
        return IndexPhase::Indexing;
    }
    if contains_any(&["embedding", "generating embeddings"]) {
        return IndexPhase::Embedding;
    }
    if contains_any(&["extracting", "parsing source"]) {
        return IndexPhase::Extracting;
    }
    if contains_any(&["cloning", "fetching repositor"]) {
        return IndexPhase::Cloning;
    }
    IndexPhase::Starting
}

/// Blocking poller that owns the dashboard for the duration of the wait.
pub struct HealthWaiter<'a> {
    rc: &'a RenderConfig,
    compose: &'a ComposeClient,
    port: u16,
    /// None means poll indefinitely (rate-limited embedding generation can
    /// legitimately take a very long time).
    ceiling: Option<Duration>,
}

impl<'a> HealthWaiter<'a> {
    #[must_use]
    pub fn new(
        rc: &'a RenderConfig,
        compose: &'a ComposeClient,
        port: u16,
        ceiling: Option<Duration>,
    ) -> Self {
        Self {
            rc,
            compose,
            port,
            ceiling,
        }
    }

    /// Poll until the stack is healthy, the main service fails, or the
    /// ceiling (if any) expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub async fn wait(&self) -> Result<HealthVerdict> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()?;
        let url = format!("http://127.0.0.1:{}/", self.port);
        let started = Instant::now();

        // Cursor hidden while the panel redraws in place; restored on every
        // exit from this scope.
        let _cursor = CursorGuard::hide();
        let mut panel = Panel::new(self.rc);

        loop {
            let snapshot = self
                .compose
                .snapshot()
                .await
                .unwrap_or_default();

            let alive = probe(&client, &url).await;
            let log_tail = self
                .compose
                .recent_logs(MAIN_SERVICE, LOG_WINDOW)
                .await
                .unwrap_or_default();
            let phase = if alive {
                IndexPhase::Ready
            } else {
                infer_phase(&log_tail)
            };

            panel.draw(&snapshot, phase, alive, started.elapsed());

            if let Some(code) = snapshot.main_service_failure() {
                return Ok(HealthVerdict::MainServiceFailed(code));
            }
            if alive {
                return Ok(HealthVerdict::Healthy);
            }
            if let Some(ceiling) = self.ceiling {
                if started.elapsed() >= ceiling {
                    return Ok(HealthVerdict::TimedOut);
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Any HTTP-level response means the process is alive and serving; only
/// connection failure or timeout means "not yet up".
async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => {
            debug!(status = %resp.status(), "health probe answered");
            true
        }
        Err(e) => {
            debug!(error = %e, "health probe not answered");
            false
        }
    }
}

/// The redrawable panel. Each draw erases exactly the number of lines the
/// previous draw produced; both sides derive from the same render pass so
/// the count cannot drift.
struct Panel<'a> {
    rc: &'a RenderConfig,
    drawn_lines: usize,
}

impl<'a> Panel<'a> {
    fn new(rc: &'a RenderConfig) -> Self {
        Self { rc, drawn_lines: 0 }
    }

    fn draw(
        &mut self,
        snapshot: &StackSnapshot,
        phase: IndexPhase,
        alive: bool,
        elapsed: Duration,
    ) {
        let lines = self.render(snapshot, phase, alive, elapsed);
        if self.drawn_lines > 0 {
            ui::erase_lines(self.drawn_lines);
        }
        for line in &lines {
            println!("{line}");
        }
        self.drawn_lines = lines.len();
    }

    fn render(
        &self,
        snapshot: &StackSnapshot,
        phase: IndexPhase,
        alive: bool,
        elapsed: Duration,
    ) -> Vec<String> {
        let rc = self.rc;
        let mut lines = Vec::with_capacity(7);

        lines.push(format!("  {}", "Service status".bold()));
        for (service, status) in snapshot.iter() {
            lines.push(format!(
                "  {} {:<10} {}",
                status_mark(rc, status),
                service,
                status_label(status)
            ));
        }
        lines.push(format!(
            "  {} indexer: {}",
            rc.info_mark().blue(),
            phase.description()
        ));
        let probe_text = if alive {
            "answering".green().to_string()
        } else {
            "no response yet".bright_black().to_string()
        };
        lines.push(format!(
            "  {} server probe: {probe_text} (elapsed {})",
            rc.info_mark().blue(),
            format_elapsed(elapsed)
        ));

        lines
    }
}

fn status_mark(rc: &RenderConfig, status: ServiceStatus) -> String {
    match status {
        ServiceStatus::Healthy | ServiceStatus::Completed => rc.check().green().to_string(),
        ServiceStatus::Failed(_) => rc.cross().red().to_string(),
        ServiceStatus::Running => rc.check().cyan().to_string(),
        ServiceStatus::Starting | ServiceStatus::Waiting => {
            rc.arrow().bright_black().to_string()
        }
    }
}

fn status_label(status: ServiceStatus) -> String {
    match status {
        ServiceStatus::Healthy => "healthy".green().to_string(),
        ServiceStatus::Completed => "completed".green().to_string(),
        ServiceStatus::Running => "running".cyan().to_string(),
        ServiceStatus::Starting => "starting".yellow().to_string(),
        ServiceStatus::Waiting => "waiting".bright_black().to_string(),
        ServiceStatus::Failed(code) => format!("exited ({code})").red().to_string(),
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m{:02}s", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_phase_most_advanced_marker_wins() {
        // A tail that accumulated the whole pipeline reports the latest
        // true phase, not the earliest.
        let tail = "\
Cloning into '/data/repos/api'...
extracting 412 files
generating embeddings batch 3/120
building index segment 1
listening on 0.0.0.0:8080";
        assert_eq!(infer_phase(tail), IndexPhase::Ready);
    }

    #[test]
    fn test_infer_phase_intermediate_stages() {
        assert_eq!(
            infer_phase("Cloning into '/data/repos/api'..."),
            IndexPhase::Cloning
        );
        assert_eq!(
            infer_phase("extracting 412 files from api"),
            IndexPhase::Extracting
        );
        assert_eq!(
            infer_phase("generating embeddings batch 3/120 (rate limited, backing off)"),
            IndexPhase::Embedding
        );
        assert_eq!(
            infer_phase("building index segment 4 of 7"),
            IndexPhase::Indexing
        );
    }

    #[test]
    fn test_infer_phase_empty_or_unknown_is_starting() {
        assert_eq!(infer_phase(""), IndexPhase::Starting);
        assert_eq!(infer_phase("db connected, running migrations"), IndexPhase::Starting);
    }

    #[test]
    fn test_infer_phase_cloning_outranked_by_embedding() {
        let tail = "Cloning into '/data/repos/api'...\ngenerating embeddings batch 1/10";
        assert_eq!(infer_phase(tail), IndexPhase::Embedding);
    }

    #[test]
    fn test_panel_line_count_matches_render() {
        let rc = RenderConfig::plain();
        let panel = Panel::new(&rc);
        let snapshot = StackSnapshot::from_ps_output("server\tUp 1 minute\n");
        let lines = panel.render(
            &snapshot,
            IndexPhase::Starting,
            false,
            Duration::from_secs(61),
        );
        // Header + four services + phase + probe line.
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0m00s");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "1m01s");
        assert_eq!(format_elapsed(Duration::from_secs(600)), "10m00s");
    }
}
