//! The install sequence controller.
//!
//! Drives the fixed step order: platform detection, prerequisite checks,
//! the existing-install branch, stack definition download, interactive
//! configuration, registry login, image pull and service start, and the
//! health wait. Each step advances the session phase; any fatal error
//! marks the session failed and propagates up with remediation text
//! already attached.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::compose::ComposeClient;
use crate::envfile;
use crate::health::{HealthVerdict, HealthWaiter};
use crate::platform;
use crate::prereqs::PrerequisiteChecker;
use crate::prompt;
use crate::runner::CommandOutcome;
use crate::session::{BedrockCredentials, InstallPhase, InstallSession, Provider};
use crate::ui::{self, RenderConfig};

/// Where the stack definition files are published.
const STACK_BASE_URL: &str = "https://get.repolens.dev/stack";

/// Files fetched into the install directory before configuration.
const STACK_FILES: [&str; 2] = ["docker-compose.yml", "init.sql"];

/// Image registry for the service images.
const REGISTRY: &str = "ghcr.io";
const REGISTRY_USER: &str = "repolens";

/// A hung `docker login` must not stall the install; images may be public.
const REGISTRY_LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// What the operator picked when an existing install was found.
enum ExistingInstallChoice {
    Update,
    Reinstall,
    Quit,
}

/// One install run, from banner to summary.
pub struct Installer {
    rc: RenderConfig,
    session: InstallSession,
    compose: ComposeClient,
    health_ceiling: Option<Duration>,
}

impl Installer {
    #[must_use]
    pub fn new(
        rc: RenderConfig,
        session: InstallSession,
        health_ceiling: Option<Duration>,
    ) -> Self {
        let compose = ComposeClient::new(session.install_dir.clone());
        Self {
            rc,
            session,
            compose,
            health_ceiling,
        }
    }

    /// Run the full sequence.
    ///
    /// # Errors
    ///
    /// Returns an error for any fatal condition; the message carries the
    /// remediation text shown to the operator.
    pub async fn run(&mut self) -> Result<()> {
        ui::print_banner();

        match self.run_steps().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.session.fail();
                Err(e)
            }
        }
    }

    async fn run_steps(&mut self) -> Result<()> {
        self.step_prerequisites().await?;

        if self.session.env_file().exists() {
            match self.existing_install_choice()? {
                ExistingInstallChoice::Update => return self.run_update().await,
                ExistingInstallChoice::Reinstall => self.wipe_existing().await?,
                ExistingInstallChoice::Quit => {
                    ui::print_info(&self.rc, "Nothing changed.");
                    return Ok(());
                }
            }
        }

        self.step_download().await?;
        let git_token = self.step_configure()?;
        self.step_registry_login(&git_token).await?;
        self.step_start_services().await?;
        self.step_wait_for_health().await?;

        self.print_summary();
        self.offer_log_tail().await
    }

    fn announce(&self, phase: InstallPhase) {
        ui::print_progress_step(
            &self.rc,
            phase.step_number(),
            InstallPhase::TOTAL_STEPS,
            phase.description(),
        );
    }

    async fn step_prerequisites(&mut self) -> Result<()> {
        self.session.advance();
        self.announce(self.session.phase);

        let checker = PrerequisiteChecker::new(
            &self.rc,
            self.session.platform,
            self.session.arch,
            self.session.port,
        );
        let report = checker.run().await?;
        if !report.passed() {
            report.print_remediation(&self.rc);
            bail!(
                "{} prerequisite check(s) failed. Fix the issues above and re-run the installer.",
                report.failures
            );
        }
        // Port negotiation may have settled on an alternate.
        self.session.port = report.port;
        Ok(())
    }

    /// Forced three-way choice; there is no default to fall through to.
    fn existing_install_choice(&self) -> Result<ExistingInstallChoice> {
        println!();
        ui::print_info(
            &self.rc,
            &format!(
                "An existing install was found in {}",
                self.session.install_dir.display()
            ),
        );
        let picked = prompt::select(
            "What would you like to do?",
            &[
                "Update: pull the latest images and restart",
                "Reinstall: wipe everything and start over",
                "Quit without changes",
            ],
        )?;
        Ok(match picked {
            0 => ExistingInstallChoice::Update,
            1 => ExistingInstallChoice::Reinstall,
            _ => ExistingInstallChoice::Quit,
        })
    }

    /// The short path: refresh images and restart with the existing config.
    async fn run_update(&mut self) -> Result<()> {
        info!("updating existing install");
        println!();
        // The advertised URL and health probe follow the port the existing
        // install was configured with.
        if let Some(port) = envfile::get_env_var(&self.session.env_file(), "SERVER_PORT")?
            .and_then(|v| v.trim().parse().ok())
        {
            self.session.port = port;
        }
        self.compose.pull(&self.rc).await.context(
            "Image pull failed. Check your network connection and re-run the installer.",
        )?;
        self.compose.up(&self.rc).await.context(
            "Services failed to restart. Run 'docker compose logs' in the install directory.",
        )?;
        self.wait_for_health().await?;
        self.print_summary();
        self.offer_log_tail().await
    }

    /// Tear down the old stack and clear the directory for a fresh install.
    async fn wipe_existing(&mut self) -> Result<()> {
        println!();
        self.compose.down(&self.rc).await.context(
            "Could not remove the previous stack. Run 'docker compose down -v' in the install directory and re-run.",
        )?;
        std::fs::remove_dir_all(&self.session.install_dir).with_context(|| {
            format!(
                "Could not clear {}. Remove it manually and re-run.",
                self.session.install_dir.display()
            )
        })?;
        Ok(())
    }

    async fn step_download(&mut self) -> Result<()> {
        self.session.advance();
        self.announce(self.session.phase);

        std::fs::create_dir_all(&self.session.install_dir).with_context(|| {
            format!(
                "Could not create the install directory {}",
                self.session.install_dir.display()
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        for name in STACK_FILES {
            let url = format!("{STACK_BASE_URL}/{name}");
            debug!(%url, "downloading stack file");
            let bytes = fetch(&client, &url).await.with_context(|| {
                format!(
                    "Could not download {name}. Check your network connection and re-run the installer."
                )
            })?;
            let dest = self.session.install_dir.join(name);
            std::fs::write(&dest, &bytes)
                .with_context(|| format!("Could not write {}", dest.display()))?;
        }
        ui::print_success(&self.rc, "Stack definition downloaded");
        Ok(())
    }

    fn step_configure(&mut self) -> Result<String> {
        self.session.advance();
        self.announce(self.session.phase);

        let env_file = self.session.env_file();
        let mut reader = prompt::TtyReader::open()?;

        println!();
        ui::print_info(
            &self.rc,
            "RepoLens needs a Git access token to clone your repositories.",
        );
        let git_token = prompt::prompt_secret_required(
            &self.rc,
            &mut reader,
            "Git access token",
            "Create one with repository read access and paste it here.",
        )?;
        envfile::set_env_var(&env_file, "GIT_TOKEN", &git_token)?;

        envfile::set_env_var(&env_file, "SERVER_PORT", &self.session.port.to_string())?;

        let provider = self.configure_provider(&env_file, &mut reader)?;
        envfile::set_env_var(&env_file, "EMBEDDINGS_PROVIDER", provider.env_value())?;
        self.session.provider = Some(provider);

        ui::print_success(&self.rc, "Configuration written");
        Ok(git_token)
    }

    fn configure_provider(
        &self,
        env_file: &std::path::Path,
        reader: &mut prompt::TtyReader,
    ) -> Result<Provider> {
        println!();
        let picked = prompt::select(
            "Which embeddings provider should RepoLens use?",
            &["OpenAI", "AWS Bedrock"],
        )?;

        if picked == 0 {
            let api_key = prompt::prompt_secret_required(
                &self.rc,
                reader,
                "OpenAI API key",
                "Find it under platform.openai.com/api-keys.",
            )?;
            envfile::set_env_var(env_file, "OPENAI_API_KEY", &api_key)?;
            return Ok(Provider::OpenAi { api_key });
        }

        let region = prompt::input_with_default("AWS region", "us-east-1")?;
        envfile::set_env_var(env_file, "AWS_REGION", &region)?;

        let kind = prompt::select(
            "How do you authenticate with Bedrock?",
            &[
                "Bearer token (long-lived API key)",
                "Session credentials (access key, secret key, session token)",
            ],
        )?;
        let credentials = if kind == 0 {
            let token = prompt::prompt_secret_required(
                &self.rc,
                reader,
                "Bedrock bearer token",
                "Generate one in the Bedrock console.",
            )?;
            envfile::set_env_var(env_file, "AWS_BEARER_TOKEN_BEDROCK", &token)?;
            BedrockCredentials::BearerToken(token)
        } else {
            let access_key_id = prompt::prompt_secret_required(
                &self.rc,
                reader,
                "AWS access key ID",
                "Paste the temporary credentials from your AWS session.",
            )?;
            let secret_access_key = prompt::prompt_secret_required(
                &self.rc,
                reader,
                "AWS secret access key",
                "Paste the temporary credentials from your AWS session.",
            )?;
            let session_token = prompt::prompt_secret_required(
                &self.rc,
                reader,
                "AWS session token",
                "Session tokens can be several kilobytes; paste the whole value.",
            )?;
            envfile::set_env_var(env_file, "AWS_ACCESS_KEY_ID", &access_key_id)?;
            envfile::set_env_var(env_file, "AWS_SECRET_ACCESS_KEY", &secret_access_key)?;
            envfile::set_env_var(env_file, "AWS_SESSION_TOKEN", &session_token)?;
            BedrockCredentials::Session {
                access_key_id,
                secret_access_key,
                session_token,
            }
        };

        Ok(Provider::Bedrock {
            region,
            credentials,
        })
    }

    /// Registry auth is best-effort: the images may be public, and a flaky
    /// auth endpoint must not block the install.
    async fn step_registry_login(&mut self, token: &str) -> Result<()> {
        self.session.advance();
        self.announce(self.session.phase);

        match ComposeClient::registry_login(REGISTRY, REGISTRY_USER, token, REGISTRY_LOGIN_TIMEOUT)
            .await
        {
            Ok(CommandOutcome::Completed(out)) if out.success() => {
                ui::print_success(&self.rc, &format!("Authenticated with {REGISTRY}"));
            }
            Ok(CommandOutcome::Completed(out)) => {
                debug!(stderr = %out.stderr, "registry login rejected");
                ui::print_warning(
                    &self.rc,
                    &format!(
                        "Login to {REGISTRY} was rejected; continuing - the images may be public"
                    ),
                );
            }
            Ok(CommandOutcome::TimedOut) => {
                ui::print_warning(
                    &self.rc,
                    &format!(
                        "Login to {REGISTRY} timed out; continuing - the images may be public"
                    ),
                );
            }
            Err(e) => {
                debug!(error = %e, "registry login could not run");
                ui::print_warning(
                    &self.rc,
                    &format!("Could not run the {REGISTRY} login; continuing"),
                );
            }
        }
        Ok(())
    }

    async fn step_start_services(&mut self) -> Result<()> {
        self.session.advance();
        self.announce(self.session.phase);
        println!();

        self.compose.pull(&self.rc).await.context(
            "Image pull failed. Check your network connection and registry access, then re-run the installer.",
        )?;
        self.compose.up(&self.rc).await.context(
            "Services failed to start. Run 'docker compose logs' in the install directory to see why.",
        )?;
        Ok(())
    }

    async fn step_wait_for_health(&mut self) -> Result<()> {
        self.session.advance();
        self.announce(self.session.phase);
        println!();
        self.wait_for_health().await?;
        self.session.advance();
        Ok(())
    }

    async fn wait_for_health(&mut self) -> Result<()> {
        let waiter = HealthWaiter::new(
            &self.rc,
            &self.compose,
            self.session.port,
            self.health_ceiling,
        );
        match waiter.wait().await? {
            HealthVerdict::Healthy => Ok(()),
            HealthVerdict::MainServiceFailed(code) => {
                let excerpt = self
                    .compose
                    .recent_logs(crate::compose::MAIN_SERVICE, 20)
                    .await
                    .unwrap_or_default();
                for line in excerpt.lines().rev().take(5).collect::<Vec<_>>().iter().rev() {
                    eprintln!("  {line}");
                }
                bail!(
                    "The server exited with code {code}. Run 'docker compose logs server' in {} for the full log.",
                    self.session.install_dir.display()
                )
            }
            HealthVerdict::TimedOut => {
                ui::print_warning(
                    &self.rc,
                    "The stack is still coming up - it may still be indexing. Check progress with 'docker compose logs -f' in the install directory.",
                );
                Ok(())
            }
        }
    }

    fn print_summary(&self) {
        let rc = &self.rc;
        println!();
        ui::print_section(rc, "RepoLens is ready");
        ui::print_kv("Server", &self.session.server_url());
        ui::print_kv(
            "Install directory",
            &self.session.install_dir.display().to_string(),
        );
        ui::print_kv("Platform", &self.session.platform.to_string());
        if let Some(provider) = &self.session.provider {
            ui::print_kv("Embeddings", &provider.to_string());
        }
        println!();
    }

    /// Foreground log tail; Ctrl-C here is the normal way to leave.
    async fn offer_log_tail(&self) -> Result<()> {
        if prompt::confirm("Follow the service logs now? (Ctrl-C to stop)", false)? {
            self.compose.tail_logs().await?;
        }
        Ok(())
    }
}

/// Build a fresh session for the given install directory.
#[must_use]
pub fn new_session(install_dir: std::path::PathBuf) -> InstallSession {
    let (platform, arch) = platform::detect();
    InstallSession::new(install_dir, platform, arch)
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let resp = client.get(url).send().await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}
