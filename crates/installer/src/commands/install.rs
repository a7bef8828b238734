use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::orchestrator::{self, Installer};
use crate::ui::RenderConfig;

/// Install the RepoLens stack
#[derive(Args)]
pub struct InstallCommand {
    /// Install directory (defaults to ~/.repolens)
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Give up waiting for the stack after this many minutes.
    /// Without it the installer waits as long as indexing takes.
    #[arg(long, value_name = "MINUTES")]
    health_timeout: Option<u64>,
}

impl InstallCommand {
    pub async fn run(&self) -> Result<()> {
        let rc = RenderConfig::detect();
        let install_dir = super::resolve_install_dir(self.dir.clone())?;
        let ceiling = self.health_timeout.map(|m| Duration::from_secs(m * 60));

        let session = orchestrator::new_session(install_dir);
        let mut installer = Installer::new(rc, session, ceiling);
        installer.run().await
    }
}
