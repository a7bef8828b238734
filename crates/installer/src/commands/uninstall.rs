use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::compose::ComposeClient;
use crate::prompt;
use crate::ui::{self, RenderConfig};

/// Remove the RepoLens stack and its data
#[derive(Args)]
pub struct UninstallCommand {
    /// Install directory (defaults to ~/.repolens)
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,
}

impl UninstallCommand {
    pub async fn run(&self) -> Result<()> {
        let rc = RenderConfig::detect();
        let install_dir = super::resolve_install_dir(self.dir.clone())?;

        if !install_dir.exists() {
            ui::print_info(
                &rc,
                &format!("Nothing to remove: {} does not exist", install_dir.display()),
            );
            return Ok(());
        }

        ui::print_warning(
            &rc,
            "This removes all containers, volumes and indexed data. It cannot be undone.",
        );
        if !prompt::confirm("Remove RepoLens completely?", false)? {
            ui::print_info(&rc, "Nothing changed.");
            return Ok(());
        }

        let compose = ComposeClient::new(install_dir.clone());
        compose.down(&rc).await.context(
            "Could not remove the stack. Run 'docker compose down -v' in the install directory.",
        )?;
        std::fs::remove_dir_all(&install_dir).with_context(|| {
            format!(
                "Containers are gone but {} could not be removed. Delete it manually.",
                install_dir.display()
            )
        })?;

        ui::print_success(&rc, "RepoLens has been removed");
        Ok(())
    }
}
