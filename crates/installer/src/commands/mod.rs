//! CLI subcommands.

pub mod install;
pub mod uninstall;

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Resolve the install directory: an explicit `--dir`, or `~/.repolens`.
pub(crate) fn resolve_install_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = dir {
        return Ok(dir);
    }
    let home = dirs::home_dir().context(
        "Could not determine your home directory. Pass an install location with --dir.",
    )?;
    Ok(home.join(".repolens"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let dir = resolve_install_dir(Some(PathBuf::from("/opt/repolens"))).unwrap();
        assert_eq!(dir, PathBuf::from("/opt/repolens"));
    }

    #[test]
    fn test_default_dir_is_under_home() {
        let dir = resolve_install_dir(None).unwrap();
        assert!(dir.ends_with(".repolens"));
    }
}
