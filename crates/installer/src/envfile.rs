//! Idempotent writes to the generated `.env` configuration file.
//!
//! The file is line-oriented `KEY=VALUE`. A write must leave exactly one
//! active line for the key while preserving every unrelated line verbatim.
//! Values are opaque byte strings: no escaping, no interpolation, any
//! length. The rewrite goes through a temp file in the same directory and a
//! rename so an interrupt cannot leave a half-written file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Set `key` to `value` in the env file at `path`, creating the file if
/// needed.
///
/// Cases, checked in order:
/// 1. an active `KEY=...` line exists - its value is replaced in place;
/// 2. a commented `# KEY=...` line exists - it is uncommented and set;
/// 3. neither - a new `KEY=VALUE` line is appended.
///
/// Calling this repeatedly with the same key/value converges to the same
/// file contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read or atomically replaced.
pub fn set_env_var(path: &Path, key: &str, value: &str) -> Result<()> {
    let original = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let new_line = format!("{key}={value}");
    let mut lines: Vec<String> = Vec::new();
    let mut written = false;

    for line in original.lines() {
        if is_active_line(line, key) {
            if written {
                // Stray duplicate from an earlier manual edit; collapse it.
                continue;
            }
            lines.push(new_line.clone());
            written = true;
        } else {
            lines.push(line.to_string());
        }
    }

    if !written {
        // Look for a commented-out form to uncomment in place.
        for line in &mut lines {
            if is_commented_line(line, key) {
                *line = new_line.clone();
                written = true;
                break;
            }
        }
    }

    if !written {
        lines.push(new_line);
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    write_atomic(path, &contents)
}

/// Current active value of `key`, if the file has one.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn get_env_var(path: &Path, key: &str) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(contents
        .lines()
        .find(|line| is_active_line(line, key))
        .and_then(|line| line.split_once('='))
        .map(|(_, value)| value.to_string()))
}

/// `KEY=...` with nothing before the key.
fn is_active_line(line: &str, key: &str) -> bool {
    line.strip_prefix(key)
        .is_some_and(|rest| rest.starts_with('='))
}

/// `# KEY=...` (with or without space after the `#`).
fn is_commented_line(line: &str, key: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix('#') else {
        return false;
    };
    is_active_line(rest.trim_start(), key)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => NamedTempFile::new_in(dir),
        None => NamedTempFile::new(),
    }
    .context("Failed to create temporary env file")?;

    tmp.write_all(contents.as_bytes())
        .context("Failed to write temporary env file")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_append_when_key_absent() {
        let (_dir, path) = write_fixture("OTHER=1\n");
        set_env_var(&path, "K", "v").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "OTHER=1\nK=v\n");
    }

    #[test]
    fn test_replace_active_line_in_place() {
        let (_dir, path) = write_fixture("A=first\nK=old\nB=last\n");
        set_env_var(&path, "K", "new").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "A=first\nK=new\nB=last\n"
        );
    }

    #[test]
    fn test_uncomment_commented_key() {
        let (_dir, path) = write_fixture("# K=old\nOTHER=1\n");
        set_env_var(&path, "K", "v").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "K=v\nOTHER=1\n");
        assert!(!contents.contains("# K"));
    }

    #[test]
    fn test_idempotent() {
        let (_dir, path) = write_fixture("A=1\n");
        set_env_var(&path, "K", "v").unwrap();
        let once = std::fs::read_to_string(&path).unwrap();
        set_env_var(&path, "K", "v").unwrap();
        let twice = std::fs::read_to_string(&path).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_preserves_unrelated_lines_and_order() {
        let (_dir, path) = write_fixture("# header comment\n\nA=1\nK=old\nB=2\n");
        set_env_var(&path, "K", "new").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# header comment\n\nA=1\nK=new\nB=2\n"
        );
    }

    #[test]
    fn test_value_is_opaque() {
        let (_dir, path) = write_fixture("");
        let value = r#"a$b\c*"quoted" #notacomment"#;
        set_env_var(&path, "K", value).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("K={value}\n")
        );
    }

    #[test]
    fn test_very_long_value() {
        let (_dir, path) = write_fixture("A=1\n");
        let value = "x".repeat(8192);
        set_env_var(&path, "TOKEN", &value).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains(&format!("TOKEN={value}")));
        assert!(contents.starts_with("A=1\n"));
    }

    #[test]
    fn test_key_prefix_does_not_match() {
        // KEY2 must not be mistaken for KEY.
        let (_dir, path) = write_fixture("KEY2=other\n");
        set_env_var(&path, "KEY", "v").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "KEY2=other\nKEY=v\n"
        );
    }

    #[test]
    fn test_collapses_stray_duplicates() {
        let (_dir, path) = write_fixture("K=one\nA=1\nK=two\n");
        set_env_var(&path, "K", "final").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "K=final\nA=1\n"
        );
    }

    #[test]
    fn test_get_env_var_reads_active_value_only() {
        let (_dir, path) = write_fixture("# K=commented\nOTHER=1\nK=live\n");
        assert_eq!(get_env_var(&path, "K").unwrap().as_deref(), Some("live"));
        assert_eq!(get_env_var(&path, "MISSING").unwrap(), None);
        assert_eq!(
            get_env_var(Path::new("/nonexistent/.env"), "K").unwrap(),
            None
        );
    }

    #[test]
    fn test_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        set_env_var(&path, "K", "v").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "K=v\n");
    }
}
