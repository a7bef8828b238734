//! UI helpers for the installer CLI.
//!
//! Provides consistent formatting for console output during installation.
//! Glyph and color choices are made once at startup and carried in an
//! immutable [`RenderConfig`] that every rendering call receives.

use std::io::Write;

use colored::Colorize;

/// Rendering capabilities, computed once from the environment.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Whether the locale advertises UTF-8 (extended glyphs are safe).
    pub unicode: bool,
    /// Whether color output is enabled.
    pub color: bool,
    /// Advisory terminal width.
    pub width: usize,
}

impl RenderConfig {
    /// Probe locale and terminal environment variables.
    ///
    /// `NO_COLOR` and `TERM=dumb` disable color; a locale without a UTF-8
    /// codeset falls back to ASCII markers. Both are advisory only.
    #[must_use]
    pub fn detect() -> Self {
        let locale = std::env::var("LC_ALL")
            .or_else(|_| std::env::var("LC_CTYPE"))
            .or_else(|_| std::env::var("LANG"))
            .unwrap_or_default()
            .to_lowercase();
        let unicode = locale.contains("utf-8") || locale.contains("utf8");

        let term = std::env::var("TERM").unwrap_or_default();
        let color = std::env::var_os("NO_COLOR").is_none() && term != "dumb" && !term.is_empty();
        if !color {
            colored::control::set_override(false);
        }

        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(80);

        Self {
            unicode,
            color,
            width,
        }
    }

    /// Plain-ASCII configuration, used by tests and dumb terminals.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            unicode: false,
            color: false,
            width: 80,
        }
    }

    pub(crate) fn check(&self) -> &'static str {
        if self.unicode {
            "✓"
        } else {
            "ok"
        }
    }

    pub(crate) fn cross(&self) -> &'static str {
        if self.unicode {
            "✗"
        } else {
            "x"
        }
    }

    pub(crate) fn warn_mark(&self) -> &'static str {
        if self.unicode {
            "⚠"
        } else {
            "!"
        }
    }

    pub(crate) fn info_mark(&self) -> &'static str {
        if self.unicode {
            "ℹ"
        } else {
            "i"
        }
    }

    pub(crate) fn arrow(&self) -> &'static str {
        if self.unicode {
            "▶"
        } else {
            ">"
        }
    }

    pub(crate) fn rule(&self) -> &'static str {
        if self.unicode {
            "═"
        } else {
            "="
        }
    }

    /// Tick characters for indicatif spinners (last char is the rest frame).
    pub(crate) fn spinner_ticks(&self) -> &'static str {
        if self.unicode {
            "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "
        } else {
            "|/-\\ "
        }
    }
}

/// Outcome of one prerequisite check, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Print the RepoLens banner.
pub fn print_banner() {
    println!();
    println!(
        "{}",
        r"
  ____                  _
 |  _ \ ___ _ __   ___ | |    ___ _ __  ___
 | |_) / _ \ '_ \ / _ \| |   / _ \ '_ \/ __|
 |  _ <  __/ |_) | (_) | |__|  __/ | | \__ \
 |_| \_\___| .__/ \___/|_____\___|_| |_|___/
           |_|
"
        .cyan()
    );
    println!("  {}", "Self-hosted code intelligence".bright_black());
    println!();
}

/// Print a section header.
pub fn print_section(rc: &RenderConfig, title: &str) {
    let rule_len = rc.width.clamp(40, 70);
    println!();
    println!("{}", rc.rule().repeat(rule_len).bright_black());
    println!("{}", title.cyan().bold());
    println!("{}", rc.rule().repeat(rule_len).bright_black());
    println!();
}

/// Print a progress step with step number.
pub fn print_progress_step(rc: &RenderConfig, current: u8, total: u8, message: &str) {
    println!(
        "{} {} {}",
        format!("[{current}/{total}]").bright_black(),
        rc.arrow().cyan(),
        message.bold()
    );
}

/// Print a success message.
pub fn print_success(rc: &RenderConfig, message: &str) {
    println!("{} {}", rc.check().green().bold(), message.green());
}

/// Print a warning message. Warnings never halt the sequence.
pub fn print_warning(rc: &RenderConfig, message: &str) {
    println!("{} {}", rc.warn_mark().yellow().bold(), message.yellow());
}

/// Print an error message.
pub fn print_error(rc: &RenderConfig, message: &str) {
    println!("{} {}", rc.cross().red().bold(), message.red());
}

/// Print an info message.
pub fn print_info(rc: &RenderConfig, message: &str) {
    println!("{} {}", rc.info_mark().blue().bold(), message);
}

/// Print a prerequisite check result.
pub fn print_check_result(rc: &RenderConfig, name: &str, status: CheckStatus, message: Option<&str>) {
    let mark = match status {
        CheckStatus::Pass => rc.check().green(),
        CheckStatus::Warn => rc.warn_mark().yellow(),
        CheckStatus::Fail => rc.cross().red(),
    };

    let text = if let Some(msg) = message {
        format!("{name} - {msg}")
    } else {
        name.to_string()
    };

    println!("  {mark} {text}");
}

/// Print a key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("  {} {}", format!("{key}:").bright_black(), value.green());
}

/// Print a numbered step.
pub fn print_numbered_step(num: usize, message: &str) {
    println!("  {}. {}", num.to_string().cyan(), message);
}

/// Hide the terminal cursor.
pub fn hide_cursor() {
    print!("\x1b[?25l");
    let _ = std::io::stdout().flush();
}

/// Show the terminal cursor. Safe to call more than once.
pub fn show_cursor() {
    print!("\x1b[?25h");
    let _ = std::io::stdout().flush();
}

/// Move the cursor up `n` lines, clearing each one.
///
/// The caller must pass exactly the number of lines it last drew; a
/// mismatch corrupts the panel.
pub fn erase_lines(n: usize) {
    for _ in 0..n {
        print!("\x1b[1A\x1b[2K");
    }
    print!("\r");
    let _ = std::io::stdout().flush();
}

/// Hides the cursor for a scope and restores it on drop, on every exit path.
pub struct CursorGuard(());

impl CursorGuard {
    #[must_use]
    pub fn hide() -> Self {
        hide_cursor();
        Self(())
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        show_cursor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_config_uses_ascii() {
        let rc = RenderConfig::plain();
        assert_eq!(rc.check(), "ok");
        assert_eq!(rc.cross(), "x");
        assert_eq!(rc.spinner_ticks(), "|/-\\ ");
    }

    #[test]
    fn test_unicode_config_uses_glyphs() {
        let rc = RenderConfig {
            unicode: true,
            color: true,
            width: 80,
        };
        assert_eq!(rc.check(), "✓");
        assert_eq!(rc.arrow(), "▶");
    }
}
