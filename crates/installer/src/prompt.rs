//! Interactive prompts, including masked secret entry.
//!
//! The installer is commonly launched with its own standard input consumed
//! (`curl ... | sh` style wrappers), so interactive reads resolve a source
//! in order: stdin when it is a terminal, otherwise the controlling
//! terminal device, otherwise a hard error telling the operator how to
//! re-run - never a silent hang.
//!
//! Secret entry uses a non-canonical, no-echo read because some valid
//! credentials exceed the tty line-discipline buffer (about 4 KiB) that a
//! canonical-mode read is limited to. The prior terminal mode is restored
//! by an RAII guard on every path, including errors.

use std::io::{Read, Write};

use anyhow::{bail, Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

use crate::ui::{self, RenderConfig};

/// Visible prefix length of a masked secret preview.
pub const PREVIEW_LEN: usize = 10;

/// Marker appended to a truncated preview.
pub const MASK_MARKER: &str = "...";

/// How many times an empty required secret is re-prompted before failing.
const MAX_SECRET_ATTEMPTS: u32 = 3;

/// Masked preview of a secret: the first [`PREVIEW_LEN`] characters plus
/// [`MASK_MARKER`] for longer values, the value verbatim otherwise.
#[must_use]
pub fn masked_preview(value: &str) -> String {
    let mut chars = value.char_indices();
    match chars.nth(PREVIEW_LEN) {
        Some((byte_idx, _)) => format!("{}{MASK_MARKER}", &value[..byte_idx]),
        None => value.to_string(),
    }
}

/// Strip the trailing carriage-return artifact some clipboards paste.
#[must_use]
pub fn strip_paste_artifacts(value: &str) -> &str {
    value.trim_end_matches(['\r', '\n'])
}

/// Parse an operator-supplied alternate port.
///
/// Empty input means "keep the current port" and returns `None`. Anything
/// else must be numeric and within the registered/dynamic range.
///
/// # Errors
///
/// Returns a specific corrective error for non-numeric or out-of-range
/// input.
pub fn validate_port(input: &str) -> Result<Option<u16>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let port: u32 = trimmed
        .parse()
        .with_context(|| format!("'{trimmed}' is not a valid port number"))?;

    if !(1024..=65535).contains(&port) {
        bail!("Port {port} is out of range: choose a port between 1024 and 65535");
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(Some(port as u16))
}

/// Input source for interactive reads.
enum Source {
    /// Standard input is a terminal.
    Stdin,
    /// The controlling terminal device, opened independently of stdin.
    #[cfg(unix)]
    Tty(std::fs::File),
}

/// A reader bound to whatever terminal the operator actually has.
pub struct TtyReader {
    source: Source,
}

impl TtyReader {
    /// Resolve an interactive input source.
    ///
    /// # Errors
    ///
    /// Returns an error when neither stdin nor the controlling terminal is
    /// usable, with instructions to re-run the installer directly.
    pub fn open() -> Result<Self> {
        if stdin_is_tty() {
            return Ok(Self {
                source: Source::Stdin,
            });
        }

        #[cfg(unix)]
        {
            if let Ok(file) = std::fs::File::options()
                .read(true)
                .write(true)
                .open("/dev/tty")
            {
                return Ok(Self {
                    source: Source::Tty(file),
                });
            }
        }

        bail!(
            "No terminal available for interactive input. \
             Run the installer directly from a terminal (not through a pipe \
             or with stdin redirected) and try again."
        )
    }

    /// Read a line of visible input.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal read fails.
    pub fn read_line(&mut self, prompt: &str) -> Result<String> {
        eprint!("{prompt}");
        let _ = std::io::stderr().flush();

        let mut buf = Vec::new();
        loop {
            let mut byte = [0_u8; 1];
            let n = self.read_byte(&mut byte)?;
            if n == 0 || byte[0] == b'\n' {
                break;
            }
            buf.push(byte[0]);
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        Ok(strip_paste_artifacts(&line).to_string())
    }

    /// Read a secret with echo and line buffering disabled.
    ///
    /// Backspace edits, Ctrl-U clears, Enter finishes. Nothing is echoed;
    /// the terminal mode is restored even if the read fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be switched to raw mode, if
    /// the read fails, or on Ctrl-C.
    #[cfg(unix)]
    pub fn read_secret(&mut self, prompt: &str) -> Result<String> {
        eprint!("{prompt}");
        let _ = std::io::stderr().flush();

        let result = {
            let _guard = RawModeGuard::enter(self.fd())?;
            self.read_secret_bytes()
        };
        // Newline after the unechoed entry, whatever happened.
        eprintln!();

        let raw = result?;
        let value = String::from_utf8_lossy(&raw).into_owned();
        Ok(strip_paste_artifacts(&value).to_string())
    }

    /// Fallback for platforms without termios: echo-off via dialoguer.
    #[cfg(not(unix))]
    pub fn read_secret(&mut self, prompt: &str) -> Result<String> {
        let value = dialoguer::Password::new()
            .with_prompt(prompt.trim_end_matches([' ', ':']))
            .allow_empty_password(true)
            .interact()
            .context("Failed to read secret from terminal")?;
        Ok(strip_paste_artifacts(&value).to_string())
    }

    #[cfg(unix)]
    fn read_secret_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let mut byte = [0_u8; 1];
            let n = self.read_byte(&mut byte)?;
            if n == 0 {
                // EOF without a newline still yields what was pasted.
                break;
            }
            match byte[0] {
                b'\n' | b'\r' => break,
                // Backspace / delete
                0x08 | 0x7f => {
                    buf.pop();
                }
                // Ctrl-U clears the pending entry
                0x15 => buf.clear(),
                // Ctrl-C aborts
                0x03 => bail!("Secret entry interrupted"),
                // Ctrl-D on an empty entry is EOF
                0x04 if buf.is_empty() => break,
                b => buf.push(b),
            }
        }
        Ok(buf)
    }

    fn read_byte(&mut self, byte: &mut [u8; 1]) -> Result<usize> {
        let n = match &mut self.source {
            Source::Stdin => std::io::stdin().lock().read(byte),
            #[cfg(unix)]
            Source::Tty(file) => file.read(byte),
        }
        .context("Failed to read from terminal")?;
        Ok(n)
    }

    #[cfg(unix)]
    fn fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        match &self.source {
            Source::Stdin => libc::STDIN_FILENO,
            Source::Tty(file) => file.as_raw_fd(),
        }
    }
}

#[cfg(unix)]
fn stdin_is_tty() -> bool {
    // SAFETY: isatty on a constant fd has no preconditions.
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

#[cfg(not(unix))]
fn stdin_is_tty() -> bool {
    true
}

/// Restores the saved terminal mode on drop, on every exit path.
#[cfg(unix)]
struct RawModeGuard {
    fd: std::os::unix::io::RawFd,
    saved: libc::termios,
}

#[cfg(unix)]
impl RawModeGuard {
    fn enter(fd: std::os::unix::io::RawFd) -> Result<Self> {
        // SAFETY: termios is plain-old-data; tcgetattr fills it or fails.
        let saved = unsafe {
            let mut term = std::mem::zeroed::<libc::termios>();
            if libc::tcgetattr(fd, &mut term) != 0 {
                bail!("Failed to query terminal attributes");
            }
            term
        };

        // ISIG off as well: Ctrl-C arrives as a byte the read loop handles,
        // so the mode is restored through this guard, not a signal handler.
        let mut raw = saved;
        raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::ISIG);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;

        // SAFETY: raw is a valid termios derived from the saved state.
        if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, &raw) } != 0 {
            bail!("Failed to disable terminal echo");
        }

        Ok(Self { fd, saved })
    }
}

#[cfg(unix)]
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        // SAFETY: restoring the attributes we saved at entry.
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.saved);
        }
    }
}

/// Prompt for a required secret, re-prompting on empty input.
///
/// After capture, a masked preview and the character count are shown so the
/// operator can sanity-check a long paste. The raw value is never printed.
///
/// # Errors
///
/// Returns an error after [`MAX_SECRET_ATTEMPTS`] empty entries, or if the
/// terminal read fails.
pub fn prompt_secret_required(
    rc: &RenderConfig,
    reader: &mut TtyReader,
    label: &str,
    hint: &str,
) -> Result<String> {
    for _ in 0..MAX_SECRET_ATTEMPTS {
        let value = reader.read_secret(&format!("{label}: "))?;
        if value.is_empty() {
            ui::print_warning(rc, &format!("{label} cannot be empty. {hint}"));
            continue;
        }
        ui::print_info(
            rc,
            &format!(
                "Captured {} ({} characters)",
                masked_preview(&value),
                value.chars().count()
            ),
        );
        return Ok(value);
    }
    bail!("{label} was empty {MAX_SECRET_ATTEMPTS} times. {hint}")
}

/// Single-choice select with the shared theme.
///
/// # Errors
///
/// Returns an error if no terminal is attached.
pub fn select(prompt: &str, items: &[&str]) -> Result<usize> {
    Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(0)
        .items(items)
        .interact()
        .context("Failed to read selection from terminal")
}

/// Yes/no confirmation with the shared theme.
///
/// # Errors
///
/// Returns an error if no terminal is attached.
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("Failed to read confirmation from terminal")
}

/// Visible text input where an empty answer is meaningful.
///
/// # Errors
///
/// Returns an error if no terminal is attached.
pub fn input_optional(prompt: &str) -> Result<String> {
    Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()
        .context("Failed to read input from terminal")
}

/// Visible text input with a default value.
///
/// # Errors
///
/// Returns an error if no terminal is attached.
pub fn input_with_default(prompt: &str, default: &str) -> Result<String> {
    Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
        .context("Failed to read input from terminal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_preview_truncates_long_values() {
        let value = "sk-abcdefghijklmnopqrstuvwxyz";
        let preview = masked_preview(value);
        assert_eq!(preview, format!("{}{MASK_MARKER}", &value[..PREVIEW_LEN]));
        assert!(!preview.contains("klmnop"));
    }

    #[test]
    fn test_masked_preview_short_values_verbatim() {
        assert_eq!(masked_preview("short"), "short");
        assert_eq!(masked_preview(""), "");
        // Exactly PREVIEW_LEN chars: still verbatim, no marker.
        let exact = "a".repeat(PREVIEW_LEN);
        assert_eq!(masked_preview(&exact), exact);
    }

    #[test]
    fn test_masked_preview_multibyte_boundary() {
        let value = "ééééééééééééééé";
        let preview = masked_preview(value);
        assert!(preview.ends_with(MASK_MARKER));
        assert_eq!(
            preview.trim_end_matches(MASK_MARKER).chars().count(),
            PREVIEW_LEN
        );
    }

    #[test]
    fn test_strip_paste_artifacts() {
        assert_eq!(strip_paste_artifacts("token\r"), "token");
        assert_eq!(strip_paste_artifacts("token\r\n"), "token");
        assert_eq!(strip_paste_artifacts("token"), "token");
    }

    #[test]
    fn test_validate_port_empty_keeps_original() {
        assert_eq!(validate_port("").unwrap(), None);
        assert_eq!(validate_port("   ").unwrap(), None);
    }

    #[test]
    fn test_validate_port_accepts_registered_range() {
        assert_eq!(validate_port("9090").unwrap(), Some(9090));
        assert_eq!(validate_port("1024").unwrap(), Some(1024));
        assert_eq!(validate_port("65535").unwrap(), Some(65535));
    }

    #[test]
    fn test_validate_port_rejects_out_of_range() {
        assert!(validate_port("80").is_err());
        assert!(validate_port("70000").is_err());
        assert!(validate_port("0").is_err());
    }

    #[test]
    fn test_validate_port_rejects_non_numeric() {
        assert!(validate_port("eighty").is_err());
        assert!(validate_port("90.90").is_err());
    }
}
