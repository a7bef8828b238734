//! Host platform and CPU architecture detection.
//!
//! Detection reads system identification only; no network, no writes. The
//! classification core is a pure function so it can be tested on literal
//! kernel/machine strings.

/// Operating system family the installer is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS (Darwin).
    MacOs,
    /// Native Linux.
    Linux,
    /// Linux under Windows Subsystem for Linux 2.
    Wsl2,
    /// Git Bash / MSYS on Windows.
    WindowsGitBash,
    /// Anything we do not recognize.
    Unknown,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
            Self::Wsl2 => "WSL2",
            Self::WindowsGitBash => "Windows (Git Bash)",
            Self::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// 64-bit x86.
    X64,
    /// 64-bit ARM.
    Arm64,
    /// 32-bit ARM. The stack images are not published for this target.
    Armv7,
    /// Anything we do not recognize.
    Unknown,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
            Self::Armv7 => "armv7",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Detect the current platform and architecture.
#[must_use]
pub fn detect() -> (Platform, Arch) {
    classify(std::env::consts::OS, std::env::consts::ARCH, is_wsl())
}

/// Classify platform and architecture from system identification strings.
///
/// `os` and `arch` take the values of [`std::env::consts::OS`] and
/// [`std::env::consts::ARCH`]; `wsl_marker` is whether the WSL kernel
/// signature was found. Unrecognized values map to `Unknown`, never errors.
#[must_use]
pub fn classify(os: &str, arch: &str, wsl_marker: bool) -> (Platform, Arch) {
    let platform = match os {
        "macos" => Platform::MacOs,
        "linux" => {
            if wsl_marker {
                Platform::Wsl2
            } else {
                Platform::Linux
            }
        }
        // A Windows build of this binary is only ever run from Git Bash.
        "windows" => Platform::WindowsGitBash,
        _ => Platform::Unknown,
    };

    let arch = match arch {
        "x86_64" => Arch::X64,
        "aarch64" => Arch::Arm64,
        "arm" => Arch::Armv7,
        _ => Arch::Unknown,
    };

    (platform, arch)
}

/// Check for the WSL kernel marker.
fn is_wsl() -> bool {
    std::fs::read_to_string("/proc/version")
        .map(|v| v.to_lowercase().contains("microsoft"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_macos() {
        assert_eq!(
            classify("macos", "aarch64", false),
            (Platform::MacOs, Arch::Arm64)
        );
        assert_eq!(
            classify("macos", "x86_64", false),
            (Platform::MacOs, Arch::X64)
        );
    }

    #[test]
    fn test_classify_linux_and_wsl() {
        assert_eq!(
            classify("linux", "x86_64", false),
            (Platform::Linux, Arch::X64)
        );
        assert_eq!(
            classify("linux", "x86_64", true),
            (Platform::Wsl2, Arch::X64)
        );
    }

    #[test]
    fn test_classify_windows() {
        assert_eq!(
            classify("windows", "x86_64", false),
            (Platform::WindowsGitBash, Arch::X64)
        );
    }

    #[test]
    fn test_classify_unknown_maps_not_fails() {
        let (platform, arch) = classify("haiku", "sparc64", false);
        assert_eq!(platform, Platform::Unknown);
        assert_eq!(arch, Arch::Unknown);
    }

    #[test]
    fn test_classify_armv7() {
        let (_, arch) = classify("linux", "arm", false);
        assert_eq!(arch, Arch::Armv7);
    }
}
