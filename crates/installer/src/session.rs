//! In-memory state for one installer run.
//!
//! The session lives for exactly one invocation and is never persisted;
//! only the generated `.env` file survives, which is what drives the
//! update-vs-reinstall branch on the next run.

use std::path::PathBuf;

use tracing::info;

use crate::platform::{Arch, Platform};

/// Default port the server is published on.
pub const DEFAULT_PORT: u16 = 8080;

/// Where the orchestrator currently is. Transitions are strictly forward,
/// except `Failed`, which is reachable from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    NotStarted,
    CheckingPrerequisites,
    Downloading,
    Configuring,
    AuthenticatingRegistry,
    StartingServices,
    WaitingForHealth,
    Complete,
    Failed,
}

impl InstallPhase {
    /// The next phase in the sequence. Terminal phases stay put.
    #[must_use]
    pub fn next(&self) -> Self {
        match self {
            Self::NotStarted => Self::CheckingPrerequisites,
            Self::CheckingPrerequisites => Self::Downloading,
            Self::Downloading => Self::Configuring,
            Self::Configuring => Self::AuthenticatingRegistry,
            Self::AuthenticatingRegistry => Self::StartingServices,
            Self::StartingServices => Self::WaitingForHealth,
            Self::WaitingForHealth | Self::Complete => Self::Complete,
            Self::Failed => Self::Failed,
        }
    }

    /// Human-readable description of the phase.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::CheckingPrerequisites => "Checking prerequisites",
            Self::Downloading => "Downloading stack definition",
            Self::Configuring => "Configuring",
            Self::AuthenticatingRegistry => "Authenticating with registry",
            Self::StartingServices => "Starting services",
            Self::WaitingForHealth => "Waiting for the stack to become healthy",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Step number for progress display only; never used for control flow.
    #[must_use]
    pub fn step_number(&self) -> u8 {
        match self {
            Self::NotStarted | Self::Failed => 0,
            Self::CheckingPrerequisites => 1,
            Self::Downloading => 2,
            Self::Configuring => 3,
            Self::AuthenticatingRegistry => 4,
            Self::StartingServices => 5,
            Self::WaitingForHealth => 6,
            Self::Complete => 7,
        }
    }

    /// Total number of displayed steps.
    pub const TOTAL_STEPS: u8 = 7;

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Credential shapes for the Bedrock embedding provider.
#[derive(Debug, Clone)]
pub enum BedrockCredentials {
    /// A single long-lived opaque bearer token.
    BearerToken(String),
    /// Short-term session triple.
    Session {
        access_key_id: String,
        secret_access_key: String,
        session_token: String,
    },
}

/// Embedding provider plus its credential material.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi {
        api_key: String,
    },
    Bedrock {
        region: String,
        credentials: BedrockCredentials,
    },
}

impl Provider {
    /// Value written to the `EMBEDDINGS_PROVIDER` key.
    #[must_use]
    pub fn env_value(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "openai",
            Self::Bedrock { .. } => "bedrock",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi { .. } => write!(f, "OpenAI"),
            Self::Bedrock { .. } => write!(f, "AWS Bedrock"),
        }
    }
}

/// Root mutable state for one run.
#[derive(Debug)]
pub struct InstallSession {
    /// Absolute install directory, fixed at start.
    pub install_dir: PathBuf,
    /// Set once by platform detection, immutable after.
    pub platform: Platform,
    /// Set once by platform detection, immutable after.
    pub arch: Arch,
    /// Published server port. Mutable only during port negotiation; frozen
    /// once the stack starts.
    pub port: u16,
    /// Chosen embedding provider, set during the configure step.
    pub provider: Option<Provider>,
    /// Current orchestrator phase.
    pub phase: InstallPhase,
}

impl InstallSession {
    #[must_use]
    pub fn new(install_dir: PathBuf, platform: Platform, arch: Arch) -> Self {
        Self {
            install_dir,
            platform,
            arch,
            port: DEFAULT_PORT,
            provider: None,
            phase: InstallPhase::NotStarted,
        }
    }

    /// Advance to the next phase.
    pub fn advance(&mut self) {
        let next = self.phase.next();
        info!("Phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Mark the run failed. Valid from any non-terminal phase.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            info!("Phase: {} -> {}", self.phase, InstallPhase::Failed);
            self.phase = InstallPhase::Failed;
        }
    }

    /// The URL the server is advertised on.
    #[must_use]
    pub fn server_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Path of the generated env file.
    #[must_use]
    pub fn env_file(&self) -> PathBuf {
        self.install_dir.join(".env")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_progression_reaches_complete() {
        let mut phase = InstallPhase::NotStarted;
        let mut hops = 0;
        while phase != InstallPhase::Complete {
            phase = phase.next();
            hops += 1;
            assert!(hops <= 10, "phase sequence does not terminate");
        }
        assert_eq!(InstallPhase::Complete.next(), InstallPhase::Complete);
    }

    #[test]
    fn test_phase_numbers_are_monotonic() {
        let mut phase = InstallPhase::NotStarted;
        let mut last = phase.step_number();
        while phase != InstallPhase::Complete {
            phase = phase.next();
            assert!(phase.step_number() > last || phase == InstallPhase::Complete);
            last = phase.step_number();
        }
        assert_eq!(
            InstallPhase::Complete.step_number(),
            InstallPhase::TOTAL_STEPS
        );
    }

    #[test]
    fn test_failed_reachable_from_any_phase_and_sticky() {
        let mut session = InstallSession::new(
            PathBuf::from("/tmp/repolens"),
            Platform::Linux,
            Arch::X64,
        );
        session.advance();
        session.advance();
        session.fail();
        assert_eq!(session.phase, InstallPhase::Failed);
        // Failed is terminal.
        session.advance();
        assert_eq!(session.phase, InstallPhase::Failed);
    }

    #[test]
    fn test_server_url_reflects_port() {
        let mut session = InstallSession::new(
            PathBuf::from("/tmp/repolens"),
            Platform::MacOs,
            Arch::Arm64,
        );
        assert_eq!(session.server_url(), "http://localhost:8080");
        session.port = 9090;
        assert_eq!(session.server_url(), "http://localhost:9090");
    }

    #[test]
    fn test_provider_env_values() {
        let openai = Provider::OpenAi {
            api_key: "sk-test".into(),
        };
        assert_eq!(openai.env_value(), "openai");

        let bedrock = Provider::Bedrock {
            region: "us-east-1".into(),
            credentials: BedrockCredentials::BearerToken("t".into()),
        };
        assert_eq!(bedrock.env_value(), "bedrock");
    }
}
