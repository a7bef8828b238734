//! RepoLens Installer Library.
//!
//! Programmatic access to the RepoLens installer: platform detection,
//! prerequisite checks, interactive configuration, and container stack
//! orchestration. The `repolens` binary is a thin clap wrapper over these
//! modules.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

pub mod commands;
pub mod compose;
pub mod envfile;
pub mod health;
pub mod orchestrator;
pub mod platform;
pub mod prereqs;
pub mod prompt;
pub mod runner;
pub mod session;
pub mod ui;
pub mod version;

// Re-export commonly used types at the crate root
pub use orchestrator::Installer;
pub use platform::{Arch, Platform};
pub use session::{InstallPhase, InstallSession, Provider};
