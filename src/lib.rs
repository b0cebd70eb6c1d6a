//! Guacamole installer library
//!
//! Probes a Debian/Ubuntu host, collects the installation configuration,
//! fetches and fills the step scripts, runs them in order and finishes the
//! install (backup schedule, cleanup, reminders).

pub mod cli;
pub mod collector;
pub mod config;
pub mod config_file;
pub mod console;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod finalizer;
pub mod installer;
pub mod logging;
pub mod preflight;
pub mod probe;
pub mod process_guard;
pub mod prompt;
pub mod propagate;
pub mod script_manifest;
pub mod script_runner;
pub mod types;
pub mod workarounds;

// Re-export main types for convenience
pub use collector::{Collector, RetryPolicy};
pub use config::InstallConfig;
pub use config_file::PresetConfig;
pub use error::{InstallerError, Result};
pub use executor::{PipelinePlan, Step, StepRunner};
pub use fetcher::{DirSource, HttpSource, ScriptSource};
pub use finalizer::{BuildDepsCleaner, CrontabStore};
pub use installer::{Collaborators, InstallOptions, InstallReport, Installer};
pub use preflight::Identity;
pub use probe::HostFacts;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use prompt::{Prompter, ScriptedPrompter, TerminalPrompter};
pub use script_manifest::{
    EnvRequirement, ManifestError, ManifestRegistry, OptionalEnv, ScriptManifest, ScriptRole,
    ValidatedExecution,
};
pub use script_runner::{Elevation, ScriptOutput, run_script_safe};
pub use types::{DistroId, Extension, TlsMode};
