use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::collector::RetryPolicy;
use crate::fetcher::DEFAULT_SCRIPT_SOURCE;
use crate::types::Extension;

/// Log file name inside the work directory
pub const LOG_FILE_NAME: &str = "guacamole_setup.log";

/// guac-install - Apache Guacamole installer for Debian and Ubuntu hosts
#[derive(Parser, Debug)]
#[command(name = "guac-install")]
#[command(about = "Install Apache Guacamole with MySQL, Nginx and TLS on Debian/Ubuntu")]
#[command(version)]
pub struct Cli {
    /// Directory scripts are downloaded to and run from [default: $HOME/guac-setup]
    #[arg(long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Base URL or local directory the setup scripts are fetched from.
    /// Defaults to the main branch of github.com/itiligent/Guacamole-Install;
    /// pin a tag or mirror with this flag.
    #[arg(long, global = true, default_value = DEFAULT_SCRIPT_SOURCE)]
    pub source: String,

    /// Install log file [default: <work-dir>/guacamole_setup.log]
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Give up after this many invalid answers to one question
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Dry-run mode: collect, fetch and propagate, but run no step and
    /// leave the crontab and packages alone.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the installer (the default)
    Install {
        /// Preset file with answers that skip their prompts
        #[arg(short, long)]
        preset: Option<PathBuf>,

        /// Write the resolved answers (without passwords) to this file
        #[arg(long)]
        save_preset: Option<PathBuf>,
    },
    /// Validate a preset file
    Validate {
        /// Path to the preset file
        preset: PathBuf,
    },
    /// Add an extension to an existing installation
    Extension {
        /// totp, duo, ldap, quickconnect or history-recording
        name: Extension,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Work directory, falling back to `$HOME/guac-setup`
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("guac-setup")
        })
    }

    /// Log file, falling back to the work directory
    pub fn resolved_log_file(&self, work_dir: &Path) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| work_dir.join(LOG_FILE_NAME))
    }

    /// Whether the command touches the host (and so needs a valid operator)
    pub fn checks_host(&self) -> bool {
        !matches!(self.command, Some(Commands::Validate { .. }))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.max_attempts {
            Some(n) => RetryPolicy::Bounded(n),
            None => RetryPolicy::Unbounded,
        }
    }
}
