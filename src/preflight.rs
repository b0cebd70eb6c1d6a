//! Pre-flight checks
//!
//! Verifies the host before any prompt or side effect:
//! - no build artifacts from an earlier run in the work directory
//! - not running as root
//! - `sudo` is installed and the invoking user is in the `sudo` group
//! - the distribution is supported
//!
//! Every failing check is reported together, then the run stops with a
//! precondition error (exit status 1).

use std::path::{Path, PathBuf};
use std::process::Command;

use nix::unistd::{Group, getegid, geteuid, getgroups};

use crate::error::{InstallerError, Result};
use crate::probe::{self, OsInfo};
use crate::workarounds::{self, OsOverrides};

/// Group whose members may use sudo on Debian-family hosts
pub const SUDO_GROUP: &str = "sudo";

/// Who is running the installer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub is_root: bool,
    pub sudo_available: bool,
    pub in_sudo_group: bool,
}

impl Identity {
    /// Probe the current process
    pub fn detect() -> Self {
        Self {
            is_root: geteuid().is_root(),
            sudo_available: binary_exists("sudo"),
            in_sudo_group: in_group(SUDO_GROUP),
        }
    }

    /// A normal sudo-capable user (used by tests and dry runs)
    pub fn sudo_user() -> Self {
        Self {
            is_root: false,
            sudo_available: true,
            in_sudo_group: true,
        }
    }
}

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn in_group(name: &str) -> bool {
    let Ok(Some(group)) = Group::from_name(name) else {
        return false;
    };
    getegid() == group.gid || getgroups().is_ok_and(|groups| groups.contains(&group.gid))
}

/// Outcome of the checks
#[derive(Debug, Default)]
pub struct PreflightReport {
    pub leftovers: Vec<PathBuf>,
    pub failures: Vec<String>,
    pub overrides: Option<OsOverrides>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// Consume the report: overrides on success, one precondition error
    /// listing every failure otherwise.
    pub fn into_result(self) -> Result<OsOverrides> {
        match self.overrides {
            Some(overrides) if self.failures.is_empty() => Ok(overrides),
            _ => Err(InstallerError::precondition(self.failures.join("; "))),
        }
    }
}

/// Run every check in order and collect the failures.
pub fn run_checks(work_dir: &Path, identity: &Identity, os: &OsInfo) -> PreflightReport {
    log::debug!("Running pre-flight checks in {}", work_dir.display());
    let mut report = PreflightReport::default();

    report.leftovers = probe::find_leftovers(work_dir);
    if !report.leftovers.is_empty() {
        let names: Vec<String> = report
            .leftovers
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        report.failures.push(format!(
            "Leftover files from a previous run in {}: {}. Remove them and try again.",
            work_dir.display(),
            names.join(", ")
        ));
    }

    report.failures.extend(identity_failures(identity));

    match workarounds::for_host(os) {
        Ok(overrides) => report.overrides = Some(overrides),
        Err(e) => report.failures.push(match e {
            InstallerError::Precondition(msg) => msg,
            other => other.to_string(),
        }),
    }

    for failure in &report.failures {
        log::error!("Pre-flight: {}", failure);
    }
    if report.is_ok() {
        log::info!("Pre-flight checks passed on {}", os);
    }
    report
}

/// Problems with who is running the installer, in check order
pub fn identity_failures(identity: &Identity) -> Vec<String> {
    let mut failures = Vec::new();

    if identity.is_root {
        failures.push(
            "Do not run this installer as root. Run it as a user with sudo rights.".to_string(),
        );
    }

    if !identity.sudo_available {
        failures.push("sudo is not installed (apt-get install sudo)".to_string());
    } else if !identity.in_sudo_group && !identity.is_root {
        failures.push(format!(
            "The current user is not a member of the '{}' group",
            SUDO_GROUP
        ));
    }

    failures
}

/// Identity checks alone, for commands that run against an existing install
pub fn check_identity(identity: &Identity) -> Result<()> {
    let failures = identity_failures(identity);
    if failures.is_empty() {
        Ok(())
    } else {
        Err(InstallerError::precondition(failures.join("; ")))
    }
}

/// Cache sudo credentials in the foreground.
///
/// Steps later run with `sudo -n` from their own process group, where
/// sudo cannot ask for a password.
pub fn prime_sudo() -> Result<()> {
    let status = Command::new("sudo")
        .arg("-v")
        .status()
        .map_err(|e| InstallerError::precondition(format!("cannot run sudo: {}", e)))?;

    if status.success() {
        Ok(())
    } else {
        Err(InstallerError::precondition("sudo authentication failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn debian() -> OsInfo {
        OsInfo::parse("ID=debian\nVERSION_CODENAME=bookworm\n")
    }

    #[test]
    fn test_clean_host_passes() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_checks(dir.path(), &Identity::sudo_user(), &debian());

        assert!(report.is_ok());
        assert_eq!(
            report.into_result().unwrap().jpegturbo,
            "libjpeg62-turbo-dev"
        );
    }

    #[test]
    fn test_missing_work_dir_is_clean() {
        let report = run_checks(
            Path::new("/nonexistent/guac-setup"),
            &Identity::sudo_user(),
            &debian(),
        );
        assert!(report.is_ok());
    }

    #[test]
    fn test_leftover_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("guacamole-9.9.9")).unwrap();

        let report = run_checks(dir.path(), &Identity::sudo_user(), &debian());
        assert_eq!(report.leftovers.len(), 1);
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, InstallerError::Precondition(_)));
        assert!(err.to_string().contains("guacamole-9.9.9"));
    }

    #[test]
    fn test_all_failures_reported_together() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mysql-connector-j-9.1.0.tar.gz"), b"").unwrap();
        let identity = Identity {
            is_root: true,
            sudo_available: false,
            in_sudo_group: false,
        };

        let report = run_checks(dir.path(), &identity, &OsInfo::parse("ID=fedora\n"));
        assert_eq!(report.failures.len(), 4);
        assert!(report.failures[0].contains("Leftover"));
        assert!(report.failures[1].contains("root"));
        assert!(report.failures[2].contains("sudo"));
        assert!(report.failures[3].contains("fedora"));
    }

    #[test]
    fn test_not_in_sudo_group() {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity {
            in_sudo_group: false,
            ..Identity::sudo_user()
        };
        let report = run_checks(dir.path(), &identity, &debian());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("'sudo' group"));
    }

    #[test]
    fn test_check_identity() {
        assert!(check_identity(&Identity::sudo_user()).is_ok());
        let root = Identity {
            is_root: true,
            ..Identity::sudo_user()
        };
        assert!(matches!(
            check_identity(&root),
            Err(InstallerError::Precondition(_))
        ));
    }

    #[test]
    fn test_binary_exists() {
        assert!(binary_exists("bash"));
        assert!(!binary_exists("this_binary_definitely_does_not_exist_12345"));
    }
}
