//! Post-install finalization.
//!
//! Only runs after every pipeline step succeeded:
//! - schedules the database backup in the invoking user's crontab
//! - removes build-only packages (best effort)
//! - prints reminders about access URLs and manual follow-ups

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, anyhow};

use crate::config::InstallConfig;
use crate::error::{InstallerError, Result};
use crate::preflight;
use crate::script_manifest::BACKUP_SCRIPT;

/// Comment marking the installer's backup cron line
pub const BACKUP_TAG: &str = "# backup guacamole";
/// Weekdays at 02:30
pub const BACKUP_SCHEDULE: &str = "30 2 * * 1-5";

/// Packages only needed to compile guacd
pub const BUILD_DEPS: &[&str] = &["build-essential", "autoconf", "libtool", "make"];

/// The cron line that runs the backup script from `work_dir`
pub fn backup_cron_entry(work_dir: &Path) -> String {
    format!(
        "{} {} {}",
        BACKUP_SCHEDULE,
        work_dir.join(BACKUP_SCRIPT).display(),
        BACKUP_TAG
    )
}

/// Replace every line carrying `tag` with a single `entry`.
///
/// Other lines keep their order. The result always ends with a newline, as
/// crontab requires.
pub fn replace_tagged_entry(existing: &str, entry: &str, tag: &str) -> String {
    let mut out: String = existing
        .lines()
        .filter(|line| !line.contains(tag))
        .map(|line| format!("{}\n", line))
        .collect();
    out.push_str(entry);
    out.push('\n');
    out
}

/// Read/write access to a crontab
pub trait CrontabStore {
    /// Current crontab; empty when the user has none
    fn read(&mut self) -> anyhow::Result<String>;
    fn write(&mut self, content: &str) -> anyhow::Result<()>;
}

/// The invoking user's crontab via `crontab -l` / `crontab -`
#[derive(Debug, Default)]
pub struct SystemCrontab;

impl CrontabStore for SystemCrontab {
    fn read(&mut self) -> anyhow::Result<String> {
        let output = Command::new("crontab")
            .arg("-l")
            .output()
            .context("cannot run crontab -l")?;
        crontab_listing(
            output.status.success(),
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
        )
    }

    fn write(&mut self, content: &str) -> anyhow::Result<()> {
        let mut child = Command::new("crontab")
            .arg("-")
            .stdin(Stdio::piped())
            .spawn()
            .context("cannot run crontab -")?;

        child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("crontab stdin unavailable"))?
            .write_all(content.as_bytes())
            .context("cannot write to crontab")?;

        let status = child.wait().context("crontab did not finish")?;
        if !status.success() {
            return Err(anyhow!("crontab - exited with {}", status));
        }
        Ok(())
    }
}

/// Interpret the result of `crontab -l`.
///
/// Only "no crontab for <user>" counts as an empty crontab. Any other failure
/// is an error, so an unreadable crontab is never overwritten.
pub fn crontab_listing(success: bool, stdout: &str, stderr: &str) -> anyhow::Result<String> {
    if success {
        return Ok(stdout.to_string());
    }
    if stderr.contains("no crontab for") {
        return Ok(String::new());
    }
    Err(anyhow!("crontab -l failed: {}", stderr.trim()))
}

/// Install (or refresh) the tagged backup entry.
pub fn install_backup_schedule(store: &mut dyn CrontabStore, work_dir: &Path) -> Result<()> {
    let map_err = |e: anyhow::Error| {
        InstallerError::system(format!("Failed to schedule backup: {:#}", e))
    };

    let existing = store.read().map_err(map_err)?;
    let entry = backup_cron_entry(work_dir);
    let updated = replace_tagged_entry(&existing, &entry, BACKUP_TAG);
    store.write(&updated).map_err(map_err)?;

    log::info!("Backup scheduled: {}", entry);
    Ok(())
}

/// Removes packages that were only needed for the build
pub trait BuildDepsCleaner {
    fn remove(&mut self, packages: &[&str]) -> anyhow::Result<()>;
}

/// `sudo -n apt-get -y remove` followed by `autoremove`
#[derive(Debug, Default)]
pub struct AptCleaner;

impl AptCleaner {
    fn apt(args: &[&str]) -> anyhow::Result<()> {
        let status = Command::new("sudo")
            .args(["-n", "apt-get", "-qq", "-y"])
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("cannot run apt-get {}", args.join(" ")))?;
        if !status.success() {
            return Err(anyhow!("apt-get {} exited with {}", args.join(" "), status));
        }
        Ok(())
    }
}

impl BuildDepsCleaner for AptCleaner {
    fn remove(&mut self, packages: &[&str]) -> anyhow::Result<()> {
        // The sudo timestamp may have lapsed during the pipeline
        preflight::prime_sudo()?;
        let mut args = vec!["remove"];
        args.extend_from_slice(packages);
        Self::apt(&args)?;
        Self::apt(&["autoremove"])
    }
}

/// Remove build dependencies. Failures are logged and returned as a
/// warning message; they never fail the install.
pub fn cleanup_build_deps(cleaner: &mut dyn BuildDepsCleaner) -> Option<String> {
    match cleaner.remove(BUILD_DEPS) {
        Ok(()) => {
            log::info!("Removed build dependencies: {}", BUILD_DEPS.join(" "));
            None
        }
        Err(e) => {
            let msg = format!("Could not remove build dependencies: {:#}", e);
            log::warn!("{}", msg);
            Some(msg)
        }
    }
}

/// Operator reminders for the finished install
pub fn reminders(config: &InstallConfig) -> Vec<String> {
    let mut lines = Vec::new();

    let direct = if config.default_ip.is_empty() {
        format!("http://{}:8080/guacamole", config.server_name)
    } else {
        format!("http://{}:8080/guacamole", config.default_ip)
    };
    lines.push(format!("Guacamole direct access: {}", direct));

    if config.install_nginx {
        let scheme = if config.self_sign || config.lets_encrypt {
            "https"
        } else {
            "http"
        };
        let host = if config.lets_encrypt {
            &config.le_dns_name
        } else {
            &config.proxy_site
        };
        lines.push(format!("Guacamole via Nginx:     {}://{}", scheme, host));
    }

    lines.push(
        "Default login is guacadmin / guacadmin. Change this password immediately.".to_string(),
    );

    if config.install_totp {
        lines.push(
            "TOTP is enabled: every user enrols an authenticator app at first login.".to_string(),
        );
    }
    if config.install_duo {
        lines.push(
            "Duo needs its API keys added to /etc/guacamole/guacamole.properties before it works."
                .to_string(),
        );
    }
    if config.install_ldap {
        lines.push(
            "LDAP needs its directory settings added to /etc/guacamole/guacamole.properties."
                .to_string(),
        );
    }
    if config.self_sign {
        lines.push(format!(
            "Import the self-signed certificate from {} into client browsers.",
            config.work_dir.display()
        ));
    }
    lines.push(format!(
        "Extension, backup and upgrade scripts are in {}",
        config.work_dir.display()
    ));
    lines
}

/// What finalization did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    pub backup_scheduled: bool,
    pub warnings: Vec<String>,
    pub reminders: Vec<String>,
}

/// Run every finalization task.
///
/// A failed backup schedule or cleanup becomes a warning; the install
/// itself already succeeded.
pub fn finalize(
    config: &InstallConfig,
    crontab: &mut dyn CrontabStore,
    cleaner: &mut dyn BuildDepsCleaner,
) -> FinalizeReport {
    let mut report = FinalizeReport::default();

    match install_backup_schedule(crontab, &config.work_dir) {
        Ok(()) => report.backup_scheduled = true,
        Err(e) => {
            log::warn!("{}", e);
            report.warnings.push(e.to_string());
        }
    }

    if let Some(warning) = cleanup_build_deps(cleaner) {
        report.warnings.push(warning);
    }

    report.reminders = reminders(config);
    report
}
