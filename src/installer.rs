//! Installation orchestration
//!
//! One run goes through these phases in order:
//! 1. pre-flight checks
//! 2. sudo credential priming
//! 3. configuration collection and summary
//! 4. fetching every script into the work directory
//! 5. placeholder propagation
//! 6. planned step execution
//! 7. finalization
//!
//! Nothing on the host changes before phase 4, so every precondition or
//! validation failure leaves the machine untouched.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::collector::{CollectContext, Collector, RetryPolicy};
use crate::config::InstallConfig;
use crate::config_file::PresetConfig;
use crate::console;
use crate::error::{InstallerError, Result};
use crate::executor::{self, PipelinePlan, StepOutcome, StepRunner};
use crate::fetcher::{self, ScriptSource};
use crate::finalizer::{self, BuildDepsCleaner, CrontabStore, FinalizeReport};
use crate::preflight::{self, Identity};
use crate::probe::HostFacts;
use crate::prompt::Prompter;
use crate::propagate;
use crate::script_manifest::{ManifestRegistry, ScriptRole};
use crate::script_runner::{Elevation, ScriptOutput, run_script_safe};
use crate::types::Extension;

/// Settings for one run
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub work_dir: PathBuf,
    pub log_path: PathBuf,
    pub preset: PresetConfig,
    pub save_preset: Option<PathBuf>,
    pub retry: RetryPolicy,
    pub dry_run: bool,
    /// Run `sudo -v` before collecting; off for tests
    pub prime_sudo: bool,
}

/// The pieces of the run that touch the outside world
pub struct Collaborators<'a> {
    pub prompter: &'a mut dyn Prompter,
    pub source: &'a dyn ScriptSource,
    pub runner: &'a mut dyn StepRunner,
    pub crontab: &'a mut dyn CrontabStore,
    pub cleaner: &'a mut dyn BuildDepsCleaner,
}

/// Result of a completed run
#[derive(Debug)]
pub struct InstallReport {
    pub config: InstallConfig,
    pub steps: Vec<StepOutcome>,
    pub finalize: Option<FinalizeReport>,
}

pub struct Installer<'a> {
    registry: &'a ManifestRegistry,
    options: InstallOptions,
    io: Collaborators<'a>,
}

impl<'a> Installer<'a> {
    pub fn new(
        registry: &'a ManifestRegistry,
        options: InstallOptions,
        io: Collaborators<'a>,
    ) -> Self {
        Self {
            registry,
            options,
            io,
        }
    }

    pub fn run(mut self, facts: &HostFacts, identity: &Identity) -> Result<InstallReport> {
        let opts = &self.options;

        // Pre-flight
        let report = preflight::run_checks(&opts.work_dir, identity, &facts.os);
        if !report.is_ok() {
            for failure in &report.failures {
                console::error(failure);
            }
        }
        let overrides = report.into_result()?;

        if opts.prime_sudo && !opts.dry_run {
            console::info("Checking sudo credentials...");
            preflight::prime_sudo()?;
        }

        // Collection
        console::info(format!("Installing Guacamole on {}", facts.os));
        let ctx = CollectContext {
            facts: facts.clone(),
            overrides,
            work_dir: opts.work_dir.clone(),
            log_location: opts.log_path.clone(),
        };
        let config =
            Collector::new(&mut *self.io.prompter, &opts.preset, &ctx, opts.retry).collect()?;

        console::plain("");
        for line in config.summary() {
            console::plain(line);
        }
        console::plain("");

        if let Some(path) = &opts.save_preset {
            PresetConfig::from_resolved(&config).save_to_file(path)?;
            console::success(format!("Preset saved to {}", path.display()));
        }

        let plan = PipelinePlan::from_config(&config)?;
        plan.check_contracts(self.registry, &config)?;

        // Fetch & propagate
        fs::create_dir_all(&opts.work_dir)?;
        console::info(format!(
            "Downloading setup scripts from {}",
            self.io.source.describe()
        ));
        fetcher::fetch_all(self.io.source, &self.registry.script_names(), &opts.work_dir)?;
        propagate_all(self.registry, &config, &opts.work_dir)?;

        // Execute
        let steps = executor::execute(
            &plan,
            &config,
            &mut *self.io.runner,
            &opts.log_path,
            opts.dry_run,
        )?;

        // Finalize
        let finalize = if opts.dry_run {
            None
        } else {
            let report =
                finalizer::finalize(&config, &mut *self.io.crontab, &mut *self.io.cleaner);
            for warning in &report.warnings {
                console::warn(warning);
            }
            Some(report)
        };

        console::success("Guacamole installation complete.");
        for line in finalizer::reminders(&config) {
            console::plain(line);
        }
        log::info!("Install finished: {} step(s)", steps.len());

        Ok(InstallReport {
            config,
            steps,
            finalize,
        })
    }
}

/// Fill every fetched script's placeholders from the configuration.
pub fn propagate_all(
    registry: &ManifestRegistry,
    config: &InstallConfig,
    dir: &Path,
) -> Result<()> {
    let env: HashMap<String, String> = config.to_env_vars().into_iter().collect();

    for manifest in registry.all() {
        let vars: Vec<(&str, &str)> = manifest
            .placeholders()
            .filter_map(|name| env.get(name).map(|v| (name, v.as_str())))
            .collect();
        propagate::propagate_file(&dir.join(&manifest.script), vars)?;
    }
    Ok(())
}

/// Run an extension script left in the work directory by an earlier
/// install. Its values come from its own propagated placeholders.
pub fn run_extension(
    registry: &ManifestRegistry,
    extension: Extension,
    work_dir: &Path,
    log_path: &Path,
    elevation: Elevation,
) -> Result<ScriptOutput> {
    let manifest = registry.require(extension.script_name())?;
    if manifest.role != ScriptRole::Extension {
        return Err(InstallerError::validation(format!(
            "{} is not an extension script",
            manifest.script
        )));
    }

    let path = work_dir.join(&manifest.script);
    if !path.is_file() {
        return Err(InstallerError::precondition(format!(
            "{} not found. Run the installer first.",
            path.display()
        )));
    }

    let env = propagate::read_propagated(&path, manifest.placeholders())?;
    let exec = manifest.validate_execution(&env, Some(work_dir))?;

    console::info(format!("Adding the {} extension...", extension));
    let output = run_script_safe(&exec, log_path, elevation)
        .map_err(|e| InstallerError::system(format!("{:#}", e)))?;
    if !output.success {
        return Err(InstallerError::StepFailed {
            step: extension.to_string(),
            code: output.code(),
            log: log_path.to_path_buf(),
        });
    }
    console::success(format!("{} extension installed", extension));
    Ok(output)
}
