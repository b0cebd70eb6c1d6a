//! Pipeline planning and sequential step execution.
//!
//! The plan is derived from the frozen configuration: the core step always
//! runs, the reverse proxy step only when selected, and at most one TLS
//! step. Extensions are never part of the pipeline; their scripts stay in
//! the work directory for the operator.
//!
//! Steps run strictly one after another. The first failure halts the
//! pipeline; nothing is retried.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use strum::Display;

use crate::config::InstallConfig;
use crate::console;
use crate::error::{InstallerError, Result};
use crate::preflight;
use crate::script_manifest::{
    CORE_SCRIPT, LETSENCRYPT_SCRIPT, ManifestRegistry, NGINX_SCRIPT, SELF_SIGNED_SCRIPT,
};
use crate::script_runner::{Elevation, ScriptOutput, run_script_safe};
use crate::types::TlsMode;

/// One pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Step {
    #[strum(serialize = "guacamole")]
    Core,
    #[strum(serialize = "nginx")]
    Nginx,
    #[strum(serialize = "tls-self-signed")]
    SelfSignedTls,
    #[strum(serialize = "tls-letsencrypt")]
    LetsEncryptTls,
}

impl Step {
    /// Script implementing the step
    pub fn script(self) -> &'static str {
        match self {
            Self::Core => CORE_SCRIPT,
            Self::Nginx => NGINX_SCRIPT,
            Self::SelfSignedTls => SELF_SIGNED_SCRIPT,
            Self::LetsEncryptTls => LETSENCRYPT_SCRIPT,
        }
    }

    /// Operator-facing description
    pub fn label(self) -> &'static str {
        match self {
            Self::Core => "Installing Guacamole",
            Self::Nginx => "Installing Nginx reverse proxy",
            Self::SelfSignedTls => "Configuring self-signed TLS",
            Self::LetsEncryptTls => "Configuring Let's Encrypt TLS",
        }
    }
}

/// Ordered steps for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    steps: Vec<Step>,
}

impl PipelinePlan {
    /// Plan the pipeline for a configuration.
    ///
    /// Re-checks the exclusivity rules so an inconsistent configuration can
    /// never schedule two TLS steps.
    pub fn from_config(config: &InstallConfig) -> Result<Self> {
        config.check_exclusive()?;

        let mut steps = vec![Step::Core];
        if config.install_nginx {
            steps.push(Step::Nginx);
            match config.tls_mode() {
                TlsMode::SelfSigned => steps.push(Step::SelfSignedTls),
                TlsMode::LetsEncrypt => steps.push(Step::LetsEncryptTls),
                TlsMode::None => {}
            }
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Check every planned step's environment contract up front.
    ///
    /// Must run before any script is fetched. Script files are not checked
    /// here; they do not exist yet.
    pub fn check_contracts(
        &self,
        registry: &ManifestRegistry,
        config: &InstallConfig,
    ) -> Result<()> {
        let env: HashMap<String, String> = config.to_env_vars().into_iter().collect();
        for step in &self.steps {
            registry.validate_execution(step.script(), &env, None)?;
        }
        log::debug!("Environment contracts hold for {} step(s)", self.steps.len());
        Ok(())
    }
}

/// Runs a single step script
pub trait StepRunner {
    fn run_step(&mut self, step: Step, env: &HashMap<String, String>) -> Result<ScriptOutput>;
}

/// Renews elevated credentials ahead of a step
type CredentialRefresh<'a> = Box<dyn FnMut() -> Result<()> + 'a>;

/// Runs steps from the work directory through [`run_script_safe`]
///
/// With [`Elevation::Sudo`] the sudo timestamp is renewed before every step;
/// the core build alone can outlast the default cache lifetime.
pub struct ScriptStepRunner<'a> {
    registry: &'a ManifestRegistry,
    scripts_dir: PathBuf,
    log_path: PathBuf,
    elevation: Elevation,
    refresh: CredentialRefresh<'a>,
}

impl<'a> ScriptStepRunner<'a> {
    pub fn new(
        registry: &'a ManifestRegistry,
        scripts_dir: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        elevation: Elevation,
    ) -> Self {
        let refresh: CredentialRefresh<'a> = match elevation {
            Elevation::Sudo => Box::new(preflight::prime_sudo),
            Elevation::None => Box::new(|| Ok(())),
        };
        Self {
            registry,
            scripts_dir: scripts_dir.into(),
            log_path: log_path.into(),
            elevation,
            refresh,
        }
    }

    /// Replace the credential renewal run before each step
    pub fn with_credential_refresh(mut self, refresh: impl FnMut() -> Result<()> + 'a) -> Self {
        self.refresh = Box::new(refresh);
        self
    }
}

impl StepRunner for ScriptStepRunner<'_> {
    fn run_step(&mut self, step: Step, env: &HashMap<String, String>) -> Result<ScriptOutput> {
        let exec = self
            .registry
            .validate_execution(step.script(), env, Some(&self.scripts_dir))?;

        (self.refresh)()?;
        run_script_safe(&exec, &self.log_path, self.elevation).map_err(|e| {
            InstallerError::system(format!("Cannot run {}: {:#}", step.script(), e))
        })
    }
}

/// What happened to one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded(Step),
    Skipped(Step),
}

/// Run every planned step in order, halting at the first failure.
///
/// With `dry_run` nothing is executed; each step is only announced.
pub fn execute(
    plan: &PipelinePlan,
    config: &InstallConfig,
    runner: &mut dyn StepRunner,
    log_path: &Path,
    dry_run: bool,
) -> Result<Vec<StepOutcome>> {
    let env: HashMap<String, String> = config.to_env_vars().into_iter().collect();
    let mut outcomes = Vec::with_capacity(plan.steps().len());

    for (index, &step) in plan.steps().iter().enumerate() {
        let span = tracing::info_span!("step", step = %step);
        let _entered = span.enter();

        let position = format!("[{}/{}]", index + 1, plan.steps().len());
        if dry_run {
            log::info!("Dry run: would run {}", step.script());
            console::info(format!("{} {} (dry run: {})", position, step.label(), step.script()));
            outcomes.push(StepOutcome::Skipped(step));
            continue;
        }

        console::info(format!("{} {}...", position, step.label()));
        log::info!("Starting {}", step.script());

        let output = runner.run_step(step, &env)?;
        if !output.success {
            log::error!("{} exited with {}", step.script(), output.code());
            return Err(InstallerError::StepFailed {
                step: step.to_string(),
                code: output.code(),
                log: log_path.to_path_buf(),
            });
        }

        console::success(format!("{} {} done", position, step.label()));
        outcomes.push(StepOutcome::Succeeded(step));
    }

    Ok(outcomes)
}
