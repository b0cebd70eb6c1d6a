//! guac-install - Main entry point

use std::path::Path;

use log::{debug, info};

use guac_installer::cli::{Cli, Commands};
use guac_installer::collector::RetryPolicy;
use guac_installer::config_file::PresetConfig;
use guac_installer::error::Result;
use guac_installer::executor::ScriptStepRunner;
use guac_installer::fetcher;
use guac_installer::finalizer::{AptCleaner, SystemCrontab};
use guac_installer::installer::{self, Collaborators, InstallOptions, Installer};
use guac_installer::preflight::{self, Identity};
use guac_installer::probe::HostFacts;
use guac_installer::process_guard::{self, ProcessGuard};
use guac_installer::prompt::TerminalPrompter;
use guac_installer::script_manifest::ManifestRegistry;
use guac_installer::script_runner::Elevation;
use guac_installer::{console, logging};

fn main() {
    let cli = Cli::parse_args();
    let work_dir = cli.resolved_work_dir();
    let log_path = cli.resolved_log_file(&work_dir);

    // Nothing may be created under the work directory for a refused operator
    let identity = Identity::detect();
    let identity_check = if cli.checks_host() {
        preflight::check_identity(&identity)
    } else {
        Ok(())
    };
    if let Err(e) = identity_check {
        console::error(e.to_string());
        std::process::exit(e.exit_code());
    }

    logging::init(&log_path);
    info!("guac-install {} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = process_guard::init_signal_handlers() {
        log::warn!("Failed to initialize signal handlers: {}", e);
    }
    let guard = ProcessGuard::new();

    let result = dispatch(&cli, &identity, &work_dir, &log_path);

    if let Err(e) = result {
        log::error!("{}", e);
        console::fatal(e.to_string(), &log_path);
        drop(guard);
        std::process::exit(e.exit_code());
    }
    debug!("Exiting with {} tracked children", guard.child_count());
}

fn dispatch(cli: &Cli, identity: &Identity, work_dir: &Path, log_path: &Path) -> Result<()> {
    match &cli.command {
        Some(Commands::Validate { preset }) => {
            info!("Validating preset file: {:?}", preset);
            PresetConfig::load_from_file(preset)?;
            console::success(format!("Preset file is valid: {}", preset.display()));
            Ok(())
        }
        Some(Commands::Extension { name }) => {
            if !cli.dry_run {
                preflight::prime_sudo()?;
            }

            let registry = ManifestRegistry::with_core_manifests()?;
            if cli.dry_run {
                console::info(format!(
                    "Dry run: would run {}",
                    work_dir.join(name.script_name()).display()
                ));
                return Ok(());
            }
            installer::run_extension(&registry, *name, work_dir, log_path, Elevation::Sudo)?;
            Ok(())
        }
        Some(Commands::Install {
            preset,
            save_preset,
        }) => run_install(
            cli,
            identity,
            work_dir,
            log_path,
            preset.as_deref(),
            save_preset.as_deref(),
        ),
        None => run_install(cli, identity, work_dir, log_path, None, None),
    }
}

fn run_install(
    cli: &Cli,
    identity: &Identity,
    work_dir: &Path,
    log_path: &Path,
    preset_path: Option<&Path>,
    save_preset: Option<&Path>,
) -> Result<()> {
    let preset = match preset_path {
        Some(path) => {
            info!("Using preset {:?}", path);
            PresetConfig::load_from_file(path)?
        }
        None => PresetConfig::default(),
    };

    let options = InstallOptions {
        work_dir: work_dir.to_path_buf(),
        log_path: log_path.to_path_buf(),
        preset,
        save_preset: save_preset.map(Path::to_path_buf),
        retry: cli.retry_policy(),
        dry_run: cli.dry_run,
        prime_sudo: true,
    };
    if let RetryPolicy::Bounded(n) = options.retry {
        debug!("Input retries bounded to {}", n);
    }

    let registry = ManifestRegistry::with_core_manifests()?;
    let source = fetcher::source_from_arg(&cli.source)?;
    let mut prompter = TerminalPrompter::new();
    let mut runner = ScriptStepRunner::new(&registry, work_dir, log_path, Elevation::Sudo);
    let mut crontab = SystemCrontab;
    let mut cleaner = AptCleaner;

    let io = Collaborators {
        prompter: &mut prompter,
        source: source.as_ref(),
        runner: &mut runner,
        crontab: &mut crontab,
        cleaner: &mut cleaner,
    };

    let facts = HostFacts::detect();
    let report = Installer::new(&registry, options, io).run(&facts, identity)?;
    info!(
        "Completed {} step(s), TLS: {}",
        report.steps.len(),
        report.config.tls_mode()
    );
    Ok(())
}
