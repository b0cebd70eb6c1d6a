//! End-to-end runs of the installer with every outside collaborator faked:
//! scripted answers, scripts served from a temp directory, a recording step
//! runner and an in-memory crontab.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use guac_installer::collector::RetryPolicy;
use guac_installer::config_file::PresetConfig;
use guac_installer::error::{InstallerError, Result};
use guac_installer::executor::{Step, StepOutcome, StepRunner};
use guac_installer::fetcher::DirSource;
use guac_installer::finalizer::{BACKUP_TAG, BuildDepsCleaner, CrontabStore};
use guac_installer::installer::{Collaborators, InstallOptions, InstallReport, Installer};
use guac_installer::preflight::Identity;
use guac_installer::probe::{HostFacts, OsInfo};
use guac_installer::prompt::ScriptedPrompter;
use guac_installer::script_manifest::ManifestRegistry;
use guac_installer::script_runner::ScriptOutput;

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Default)]
struct RecordingRunner {
    fail_on: Option<(Step, i32)>,
    ran: Vec<Step>,
    envs: Vec<HashMap<String, String>>,
}

impl StepRunner for RecordingRunner {
    fn run_step(&mut self, step: Step, env: &HashMap<String, String>) -> Result<ScriptOutput> {
        self.ran.push(step);
        self.envs.push(env.clone());
        let code = match self.fail_on {
            Some((failing, code)) if failing == step => code,
            _ => 0,
        };
        Ok(ScriptOutput {
            exit_code: Some(code),
            success: code == 0,
        })
    }
}

#[derive(Default)]
struct MemoryCrontab {
    content: String,
    writes: usize,
}

impl CrontabStore for MemoryCrontab {
    fn read(&mut self) -> anyhow::Result<String> {
        Ok(self.content.clone())
    }

    fn write(&mut self, content: &str) -> anyhow::Result<()> {
        self.content = content.to_string();
        self.writes += 1;
        Ok(())
    }
}

#[derive(Default)]
struct NoopCleaner {
    calls: usize,
}

impl BuildDepsCleaner for NoopCleaner {
    fn remove(&mut self, _packages: &[&str]) -> anyhow::Result<()> {
        self.calls += 1;
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

struct Fixture {
    _root: tempfile::TempDir,
    source_dir: std::path::PathBuf,
    work_dir: std::path::PathBuf,
    registry: ManifestRegistry,
}

impl Fixture {
    /// A script source with every known script, each holding blank
    /// placeholder assignments.
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let source_dir = root.path().join("source");
        let work_dir = root.path().join("guac-setup");
        fs::create_dir_all(&source_dir).unwrap();

        let registry = ManifestRegistry::with_core_manifests().unwrap();
        for manifest in registry.all() {
            let mut body = String::from("#!/bin/bash\n");
            for name in manifest.placeholders() {
                body.push_str(name);
                body.push_str("=\n");
            }
            body.push_str("echo done\n");
            fs::write(source_dir.join(&manifest.script), body).unwrap();
        }

        Self {
            _root: root,
            source_dir,
            work_dir,
            registry,
        }
    }

    fn options(&self) -> InstallOptions {
        InstallOptions {
            work_dir: self.work_dir.clone(),
            log_path: self.work_dir.join("guacamole_setup.log"),
            preset: PresetConfig::default(),
            save_preset: None,
            retry: RetryPolicy::Bounded(3),
            dry_run: false,
            prime_sudo: false,
        }
    }

    fn script(&self, name: &str) -> String {
        fs::read_to_string(self.work_dir.join(name)).unwrap()
    }
}

fn facts() -> HostFacts {
    HostFacts {
        os: OsInfo::parse("ID=ubuntu\nVERSION_ID=\"22.04\"\nVERSION_CODENAME=jammy\n"),
        hostname: "guac01".to_string(),
        default_ip: "192.168.1.20".to_string(),
        dns_suffix: "example.lan".to_string(),
        timezone: "America/New_York".to_string(),
    }
}

struct Run {
    result: Result<InstallReport>,
    prompter: ScriptedPrompter,
    runner: RecordingRunner,
    crontab: MemoryCrontab,
    cleaner: NoopCleaner,
}

fn run_with(
    fixture: &Fixture,
    options: InstallOptions,
    answers: &[&str],
    runner: RecordingRunner,
    crontab: MemoryCrontab,
) -> Run {
    let mut prompter = ScriptedPrompter::new(answers.iter().copied());
    let source = DirSource::new(&fixture.source_dir);
    let mut runner = runner;
    let mut crontab = crontab;
    let mut cleaner = NoopCleaner::default();

    let io = Collaborators {
        prompter: &mut prompter,
        source: &source,
        runner: &mut runner,
        crontab: &mut crontab,
        cleaner: &mut cleaner,
    };
    let result =
        Installer::new(&fixture.registry, options, io).run(&facts(), &Identity::sudo_user());

    Run {
        result,
        prompter,
        runner,
        crontab,
        cleaner,
    }
}

/// Local MySQL, nginx, no TLS, no extensions
const LOCAL_DEFAULTS: &[&str] = &[
    "",    // hostname
    "",    // dns suffix
    "",    // install mysql
    "",    // secure mysql
    "r00t", "r00t",
    "gu4c", "gu4c",
    "", "", "", "", "", // totp duo ldap qconnect histrec
    "",    // backup email
    "",    // nginx
    "",    // proxy site
    "",    // self-signed
    "",    // letsencrypt
];

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_full_local_install() {
    let fixture = Fixture::new();
    let run = run_with(
        &fixture,
        fixture.options(),
        LOCAL_DEFAULTS,
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );
    let report = run.result.unwrap();

    assert_eq!(run.prompter.remaining(), 0);
    assert_eq!(run.runner.ran, vec![Step::Core, Step::Nginx]);
    assert_eq!(
        report.steps,
        vec![
            StepOutcome::Succeeded(Step::Core),
            StepOutcome::Succeeded(Step::Nginx)
        ]
    );

    // Every step sees the same environment
    let env = &run.runner.envs[0];
    assert_eq!(env["SERVER_NAME"], "guac01");
    assert_eq!(env["INSTALL_MYSQL"], "true");
    assert_eq!(run.runner.envs[1], *env);

    // Scripts were fetched and filled
    assert!(
        fixture
            .script("3-install-nginx.sh")
            .contains("PROXY_SITE=\"guac01.example.lan\"\n")
    );
    assert!(fixture.script("2-install-guacamole.sh").contains("GUAC_PWD=\"gu4c\"\n"));

    let finalize = report.finalize.unwrap();
    assert!(finalize.backup_scheduled);
    assert!(finalize.warnings.is_empty());
    assert_eq!(run.crontab.writes, 1);
    assert!(run.crontab.content.contains(BACKUP_TAG));
    assert_eq!(run.cleaner.calls, 1);
}

#[test]
fn test_remote_mysql_never_asks_root_password() {
    let fixture = Fixture::new();
    let answers = [
        "", "", // hostname, dns suffix
        "n",    // install mysql
        "db.example.lan",
        "3307",
        "", "", // db name, db user
        "gu4c", "gu4c",
        "", "", "", "", "",
        "",
        "n", // nginx
    ];
    let run = run_with(
        &fixture,
        fixture.options(),
        &answers,
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );
    let report = run.result.unwrap();

    assert!(!run.prompter.was_asked("root password"));
    assert_eq!(report.config.mysql_host, "db.example.lan");
    assert_eq!(report.config.mysql_port, 3307);
    assert!(!report.config.secure_mysql);
    assert_eq!(run.runner.ran, vec![Step::Core]);
}

#[test]
fn test_leftovers_stop_before_any_prompt() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.work_dir.join("guacamole-9.9.9")).unwrap();

    let run = run_with(
        &fixture,
        fixture.options(),
        &[],
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );

    let err = run.result.unwrap_err();
    assert!(matches!(err, InstallerError::Precondition(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(run.prompter.asked().is_empty());
    assert!(!fixture.work_dir.join("3-install-nginx.sh").exists());
}

#[test]
fn test_totp_and_duo_rejected_before_any_step() {
    let fixture = Fixture::new();
    let answers = ["", "", "", "", "r", "r", "g", "g", "y", "y"];
    let run = run_with(
        &fixture,
        fixture.options(),
        &answers,
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );

    assert!(matches!(
        run.result.unwrap_err(),
        InstallerError::ExclusiveOptions { .. }
    ));
    assert!(run.runner.ran.is_empty());
    assert!(!fixture.work_dir.join("2-install-guacamole.sh").exists());
}

#[test]
fn test_bad_letsencrypt_email_stops_before_fetch() {
    let fixture = Fixture::new();
    // Built in code, so it skips the checks a preset file gets on load
    let preset = PresetConfig {
        lets_encrypt: Some(true),
        le_dns_name: Some("guac.example.com".to_string()),
        le_email: Some("hostmaster".to_string()),
        ..Default::default()
    };
    let options = InstallOptions {
        preset,
        ..fixture.options()
    };
    let run = run_with(
        &fixture,
        options,
        &LOCAL_DEFAULTS[..16],
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );

    let err = run.result.unwrap_err();
    assert!(matches!(err, InstallerError::Manifest(_)));
    assert!(err.to_string().contains("LE_EMAIL"));
    assert_eq!(run.prompter.remaining(), 0);
    assert!(run.runner.ran.is_empty());
    assert!(!fixture.work_dir.join("2-install-guacamole.sh").exists());
    assert_eq!(run.crontab.writes, 0);
}

#[test]
fn test_step_failure_halts_pipeline() {
    let fixture = Fixture::new();
    let runner = RecordingRunner {
        fail_on: Some((Step::Core, 3)),
        ..Default::default()
    };
    let run = run_with(
        &fixture,
        fixture.options(),
        LOCAL_DEFAULTS,
        runner,
        MemoryCrontab::default(),
    );

    match run.result.unwrap_err() {
        InstallerError::StepFailed { step, code, log } => {
            assert_eq!(step, "guacamole");
            assert_eq!(code, 3);
            assert!(log.ends_with("guacamole_setup.log"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(run.runner.ran, vec![Step::Core]);
    assert_eq!(run.crontab.writes, 0);
    assert_eq!(run.cleaner.calls, 0);
}

#[test]
fn test_fetch_failure_is_fatal() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.source_dir.join("backup-guacamole.sh")).unwrap();

    let run = run_with(
        &fixture,
        fixture.options(),
        LOCAL_DEFAULTS,
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );

    match run.result.unwrap_err() {
        InstallerError::Fetch { failures } => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("backup-guacamole.sh"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(run.runner.ran.is_empty());
}

#[test]
fn test_dry_run_propagates_but_runs_nothing() {
    let fixture = Fixture::new();
    let options = InstallOptions {
        dry_run: true,
        ..fixture.options()
    };
    let run = run_with(
        &fixture,
        options,
        LOCAL_DEFAULTS,
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );
    let report = run.result.unwrap();

    assert!(run.runner.ran.is_empty());
    assert_eq!(
        report.steps,
        vec![StepOutcome::Skipped(Step::Core), StepOutcome::Skipped(Step::Nginx)]
    );
    assert!(report.finalize.is_none());
    assert_eq!(run.crontab.writes, 0);
    assert!(fixture.script("2-install-guacamole.sh").contains("SERVER_NAME=\"guac01\""));
}

#[test]
fn test_second_install_keeps_one_backup_entry() {
    let fixture = Fixture::new();
    let first = run_with(
        &fixture,
        fixture.options(),
        LOCAL_DEFAULTS,
        RecordingRunner::default(),
        MemoryCrontab {
            content: "0 * * * * /usr/bin/true\n".to_string(),
            writes: 0,
        },
    );
    assert!(first.result.is_ok());

    let second = run_with(
        &fixture,
        fixture.options(),
        LOCAL_DEFAULTS,
        RecordingRunner::default(),
        first.crontab,
    );
    assert!(second.result.is_ok());

    let content = second.crontab.content;
    assert_eq!(content.matches(BACKUP_TAG).count(), 1);
    assert!(content.contains("/usr/bin/true"));
}

#[test]
fn test_saved_preset_replays_without_prompts() {
    let fixture = Fixture::new();
    let preset_path = fixture.work_dir.with_extension("preset.json");
    let options = InstallOptions {
        save_preset: Some(preset_path.clone()),
        dry_run: true,
        ..fixture.options()
    };
    let first = run_with(
        &fixture,
        options,
        LOCAL_DEFAULTS,
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );
    assert!(first.result.is_ok());

    let saved = fs::read_to_string(&preset_path).unwrap();
    assert!(!saved.contains("gu4c"));
    assert!(!saved.contains("r00t"));

    // Passwords and blank answers are not saved, so only those are asked again
    let options = InstallOptions {
        preset: PresetConfig::load_from_file(Path::new(&preset_path)).unwrap(),
        dry_run: true,
        ..fixture.options()
    };
    let second = run_with(
        &fixture,
        options,
        &["r00t", "r00t", "gu4c", "gu4c", ""],
        RecordingRunner::default(),
        MemoryCrontab::default(),
    );
    assert!(second.result.is_ok());
    assert_eq!(second.prompter.asked().len(), 5);
    assert!(second.prompter.was_asked("backup notifications"));
}
