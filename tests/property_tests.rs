//! Property-based tests for the installer's text handling rules
//!
//! Uses proptest for:
//! - yes/no answer parsing
//! - secret confirmation
//! - DNS suffix selection
//! - crontab entry replacement
//! - placeholder substitution

use std::path::PathBuf;

use proptest::prelude::*;

use guac_installer::collector::{CollectContext, Collector, RetryPolicy, parse_yes_no};
use guac_installer::config_file::PresetConfig;
use guac_installer::error::InstallerError;
use guac_installer::finalizer::replace_tagged_entry;
use guac_installer::probe::{self, HostFacts, OsInfo};
use guac_installer::prompt::ScriptedPrompter;
use guac_installer::propagate::{read_assigned, substitute_first};
use guac_installer::workarounds;

// =============================================================================
// Yes/No Answers
// =============================================================================

const RECOGNIZED: &[&str] = &["y", "yes", "n", "no"];

proptest! {
    /// Anything that is not y/yes/n/no falls back to the default
    #[test]
    fn unrecognized_answer_gives_default(answer in "[a-zA-Z ]{0,8}", default: bool) {
        prop_assume!(!RECOGNIZED.contains(&answer.trim().to_lowercase().as_str()));
        prop_assert_eq!(parse_yes_no(&answer, default), default);
    }

    /// Recognized answers ignore case and the default
    #[test]
    fn recognized_answer_ignores_default(idx in 0usize..4, upper: bool, default: bool) {
        let word = RECOGNIZED[idx];
        let answer = if upper { word.to_uppercase() } else { word.to_string() };
        prop_assert_eq!(parse_yes_no(&answer, default), word.starts_with('y'));
    }
}

// =============================================================================
// Secret Confirmation
// =============================================================================

/// Every answer preset except the Guacamole database password
fn preset_without_guac_pwd() -> PresetConfig {
    PresetConfig {
        server_name: Some("guac01".into()),
        local_domain: Some("lan".into()),
        install_mysql: Some(true),
        secure_mysql: Some(true),
        mysql_root_pwd: Some("root".into()),
        install_totp: Some(false),
        install_duo: Some(false),
        install_ldap: Some(false),
        install_qconnect: Some(false),
        install_histrec_viewer: Some(false),
        backup_email: Some("ops@example.lan".into()),
        install_nginx: Some(false),
        ..Default::default()
    }
}

fn context() -> CollectContext {
    let os = OsInfo::parse("ID=debian\nVERSION_ID=\"12\"\nVERSION_CODENAME=bookworm\n");
    let overrides = workarounds::for_host(&os).unwrap();
    CollectContext {
        facts: HostFacts {
            os,
            hostname: "guac01".into(),
            default_ip: "10.0.0.5".into(),
            dns_suffix: "lan".into(),
            timezone: "UTC".into(),
        },
        overrides,
        work_dir: PathBuf::from("/tmp/guac-setup"),
        log_location: PathBuf::from("/tmp/guac-setup/guacamole_setup.log"),
    }
}

proptest! {
    /// With one attempt, a password pair is accepted exactly when both
    /// entries match and are not blank
    #[test]
    fn secret_accepted_only_when_equal_and_non_empty(
        first in "[a-z0-9]{0,4}",
        second in "[a-z0-9]{0,4}",
    ) {
        let preset = preset_without_guac_pwd();
        let ctx = context();
        let mut prompter = ScriptedPrompter::new([first.clone(), second.clone()]);

        let result =
            Collector::new(&mut prompter, &preset, &ctx, RetryPolicy::Bounded(1)).collect();

        if !first.is_empty() && first == second {
            prop_assert_eq!(result.unwrap().guac_pwd, first);
        } else {
            prop_assert!(matches!(result, Err(InstallerError::Validation(_))));
            prop_assert_eq!(prompter.messages().len(), 1);
        }
    }
}

// =============================================================================
// DNS Suffix
// =============================================================================

proptest! {
    /// The shorter of `search` and `domain` wins; a tie goes to `search`
    #[test]
    fn dns_suffix_prefers_shorter(search in "[a-z]{1,12}\\.lan", domain in "[a-z]{1,12}\\.lan") {
        let conf = format!("nameserver 10.0.0.1\nsearch {} other.lan\ndomain {}\n", search, domain);
        let expected = if domain.len() < search.len() { &domain } else { &search };
        prop_assert_eq!(&probe::dns_suffix(&conf), expected);
    }

    /// A single source is used as-is, minus a trailing dot
    #[test]
    fn dns_suffix_single_source(name in "[a-z]{1,12}\\.[a-z]{2,5}", use_search: bool) {
        let key = if use_search { "search" } else { "domain" };
        let conf = format!("{} {}.\n", key, name);
        prop_assert_eq!(probe::dns_suffix(&conf), name);
    }
}

// =============================================================================
// Crontab Entries
// =============================================================================

const TAG: &str = "# backup guacamole";

proptest! {
    /// Replacing the tagged entry twice gives the same crontab as once,
    /// and untagged lines survive in order
    #[test]
    fn replace_tagged_entry_is_idempotent(
        others in prop::collection::vec("[0-9*]{1,2} [0-9*] \\* \\* \\* /usr/bin/[a-z]{1,8}", 0..5),
        stale_copies in 0usize..3,
    ) {
        let mut existing = String::new();
        for line in &others {
            existing.push_str(line);
            existing.push('\n');
        }
        for _ in 0..stale_copies {
            existing.push_str(&format!("0 1 * * * old.sh {}\n", TAG));
        }
        let entry = format!("30 2 * * 1-5 /srv/backup-guacamole.sh {}", TAG);

        let once = replace_tagged_entry(&existing, &entry, TAG);
        let twice = replace_tagged_entry(&once, &entry, TAG);

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.matches(TAG).count(), 1);
        let kept: Vec<&str> = once.lines().filter(|l| !l.contains(TAG)).collect();
        prop_assert_eq!(kept, others.iter().map(String::as_str).collect::<Vec<_>>());
    }
}

// =============================================================================
// Placeholder Substitution
// =============================================================================

proptest! {
    /// Only the first `NAME=` line changes; the value reads back intact
    #[test]
    fn substitute_first_touches_only_first(
        value in "[ -~]{0,16}",
        copies in 1usize..4,
        filler in "[a-z ]{0,10}",
    ) {
        let mut text = String::from("#!/bin/bash\n");
        for _ in 0..copies {
            text.push_str("PROXY_SITE=\n");
            text.push_str(&format!("# {}\n", filler));
        }

        let updated = substitute_first(&text, "PROXY_SITE", &value).unwrap();

        prop_assert_eq!(read_assigned(&updated, "PROXY_SITE"), Some(value));
        prop_assert_eq!(updated.matches("PROXY_SITE=\n").count(), copies - 1);
        prop_assert_eq!(updated.lines().count(), text.lines().count());
    }

    /// A script without the placeholder is reported, not rewritten
    #[test]
    fn substitute_first_missing_placeholder(body in "[a-z \n]{0,40}") {
        prop_assert!(substitute_first(&body, "PROXY_SITE", "x").is_none());
    }
}
