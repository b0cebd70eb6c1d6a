//! Configuration collection.
//!
//! Resolves every installation option exactly once, in priority order:
//! preset value, interactive answer, computed default. Conditional options
//! are only asked when the option they depend on took the enabling value;
//! otherwise they take their default without a prompt.
//!
//! # Input rules
//!
//! - Yes/no answers accept `y`, `yes`, `n`, `no` in any case. Anything else
//!   resolves to that option's own default (some options default to yes,
//!   others to no).
//! - Secrets need two equal, non-empty entries.
//! - Required fields re-prompt while blank.
//! - Re-prompting follows the [`RetryPolicy`].
//! - TOTP and Duo both enabled is fatal. Self-signed TLS and Let's Encrypt:
//!   picking one forces the other off; both preset on is rejected.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::{GUAC_VERSION, InstallConfig, MYSQLJ_VERSION};
use crate::config_file::{PresetConfig, non_empty};
use crate::error::{InstallerError, Result};
use crate::probe::HostFacts;
use crate::prompt::Prompter;
use crate::workarounds::OsOverrides;

pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_GUAC_DB: &str = "guacamole_db";
pub const DEFAULT_GUAC_USER: &str = "guacamole_user";
pub const DEFAULT_BACKUP_RETENTION: u32 = 30;
pub const DEFAULT_CERT_DAYS: u32 = 3650;

/// How often an invalid answer may be re-entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Keep asking until the answer is valid
    #[default]
    Unbounded,
    /// Give up with a validation error after this many attempts
    Bounded(u32),
}

impl RetryPolicy {
    /// Whether attempt number `attempt` (1-based) may still be made
    pub fn allows(self, attempt: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(max) => attempt <= max,
        }
    }
}

/// Interpret a yes/no answer, falling back to `default` for anything else.
pub fn parse_yes_no(answer: &str, default: bool) -> bool {
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes") {
        true
    } else if answer.eq_ignore_ascii_case("n") || answer.eq_ignore_ascii_case("no") {
        false
    } else {
        default
    }
}

/// Host-derived inputs the collector uses for defaults
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub facts: HostFacts,
    pub overrides: OsOverrides,
    pub work_dir: PathBuf,
    pub log_location: PathBuf,
}

/// Gathers a complete [`InstallConfig`]
pub struct Collector<'a> {
    prompter: &'a mut dyn Prompter,
    preset: &'a PresetConfig,
    ctx: &'a CollectContext,
    policy: RetryPolicy,
}

impl<'a> Collector<'a> {
    pub fn new(
        prompter: &'a mut dyn Prompter,
        preset: &'a PresetConfig,
        ctx: &'a CollectContext,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            prompter,
            preset,
            ctx,
            policy,
        }
    }

    /// Resolve every option.
    pub fn collect(mut self) -> Result<InstallConfig> {
        let preset = self.preset;
        let facts = &self.ctx.facts;

        // Host identity
        let hostname_default = if facts.hostname.is_empty() {
            "guacamole"
        } else {
            facts.hostname.as_str()
        };
        let server_name = self.text(
            &preset.server_name,
            "Enter Guacamole server hostname",
            hostname_default,
        )?;
        let local_domain = self.text(
            &preset.local_domain,
            "Enter local DNS search suffix",
            &facts.dns_suffix,
        )?;

        // Database
        let install_mysql = self.yes_no(preset.install_mysql, "Install MySQL locally?", true)?;
        let (secure_mysql, mysql_host, mysql_port, guac_db, guac_user, mysql_root_pwd) =
            if install_mysql {
                let secure = self.yes_no(
                    preset.secure_mysql,
                    "Apply MySQL secure configuration?",
                    true,
                )?;
                let host = non_empty(&preset.mysql_host).unwrap_or("localhost").to_string();
                let port = preset.mysql_port.unwrap_or(DEFAULT_MYSQL_PORT);
                let db = non_empty(&preset.guac_db).unwrap_or(DEFAULT_GUAC_DB).to_string();
                let user = non_empty(&preset.guac_user)
                    .unwrap_or(DEFAULT_GUAC_USER)
                    .to_string();
                let root_pwd = self.secret(&preset.mysql_root_pwd, "MySQL root password")?;
                (secure, host, port, db, user, root_pwd)
            } else {
                let host = self.required(
                    &preset.mysql_host,
                    "Enter remote MySQL server hostname or IP",
                )?;
                let port = self.number(
                    preset.mysql_port,
                    "Enter remote MySQL server port",
                    DEFAULT_MYSQL_PORT,
                )?;
                let db = self.text(
                    &preset.guac_db,
                    "Enter remote Guacamole database name",
                    DEFAULT_GUAC_DB,
                )?;
                let user = self.text(
                    &preset.guac_user,
                    "Enter remote Guacamole database user",
                    DEFAULT_GUAC_USER,
                )?;
                // Remote instances have no local root password step
                (false, host, port, db, user, String::new())
            };
        let guac_pwd = self.secret(&preset.guac_pwd, "Guacamole database user password")?;
        let db_tz = non_empty(&preset.db_tz)
            .unwrap_or(&facts.timezone)
            .to_string();

        // Extensions
        let install_totp = self.yes_no(
            preset.install_totp,
            "Add TOTP multi-factor authentication?",
            false,
        )?;
        let install_duo = self.yes_no(
            preset.install_duo,
            "Add Duo multi-factor authentication?",
            false,
        )?;
        if install_totp && install_duo {
            log::error!("TOTP and Duo both selected");
            return Err(InstallerError::ExclusiveOptions {
                first: "INSTALL_TOTP",
                second: "INSTALL_DUO",
            });
        }
        let install_ldap = self.yes_no(
            preset.install_ldap,
            "Add Active Directory LDAP authentication?",
            false,
        )?;
        let install_qconnect = self.yes_no(
            preset.install_qconnect,
            "Add the Quick Connect console feature?",
            false,
        )?;
        let install_histrec_viewer = self.yes_no(
            preset.install_histrec_viewer,
            "Add the history recording storage feature?",
            false,
        )?;

        // Backups
        let backup_email = self.text(
            &preset.backup_email,
            "Enter an email address for backup notifications (blank for none)",
            "",
        )?;
        let backup_retention = preset.backup_retention.unwrap_or(DEFAULT_BACKUP_RETENTION);

        // Reverse proxy & TLS
        let install_nginx = self.yes_no(
            preset.install_nginx,
            "Install an Nginx reverse proxy in front of Guacamole?",
            true,
        )?;

        let mut proxy_site = String::new();
        let mut self_sign = false;
        let mut cert_days = preset.cert_days.unwrap_or(DEFAULT_CERT_DAYS);
        let mut lets_encrypt = false;
        let mut le_dns_name = String::new();
        let mut le_email = String::new();

        if install_nginx {
            let site_default = if local_domain.is_empty() {
                server_name.clone()
            } else {
                format!("{}.{}", server_name, local_domain)
            };
            proxy_site = self.text(&preset.proxy_site, "Enter proxy site name", &site_default)?;

            if preset.self_sign == Some(true) && preset.lets_encrypt == Some(true) {
                return Err(InstallerError::ExclusiveOptions {
                    first: "SELF_SIGN",
                    second: "LETS_ENCRYPT",
                });
            }

            self_sign = if preset.lets_encrypt == Some(true) {
                false
            } else {
                self.yes_no(preset.self_sign, "Add self-signed TLS support to Nginx?", false)?
            };

            if self_sign {
                cert_days = self.number(
                    preset.cert_days,
                    "Enter self-signed certificate lifetime in days",
                    DEFAULT_CERT_DAYS,
                )?;
            } else {
                lets_encrypt = self.yes_no(
                    preset.lets_encrypt,
                    "Add Let's Encrypt TLS support to Nginx?",
                    false,
                )?;
            }

            if lets_encrypt {
                le_dns_name = self.required(
                    &preset.le_dns_name,
                    "Enter the public DNS name for the Let's Encrypt certificate",
                )?;
                le_email = self.email(
                    &preset.le_email,
                    "Enter the email address for Let's Encrypt notifications",
                )?;
            }
        } else if preset.self_sign == Some(true) || preset.lets_encrypt == Some(true) {
            log::warn!("TLS preset ignored: Nginx is not being installed");
        }

        let os = &facts.os;
        let overrides = &self.ctx.overrides;
        let config = InstallConfig {
            guac_version: GUAC_VERSION.to_string(),
            mysqlj_version: MYSQLJ_VERSION.to_string(),
            server_name,
            local_domain,
            default_ip: facts.default_ip.clone(),
            os_id: os.id.clone(),
            os_version: os.version_id.clone(),
            os_codename: os.effective_codename().to_string(),
            install_mysql,
            secure_mysql,
            mysql_host,
            mysql_port,
            guac_db,
            guac_user,
            guac_pwd,
            mysql_root_pwd,
            db_tz,
            mysql_version: overrides.mysql_version.to_string(),
            jpegturbo: overrides.jpegturbo.to_string(),
            libpng: overrides.libpng.to_string(),
            install_totp,
            install_duo,
            install_ldap,
            install_qconnect,
            install_histrec_viewer,
            backup_email,
            backup_retention,
            rdp_share_label: "RDP_SHARE".to_string(),
            rdp_printer_label: "RDP_PRINTER".to_string(),
            install_nginx,
            proxy_site,
            self_sign,
            cert_days,
            cert_country: "US".to_string(),
            cert_state: "State".to_string(),
            cert_location: "City".to_string(),
            cert_org: "Organisation".to_string(),
            cert_ou: "IT".to_string(),
            lets_encrypt,
            le_dns_name,
            le_email,
            work_dir: self.ctx.work_dir.clone(),
            log_location: self.ctx.log_location.clone(),
        };

        config.check_exclusive()?;
        log::info!("Configuration collected for {}", config.server_name);
        Ok(config)
    }

    fn yes_no(&mut self, preset: Option<bool>, prompt: &str, default: bool) -> Result<bool> {
        if let Some(value) = preset {
            return Ok(value);
        }
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let answer = self.prompter.ask(&format!("{} {}", prompt, hint))?;
        Ok(parse_yes_no(&answer, default))
    }

    fn text(&mut self, preset: &Option<String>, prompt: &str, default: &str) -> Result<String> {
        if let Some(value) = non_empty(preset) {
            return Ok(value.to_string());
        }
        let full = if default.is_empty() {
            prompt.to_string()
        } else {
            format!("{} [default {}]", prompt, default)
        };
        let answer = self.prompter.ask(&full)?;
        let answer = answer.trim();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        })
    }

    fn required(&mut self, preset: &Option<String>, prompt: &str) -> Result<String> {
        if let Some(value) = non_empty(preset) {
            return Ok(value.to_string());
        }
        let mut attempt = 1;
        loop {
            let answer = self.prompter.ask(prompt)?;
            let answer = answer.trim();
            if !answer.is_empty() {
                return Ok(answer.to_string());
            }
            self.prompter.say("This value cannot be blank.");
            attempt += 1;
            self.check_attempt(attempt, prompt)?;
        }
    }

    /// Like [`Self::required`], but the answer must look like an address
    fn email(&mut self, preset: &Option<String>, prompt: &str) -> Result<String> {
        if let Some(value) = non_empty(preset) {
            return Ok(value.to_string());
        }
        let mut attempt = 1;
        loop {
            let answer = self.prompter.ask(prompt)?;
            let answer = answer.trim();
            if answer.contains('@') {
                return Ok(answer.to_string());
            }
            if answer.is_empty() {
                self.prompter.say("This value cannot be blank.");
            } else {
                self.prompter.say(&format!("'{}' is not an email address.", answer));
            }
            attempt += 1;
            self.check_attempt(attempt, prompt)?;
        }
    }

    fn number<T>(&mut self, preset: Option<T>, prompt: &str, default: T) -> Result<T>
    where
        T: FromStr + Display + Copy,
    {
        if let Some(value) = preset {
            return Ok(value);
        }
        let full = format!("{} [default {}]", prompt, default);
        let mut attempt = 1;
        loop {
            let answer = self.prompter.ask(&full)?;
            let answer = answer.trim();
            if answer.is_empty() {
                return Ok(default);
            }
            if let Ok(value) = answer.parse::<T>() {
                return Ok(value);
            }
            self.prompter.say(&format!("'{}' is not a valid number.", answer));
            attempt += 1;
            self.check_attempt(attempt, prompt)?;
        }
    }

    fn secret(&mut self, preset: &Option<String>, label: &str) -> Result<String> {
        if let Some(value) = preset.as_deref().filter(|v| !v.is_empty()) {
            return Ok(value.to_string());
        }
        let mut attempt = 1;
        loop {
            let first = self.prompter.ask_secret(&format!("Enter {}", label))?;
            let second = self.prompter.ask_secret(&format!("Confirm {}", label))?;
            if first.is_empty() {
                self.prompter.say("Password cannot be blank. Please try again.");
            } else if first != second {
                self.prompter.say("Passwords do not match. Please try again.");
            } else {
                return Ok(first);
            }
            attempt += 1;
            self.check_attempt(attempt, label)?;
        }
    }

    fn check_attempt(&self, attempt: u32, what: &str) -> Result<()> {
        if self.policy.allows(attempt) {
            Ok(())
        } else {
            Err(InstallerError::validation(format!(
                "no valid answer for '{}' after {} attempts",
                what,
                attempt - 1
            )))
        }
    }
}
