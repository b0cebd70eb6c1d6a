//! The resolved installation configuration.
//!
//! `InstallConfig` is built once by the collector and never mutated after
//! that: every later stage borrows it immutably. The environment contract
//! shared with the step scripts is produced by [`InstallConfig::to_env_vars`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{InstallerError, Result};
use crate::types::TlsMode;

/// Guacamole release installed by default
pub const GUAC_VERSION: &str = "1.5.5";
/// MySQL Connector/J release installed by default
pub const MYSQLJ_VERSION: &str = "9.1.0";
/// Apache mirror hosting Guacamole release artifacts
pub const GUAC_DOWNLOAD_BASE: &str = "https://apache.org/dyn/closer.lua/guacamole";

/// Fully resolved installation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    // Versions
    pub guac_version: String,
    pub mysqlj_version: String,

    // Host identity
    pub server_name: String,
    pub local_domain: String,
    pub default_ip: String,
    pub os_id: String,
    pub os_version: String,
    pub os_codename: String,

    // Database
    pub install_mysql: bool,
    pub secure_mysql: bool,
    pub mysql_host: String,
    pub mysql_port: u16,
    pub guac_db: String,
    pub guac_user: String,
    pub guac_pwd: String,
    pub mysql_root_pwd: String,
    pub db_tz: String,
    pub mysql_version: String,

    // Build packages (OS dependent)
    pub jpegturbo: String,
    pub libpng: String,

    // Extensions
    pub install_totp: bool,
    pub install_duo: bool,
    pub install_ldap: bool,
    pub install_qconnect: bool,
    pub install_histrec_viewer: bool,

    // Backups & RDP defaults
    pub backup_email: String,
    pub backup_retention: u32,
    pub rdp_share_label: String,
    pub rdp_printer_label: String,

    // Reverse proxy
    pub install_nginx: bool,
    pub proxy_site: String,

    // TLS
    pub self_sign: bool,
    pub cert_days: u32,
    pub cert_country: String,
    pub cert_state: String,
    pub cert_location: String,
    pub cert_org: String,
    pub cert_ou: String,
    pub lets_encrypt: bool,
    pub le_dns_name: String,
    pub le_email: String,

    // Run locations
    pub work_dir: PathBuf,
    pub log_location: PathBuf,
}

impl InstallConfig {
    /// Download link for the Guacamole release
    pub fn guac_source_link(&self) -> String {
        format!(
            "{}/{}/source/guacamole-server-{}.tar.gz?action=download",
            GUAC_DOWNLOAD_BASE, self.guac_version, self.guac_version
        )
    }

    /// Which TLS step, if any, fronts the reverse proxy
    pub fn tls_mode(&self) -> TlsMode {
        if !self.install_nginx {
            TlsMode::None
        } else if self.self_sign {
            TlsMode::SelfSigned
        } else if self.lets_encrypt {
            TlsMode::LetsEncrypt
        } else {
            TlsMode::None
        }
    }

    /// Check the exclusivity invariants.
    ///
    /// TOTP and Duo cannot both be installed, and only one TLS variant may
    /// be selected.
    pub fn check_exclusive(&self) -> Result<()> {
        check_exclusive_pair(self.install_totp, self.install_duo, "INSTALL_TOTP", "INSTALL_DUO")?;
        check_exclusive_pair(self.self_sign, self.lets_encrypt, "SELF_SIGN", "LETS_ENCRYPT")
    }

    /// Convert to environment variables for the step scripts
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let flag = |b: bool| b.to_string();
        vec![
            ("GUAC_VERSION".to_string(), self.guac_version.clone()),
            ("GUAC_SOURCE_LINK".to_string(), self.guac_source_link()),
            ("MYSQLJ_VERSION".to_string(), self.mysqlj_version.clone()),
            ("SERVER_NAME".to_string(), self.server_name.clone()),
            ("LOCAL_DOMAIN".to_string(), self.local_domain.clone()),
            ("DEFAULT_IP".to_string(), self.default_ip.clone()),
            ("OS_FLAVOUR".to_string(), self.os_id.clone()),
            ("OS_VERSION".to_string(), self.os_version.clone()),
            ("OS_CODENAME".to_string(), self.os_codename.clone()),
            ("INSTALL_MYSQL".to_string(), flag(self.install_mysql)),
            ("SECURE_MYSQL".to_string(), flag(self.secure_mysql)),
            ("MYSQL_HOST".to_string(), self.mysql_host.clone()),
            ("MYSQL_PORT".to_string(), self.mysql_port.to_string()),
            ("GUAC_DB".to_string(), self.guac_db.clone()),
            ("GUAC_USER".to_string(), self.guac_user.clone()),
            ("GUAC_PWD".to_string(), self.guac_pwd.clone()),
            ("MYSQL_ROOT_PWD".to_string(), self.mysql_root_pwd.clone()),
            ("DB_TZ".to_string(), self.db_tz.clone()),
            ("MYSQL_VERSION".to_string(), self.mysql_version.clone()),
            ("JPEGTURBO".to_string(), self.jpegturbo.clone()),
            ("LIBPNG".to_string(), self.libpng.clone()),
            ("INSTALL_TOTP".to_string(), flag(self.install_totp)),
            ("INSTALL_DUO".to_string(), flag(self.install_duo)),
            ("INSTALL_LDAP".to_string(), flag(self.install_ldap)),
            ("INSTALL_QCONNECT".to_string(), flag(self.install_qconnect)),
            (
                "INSTALL_HISTREC_VIEWER".to_string(),
                flag(self.install_histrec_viewer),
            ),
            ("BACKUP_EMAIL".to_string(), self.backup_email.clone()),
            (
                "BACKUP_RETENTION".to_string(),
                self.backup_retention.to_string(),
            ),
            ("RDP_SHARE_LABEL".to_string(), self.rdp_share_label.clone()),
            (
                "RDP_PRINTER_LABEL".to_string(),
                self.rdp_printer_label.clone(),
            ),
            ("INSTALL_NGINX".to_string(), flag(self.install_nginx)),
            ("PROXY_SITE".to_string(), self.proxy_site.clone()),
            ("SELF_SIGN".to_string(), flag(self.self_sign)),
            ("CERT_DAYS".to_string(), self.cert_days.to_string()),
            ("CERT_COUNTRY".to_string(), self.cert_country.clone()),
            ("CERT_STATE".to_string(), self.cert_state.clone()),
            ("CERT_LOCATION".to_string(), self.cert_location.clone()),
            ("CERT_ORG".to_string(), self.cert_org.clone()),
            ("CERT_OU".to_string(), self.cert_ou.clone()),
            ("LETS_ENCRYPT".to_string(), flag(self.lets_encrypt)),
            ("LE_DNS_NAME".to_string(), self.le_dns_name.clone()),
            ("LE_EMAIL".to_string(), self.le_email.clone()),
            (
                "DOWNLOAD_DIR".to_string(),
                self.work_dir.display().to_string(),
            ),
            (
                "LOG_LOCATION".to_string(),
                self.log_location.display().to_string(),
            ),
        ]
    }

    /// Human readable summary with secrets masked
    pub fn summary(&self) -> Vec<String> {
        let mask = |s: &str| if s.is_empty() { "(none)" } else { "********" };
        let yes_no = |b: bool| if b { "yes" } else { "no" };

        let mut lines = vec![
            format!("Server name:          {}", self.server_name),
            format!("Local DNS suffix:     {}", self.local_domain),
            format!("Default IP:           {}", self.default_ip),
            format!("Guacamole version:    {}", self.guac_version),
            format!("Install MySQL:        {}", yes_no(self.install_mysql)),
            format!(
                "Database:             {}@{}:{}/{}",
                self.guac_user, self.mysql_host, self.mysql_port, self.guac_db
            ),
            format!("Guacamole DB pwd:     {}", mask(&self.guac_pwd)),
        ];
        if self.install_mysql {
            lines.push(format!("MySQL root pwd:       {}", mask(&self.mysql_root_pwd)));
            lines.push(format!("Secure MySQL:         {}", yes_no(self.secure_mysql)));
        }
        lines.push(format!("TOTP:                 {}", yes_no(self.install_totp)));
        lines.push(format!("Duo:                  {}", yes_no(self.install_duo)));
        lines.push(format!("LDAP:                 {}", yes_no(self.install_ldap)));
        lines.push(format!("Quick Connect:        {}", yes_no(self.install_qconnect)));
        lines.push(format!(
            "History viewer:       {}",
            yes_no(self.install_histrec_viewer)
        ));
        lines.push(format!("Nginx reverse proxy:  {}", yes_no(self.install_nginx)));
        if self.install_nginx {
            lines.push(format!("Proxy site:           {}", self.proxy_site));
            lines.push(format!("TLS:                  {}", self.tls_mode()));
        }
        lines
    }
}

fn check_exclusive_pair(
    a: bool,
    b: bool,
    first: &'static str,
    second: &'static str,
) -> Result<()> {
    if a && b {
        return Err(InstallerError::ExclusiveOptions { first, second });
    }
    Ok(())
}
