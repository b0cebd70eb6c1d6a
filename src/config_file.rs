//! Preset files: silent option values saved and loaded as JSON.
//!
//! Every field is optional. A present, non-empty value suppresses the
//! matching interactive prompt; anything missing is asked for or falls
//! back to its default.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::InstallConfig;
use crate::error::{InstallerError, Result};

/// Silent option values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresetConfig {
    pub server_name: Option<String>,
    pub local_domain: Option<String>,

    pub install_mysql: Option<bool>,
    pub secure_mysql: Option<bool>,
    pub mysql_host: Option<String>,
    pub mysql_port: Option<u16>,
    pub guac_db: Option<String>,
    pub guac_user: Option<String>,
    pub guac_pwd: Option<String>,
    pub mysql_root_pwd: Option<String>,
    pub db_tz: Option<String>,

    pub install_totp: Option<bool>,
    pub install_duo: Option<bool>,
    pub install_ldap: Option<bool>,
    pub install_qconnect: Option<bool>,
    pub install_histrec_viewer: Option<bool>,

    pub backup_email: Option<String>,
    pub backup_retention: Option<u32>,

    pub install_nginx: Option<bool>,
    pub proxy_site: Option<String>,
    pub self_sign: Option<bool>,
    pub cert_days: Option<u32>,
    pub lets_encrypt: Option<bool>,
    pub le_dns_name: Option<String>,
    pub le_email: Option<String>,
}

impl PresetConfig {
    /// Load a preset from a JSON file and validate it
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read preset from {:?}", path.as_ref()))
            .map_err(|e| InstallerError::config(format!("{:#}", e)))?;

        let preset: Self = serde_json::from_str(&content)
            .map_err(|e| InstallerError::config(format!("Failed to parse preset JSON: {}", e)))?;
        preset.validate()?;

        Ok(preset)
    }

    /// Save the preset as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write preset to {:?}", path.as_ref()))
            .map_err(|e| InstallerError::config(format!("{:#}", e)))?;
        Ok(())
    }

    /// Reject presets that can never resolve to a valid configuration
    pub fn validate(&self) -> Result<()> {
        if self.install_totp == Some(true) && self.install_duo == Some(true) {
            return Err(InstallerError::ExclusiveOptions {
                first: "INSTALL_TOTP",
                second: "INSTALL_DUO",
            });
        }
        if self.self_sign == Some(true) && self.lets_encrypt == Some(true) {
            return Err(InstallerError::ExclusiveOptions {
                first: "SELF_SIGN",
                second: "LETS_ENCRYPT",
            });
        }
        if self.mysql_port == Some(0) {
            return Err(InstallerError::config("mysql_port must be between 1 and 65535"));
        }
        if self.cert_days == Some(0) {
            return Err(InstallerError::config("cert_days must be at least 1"));
        }
        if let Some(email) = non_empty(&self.le_email) {
            if !email.contains('@') {
                return Err(InstallerError::config(format!(
                    "le_email '{}' is not an email address",
                    email
                )));
            }
        }
        Ok(())
    }

    /// Preset capturing a resolved configuration, secrets left out
    pub fn from_resolved(cfg: &InstallConfig) -> Self {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            server_name: opt(&cfg.server_name),
            local_domain: opt(&cfg.local_domain),
            install_mysql: Some(cfg.install_mysql),
            secure_mysql: Some(cfg.secure_mysql),
            mysql_host: opt(&cfg.mysql_host),
            mysql_port: Some(cfg.mysql_port),
            guac_db: opt(&cfg.guac_db),
            guac_user: opt(&cfg.guac_user),
            guac_pwd: None,
            mysql_root_pwd: None,
            db_tz: opt(&cfg.db_tz),
            install_totp: Some(cfg.install_totp),
            install_duo: Some(cfg.install_duo),
            install_ldap: Some(cfg.install_ldap),
            install_qconnect: Some(cfg.install_qconnect),
            install_histrec_viewer: Some(cfg.install_histrec_viewer),
            backup_email: opt(&cfg.backup_email),
            backup_retention: Some(cfg.backup_retention),
            install_nginx: Some(cfg.install_nginx),
            proxy_site: opt(&cfg.proxy_site),
            self_sign: Some(cfg.self_sign),
            cert_days: Some(cfg.cert_days),
            lets_encrypt: Some(cfg.lets_encrypt),
            le_dns_name: opt(&cfg.le_dns_name),
            le_email: opt(&cfg.le_email),
        }
    }
}

/// A preset string that counts as "set": present and not blank
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_partial_preset() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"install_mysql": false, "mysql_host": "db.lan"}}"#).unwrap();

        let preset = PresetConfig::load_from_file(file.path()).unwrap();
        assert_eq!(preset.install_mysql, Some(false));
        assert_eq!(preset.mysql_host.as_deref(), Some("db.lan"));
        assert!(preset.guac_pwd.is_none());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = PresetConfig::load_from_file("/nonexistent/preset.json");
        assert!(matches!(result, Err(InstallerError::Config(_))));
    }

    #[test]
    fn test_load_unknown_field_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"install_mysqll": true}}"#).unwrap();
        assert!(PresetConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_load_wrong_type_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"install_nginx": "maybe"}}"#).unwrap();
        assert!(PresetConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_totp_duo_conflict() {
        let preset = PresetConfig {
            install_totp: Some(true),
            install_duo: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            preset.validate(),
            Err(InstallerError::ExclusiveOptions { .. })
        ));
    }

    #[test]
    fn test_validate_tls_conflict() {
        let preset = PresetConfig {
            self_sign: Some(true),
            lets_encrypt: Some(true),
            ..Default::default()
        };
        assert!(preset.validate().is_err());

        let preset = PresetConfig {
            self_sign: Some(true),
            lets_encrypt: Some(false),
            ..Default::default()
        };
        assert!(preset.validate().is_ok());
    }

    #[test]
    fn test_validate_le_email() {
        let preset = PresetConfig {
            le_email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_from_resolved_drops_secrets() {
        let preset = PresetConfig::from_resolved(&sample_config());
        assert!(preset.guac_pwd.is_none());
        assert!(preset.mysql_root_pwd.is_none());
        assert_eq!(preset.server_name.as_deref(), Some("guac01"));
        assert!(preset.le_email.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let file = NamedTempFile::new().unwrap();
        let preset = PresetConfig::from_resolved(&sample_config());
        preset.save_to_file(file.path()).unwrap();

        let loaded = PresetConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, preset);
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(&Some("  x ".to_string())), Some("x"));
        assert_eq!(non_empty(&Some("   ".to_string())), None);
        assert_eq!(non_empty(&None), None);
    }
}
