//! Script Execution Contracts
//!
//! Every step script fetched into the work directory has a manifest that
//! declares:
//! - the placeholder variables it carries as bare `NAME=` assignments, which
//!   the propagator fills and the runner also exports into its environment
//! - optional variables with defaults
//! - its role (pipeline step, extension, utility)
//!
//! Rust validates the manifest before the script runs, so a step never
//! starts with an empty or malformed value it depends on.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use strum::Display;
use thiserror::Error;

use crate::types::Extension;

/// Errors that can occur during manifest operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// No manifest registered for the script
    #[error("Manifest not found for script: {script}")]
    NotFound { script: String },

    /// Invalid manifest definition
    #[error("Invalid manifest format: {reason}")]
    InvalidFormat { reason: String },

    /// Required environment variable missing
    #[error("Required environment variable '{name}' is not set (script: {script})")]
    MissingEnvVar { script: String, name: String },

    /// Environment variable value doesn't satisfy its requirement
    #[error("Environment variable '{name}' has invalid value '{value}': {reason}")]
    InvalidEnvValue {
        name: String,
        value: String,
        reason: String,
    },

    /// Script file not found
    #[error("Script file not found: {path}")]
    ScriptNotFound { path: String },
}

/// What a script is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScriptRole {
    /// Runs as part of the installation pipeline
    Step,
    /// Left in the work directory for the operator to run later
    Extension,
    /// Scheduled or manual maintenance (backup, upgrade)
    Utility,
}

/// Environment variable requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRequirement {
    /// Variable name (e.g., "PROXY_SITE")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Optional pattern for validation (`^prefix`, `suffix$`, `^exact$` or substring)
    pub pattern: Option<String>,

    /// Closed set of accepted values
    pub allowed: Vec<String>,

    /// Whether the variable can be empty
    pub allow_empty: bool,
}

impl EnvRequirement {
    /// Create a new required environment variable
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            pattern: None,
            allowed: Vec::new(),
            allow_empty: false,
        }
    }

    /// A `true`/`false` flag as rendered for Bash
    pub fn flag(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description).one_of(&["true", "false"])
    }

    /// Add a validation pattern
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Restrict to a closed set of values
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Allow empty values
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Validate a value against this requirement
    pub fn validate(&self, value: &str) -> Result<(), ManifestError> {
        let invalid = |reason: String| ManifestError::InvalidEnvValue {
            name: self.name.clone(),
            value: value.to_string(),
            reason,
        };

        if value.is_empty() {
            return if self.allow_empty {
                Ok(())
            } else {
                Err(invalid("value cannot be empty".to_string()))
            };
        }

        if !self.allowed.is_empty() && !self.allowed.iter().any(|a| a == value) {
            return Err(invalid(format!(
                "value must be one of: {}",
                self.allowed.join(", ")
            )));
        }

        if let Some(ref pattern) = self.pattern {
            let matches = if let Some(inner) = pattern
                .strip_prefix('^')
                .and_then(|p| p.strip_suffix('$'))
            {
                value == inner
            } else if let Some(prefix) = pattern.strip_prefix('^') {
                value.starts_with(prefix)
            } else if let Some(suffix) = pattern.strip_suffix('$') {
                value.ends_with(suffix)
            } else {
                value.contains(pattern.as_str())
            };

            if !matches {
                return Err(invalid(format!("value must match pattern: {}", pattern)));
            }
        }

        Ok(())
    }
}

/// Optional environment variable with default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionalEnv {
    /// Variable name
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Default value if not set
    pub default: String,
}

impl OptionalEnv {
    /// Create a new optional environment variable
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default: default.into(),
        }
    }
}

/// Script manifest defining the execution contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptManifest {
    /// Script file name, relative to the work directory
    pub script: String,

    /// Human-readable description of what the script does
    pub description: String,

    /// Where the script fits
    pub role: ScriptRole,

    /// Placeholder variables (script refuses to work without these)
    pub required_env: Vec<EnvRequirement>,

    /// Optional placeholder variables with defaults
    pub optional_env: Vec<OptionalEnv>,

    /// Exit codes treated as success
    pub valid_exit_codes: Vec<i32>,
}

impl ScriptManifest {
    /// Create a new manifest builder
    pub fn builder(script: impl Into<String>, description: impl Into<String>) -> ManifestBuilder {
        ManifestBuilder::new(script, description)
    }

    /// Names of every placeholder assignment in the script, required first
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.required_env
            .iter()
            .map(|r| r.name.as_str())
            .chain(self.optional_env.iter().map(|o| o.name.as_str()))
    }

    fn validate_structure(&self) -> Result<(), ManifestError> {
        if !self.script.ends_with(".sh") {
            return Err(ManifestError::InvalidFormat {
                reason: format!("'{}' is not a shell script", self.script),
            });
        }

        let mut seen = HashSet::new();
        for name in self.placeholders() {
            if !seen.insert(name) {
                return Err(ManifestError::InvalidFormat {
                    reason: format!("Duplicate variable {} in {}", name, self.script),
                });
            }
        }

        Ok(())
    }

    /// Validate that all requirements are met for execution
    ///
    /// # Arguments
    /// * `env` - Environment variables that will be passed to the script
    /// * `scripts_dir` - Directory holding the script (checked for existence)
    pub fn validate_execution(
        &self,
        env: &HashMap<String, String>,
        scripts_dir: Option<&Path>,
    ) -> Result<ValidatedExecution, ManifestError> {
        let script_path = match scripts_dir {
            Some(dir) => {
                let path = dir.join(&self.script);
                if !path.is_file() {
                    return Err(ManifestError::ScriptNotFound {
                        path: path.display().to_string(),
                    });
                }
                path
            }
            None => PathBuf::from(&self.script),
        };

        for req in &self.required_env {
            match env.get(&req.name) {
                None => {
                    return Err(ManifestError::MissingEnvVar {
                        script: self.script.clone(),
                        name: req.name.clone(),
                    });
                }
                Some(value) => req.validate(value)?,
            }
        }

        let mut final_env = env.clone();
        for opt in &self.optional_env {
            final_env
                .entry(opt.name.clone())
                .or_insert_with(|| opt.default.clone());
        }

        Ok(ValidatedExecution {
            script: self.script.clone(),
            script_path,
            environment: final_env,
            valid_exit_codes: self.valid_exit_codes.clone(),
        })
    }
}

/// Result of successful validation, ready for execution
#[derive(Debug, Clone)]
pub struct ValidatedExecution {
    /// Script file name
    pub script: String,

    /// Resolved path to the script
    pub script_path: PathBuf,

    /// Environment variables to pass (with defaults applied)
    pub environment: HashMap<String, String>,

    /// Valid exit codes for this script
    pub valid_exit_codes: Vec<i32>,
}

impl ValidatedExecution {
    /// Check if an exit code is valid for this script
    pub fn is_valid_exit_code(&self, code: i32) -> bool {
        self.valid_exit_codes.contains(&code)
    }
}

/// Builder for creating ScriptManifest instances
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    script: String,
    description: String,
    role: ScriptRole,
    required_env: Vec<EnvRequirement>,
    optional_env: Vec<OptionalEnv>,
    valid_exit_codes: Vec<i32>,
}

impl ManifestBuilder {
    pub fn new(script: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            description: description.into(),
            role: ScriptRole::Step,
            required_env: Vec::new(),
            optional_env: Vec::new(),
            valid_exit_codes: vec![0],
        }
    }

    pub fn role(mut self, role: ScriptRole) -> Self {
        self.role = role;
        self
    }

    /// Add a required environment variable
    pub fn require_env(mut self, req: EnvRequirement) -> Self {
        self.required_env.push(req);
        self
    }

    /// Add several required variables with no extra constraints
    pub fn require_all(mut self, names: &[(&str, &str)]) -> Self {
        self.required_env
            .extend(names.iter().map(|(n, d)| EnvRequirement::new(*n, *d)));
        self
    }

    /// Add an optional environment variable with default
    pub fn optional_env(mut self, opt: OptionalEnv) -> Self {
        self.optional_env.push(opt);
        self
    }

    /// Set valid exit codes
    pub fn valid_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.valid_exit_codes = codes;
        self
    }

    /// Build the manifest
    pub fn build(self) -> Result<ScriptManifest, ManifestError> {
        let manifest = ScriptManifest {
            script: self.script,
            description: self.description,
            role: self.role,
            required_env: self.required_env,
            optional_env: self.optional_env,
            valid_exit_codes: self.valid_exit_codes,
        };
        manifest.validate_structure()?;
        Ok(manifest)
    }
}

pub const CORE_SCRIPT: &str = "2-install-guacamole.sh";
pub const NGINX_SCRIPT: &str = "3-install-nginx.sh";
pub const SELF_SIGNED_SCRIPT: &str = "4a-install-tls-self-signed-nginx.sh";
pub const LETSENCRYPT_SCRIPT: &str = "4b-install-tls-letsencrypt-nginx.sh";
pub const BACKUP_SCRIPT: &str = "backup-guacamole.sh";
pub const UPGRADE_SCRIPT: &str = "upgrade-guacamole.sh";

fn log_location() -> EnvRequirement {
    EnvRequirement::new("LOG_LOCATION", "Install log file").with_pattern("^/")
}

fn download_dir() -> EnvRequirement {
    EnvRequirement::new("DOWNLOAD_DIR", "Work directory holding the scripts").with_pattern("^/")
}

/// Registry of known script manifests
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    manifests: HashMap<String, ScriptManifest>,
    order: Vec<String>,
}

impl ManifestRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manifest
    pub fn register(&mut self, manifest: ScriptManifest) {
        if !self.manifests.contains_key(&manifest.script) {
            self.order.push(manifest.script.clone());
        }
        self.manifests.insert(manifest.script.clone(), manifest);
    }

    /// Get a manifest by script name
    pub fn get(&self, script: &str) -> Option<&ScriptManifest> {
        self.manifests.get(script)
    }

    /// Look up a manifest, failing with `NotFound`
    pub fn require(&self, script: &str) -> Result<&ScriptManifest, ManifestError> {
        self.get(script).ok_or_else(|| ManifestError::NotFound {
            script: script.to_string(),
        })
    }

    /// Validate and prepare execution for a script
    pub fn validate_execution(
        &self,
        script: &str,
        env: &HashMap<String, String>,
        scripts_dir: Option<&Path>,
    ) -> Result<ValidatedExecution, ManifestError> {
        self.require(script)?.validate_execution(env, scripts_dir)
    }

    /// All manifests in registration order
    pub fn all(&self) -> impl Iterator<Item = &ScriptManifest> {
        self.order.iter().filter_map(|name| self.manifests.get(name))
    }

    /// Script names in registration order
    pub fn script_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Manifests with the given role, in registration order
    pub fn by_role(&self, role: ScriptRole) -> impl Iterator<Item = &ScriptManifest> {
        self.all().filter(move |m| m.role == role)
    }

    /// Registry with the manifests of every script the installer ships
    pub fn with_core_manifests() -> Result<Self, ManifestError> {
        let mut registry = Self::new();

        registry.register(
            ScriptManifest::builder(
                CORE_SCRIPT,
                "Build guacd, deploy the web app and configure the database",
            )
            .require_all(&[
                ("GUAC_VERSION", "Guacamole release"),
                ("GUAC_SOURCE_LINK", "Download link for the release"),
                ("MYSQLJ_VERSION", "MySQL Connector/J release"),
                ("SERVER_NAME", "Server hostname"),
                ("LOCAL_DOMAIN", "Local DNS suffix"),
                ("OS_FLAVOUR", "Distribution id"),
                ("OS_VERSION", "Distribution version"),
                ("OS_CODENAME", "Distribution codename"),
                ("MYSQL_HOST", "Database host"),
                ("MYSQL_PORT", "Database port"),
                ("GUAC_DB", "Guacamole database name"),
                ("GUAC_USER", "Guacamole database user"),
                ("GUAC_PWD", "Guacamole database password"),
                ("DB_TZ", "Database time zone"),
                ("JPEGTURBO", "libjpeg-turbo dev package"),
                ("LIBPNG", "libpng dev package"),
                ("BACKUP_RETENTION", "Days of database backups to keep"),
                ("RDP_SHARE_LABEL", "RDP shared drive label"),
                ("RDP_PRINTER_LABEL", "RDP printer label"),
            ])
            .require_env(EnvRequirement::flag("INSTALL_MYSQL", "Install MySQL locally"))
            .require_env(EnvRequirement::flag("SECURE_MYSQL", "Harden the local MySQL"))
            .require_env(
                EnvRequirement::new("MYSQL_ROOT_PWD", "Local MySQL root password").allow_empty(),
            )
            .require_env(
                EnvRequirement::new("MYSQL_VERSION", "Pinned MariaDB version").allow_empty(),
            )
            .require_env(EnvRequirement::flag("INSTALL_TOTP", "Add TOTP extension"))
            .require_env(EnvRequirement::flag("INSTALL_DUO", "Add Duo extension"))
            .require_env(EnvRequirement::flag("INSTALL_LDAP", "Add LDAP extension"))
            .require_env(EnvRequirement::flag(
                "INSTALL_QCONNECT",
                "Add quick connect extension",
            ))
            .require_env(EnvRequirement::flag(
                "INSTALL_HISTREC_VIEWER",
                "Add history recording extension",
            ))
            .require_env(
                EnvRequirement::new("BACKUP_EMAIL", "Backup notification address").allow_empty(),
            )
            .require_env(download_dir())
            .require_env(log_location())
            .build()?,
        );

        registry.register(
            ScriptManifest::builder(NGINX_SCRIPT, "Install Nginx as a reverse proxy")
                .require_env(EnvRequirement::new("PROXY_SITE", "Nginx site name"))
                .require_env(EnvRequirement::new("GUAC_VERSION", "Guacamole release"))
                .require_env(log_location())
                .build()?,
        );

        registry.register(
            ScriptManifest::builder(SELF_SIGNED_SCRIPT, "Add self-signed TLS to Nginx")
                .require_all(&[
                    ("PROXY_SITE", "Nginx site name"),
                    ("CERT_DAYS", "Certificate lifetime in days"),
                    ("CERT_COUNTRY", "Certificate country"),
                    ("CERT_STATE", "Certificate state"),
                    ("CERT_LOCATION", "Certificate location"),
                    ("CERT_ORG", "Certificate organisation"),
                    ("CERT_OU", "Certificate organisational unit"),
                ])
                // Hosts without a default route have no address for the SAN
                .require_env(
                    EnvRequirement::new("DEFAULT_IP", "Address for the certificate SAN")
                        .allow_empty(),
                )
                .require_env(download_dir())
                .require_env(log_location())
                .build()?,
        );

        registry.register(
            ScriptManifest::builder(LETSENCRYPT_SCRIPT, "Add Let's Encrypt TLS to Nginx")
                .require_all(&[
                    ("PROXY_SITE", "Nginx site name"),
                    ("LE_DNS_NAME", "Public DNS name"),
                ])
                .require_env(EnvRequirement::new("LE_EMAIL", "Notification email").with_pattern("@"))
                .require_env(log_location())
                .build()?,
        );

        for ext in [
            Extension::Totp,
            Extension::Duo,
            Extension::Ldap,
            Extension::QuickConnect,
            Extension::HistoryRecording,
        ] {
            registry.register(
                ScriptManifest::builder(ext.script_name(), format!("Add the {} extension", ext))
                    .role(ScriptRole::Extension)
                    .require_all(&[
                        ("GUAC_VERSION", "Guacamole release"),
                        ("GUAC_SOURCE_LINK", "Download link for the release"),
                    ])
                    .require_env(download_dir())
                    .require_env(log_location())
                    .build()?,
            );
        }

        registry.register(
            ScriptManifest::builder(BACKUP_SCRIPT, "Dump the Guacamole database")
                .role(ScriptRole::Utility)
                .require_all(&[
                    ("MYSQL_HOST", "Database host"),
                    ("MYSQL_PORT", "Database port"),
                    ("GUAC_DB", "Guacamole database name"),
                    ("GUAC_USER", "Guacamole database user"),
                    ("GUAC_PWD", "Guacamole database password"),
                    ("BACKUP_RETENTION", "Days of backups to keep"),
                ])
                .require_env(
                    EnvRequirement::new("BACKUP_EMAIL", "Backup notification address")
                        .allow_empty(),
                )
                .require_env(download_dir())
                .optional_env(OptionalEnv::new(
                    "BACKUP_SUBDIR",
                    "Directory under the work directory holding dumps",
                    "mysqlbackups",
                ))
                .build()?,
        );

        registry.register(
            ScriptManifest::builder(UPGRADE_SCRIPT, "Upgrade Guacamole in place")
                .role(ScriptRole::Utility)
                .require_all(&[
                    ("GUAC_VERSION", "Guacamole release"),
                    ("GUAC_SOURCE_LINK", "Download link for the release"),
                    ("MYSQLJ_VERSION", "MySQL Connector/J release"),
                    ("MYSQL_HOST", "Database host"),
                    ("MYSQL_PORT", "Database port"),
                    ("GUAC_DB", "Guacamole database name"),
                    ("GUAC_USER", "Guacamole database user"),
                    ("GUAC_PWD", "Guacamole database password"),
                ])
                .require_env(EnvRequirement::flag("INSTALL_MYSQL", "Local MySQL present"))
                .require_env(
                    EnvRequirement::new("MYSQL_ROOT_PWD", "Local MySQL root password").allow_empty(),
                )
                .require_env(download_dir())
                .require_env(log_location())
                .build()?,
        );

        Ok(registry)
    }
}

impl From<ManifestError> for crate::error::InstallerError {
    fn from(err: ManifestError) -> Self {
        crate::error::InstallerError::Manifest(err.to_string())
    }
}
