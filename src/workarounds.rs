//! Distribution-specific package overrides.
//!
//! Package names and database versions differ between Debian-family and
//! Ubuntu-family releases, and a few releases need a pinned MariaDB from the
//! upstream repository. All of that lives in one table keyed by
//! (distribution, codename) so the set of workarounds stays auditable.

use crate::error::{InstallerError, Result};
use crate::probe::OsInfo;
use crate::types::{DistroFamily, DistroId};

/// Overrides applied for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsOverrides {
    /// libjpeg-turbo development package
    pub jpegturbo: &'static str,
    /// libpng development package
    pub libpng: &'static str,
    /// MariaDB version to pin; empty means the distribution default
    pub mysql_version: &'static str,
    /// Extra package repository the core step must add first
    pub extra_repo: Option<&'static str>,
}

const DEBIAN_DEFAULTS: OsOverrides = OsOverrides {
    jpegturbo: "libjpeg62-turbo-dev",
    libpng: "libpng-dev",
    mysql_version: "",
    extra_repo: None,
};

const UBUNTU_DEFAULTS: OsOverrides = OsOverrides {
    jpegturbo: "libjpeg-turbo8-dev",
    libpng: "libpng-dev",
    mysql_version: "",
    extra_repo: None,
};

const MARIADB_REPO: &str = "https://downloads.mariadb.com/MariaDB/mariadb_repo_setup";

/// Release-specific rows. A row replaces the family defaults entirely.
const RELEASE_OVERRIDES: &[(DistroFamily, &str, OsOverrides)] = &[
    (
        DistroFamily::Debian,
        "buster",
        OsOverrides {
            jpegturbo: "libjpeg62-turbo-dev",
            libpng: "libpng-dev",
            mysql_version: "10.11",
            extra_repo: Some(MARIADB_REPO),
        },
    ),
    (
        DistroFamily::Debian,
        "bullseye",
        OsOverrides {
            jpegturbo: "libjpeg62-turbo-dev",
            libpng: "libpng-dev",
            mysql_version: "10.11",
            extra_repo: Some(MARIADB_REPO),
        },
    ),
    (
        DistroFamily::Ubuntu,
        "bionic",
        OsOverrides {
            jpegturbo: "libjpeg-turbo8-dev",
            libpng: "libpng-dev",
            mysql_version: "10.11",
            extra_repo: Some(MARIADB_REPO),
        },
    ),
    (
        DistroFamily::Ubuntu,
        "focal",
        OsOverrides {
            jpegturbo: "libjpeg-turbo8-dev",
            libpng: "libpng-dev",
            mysql_version: "10.11",
            extra_repo: Some(MARIADB_REPO),
        },
    ),
];

/// Overrides for a supported distribution and release codename.
pub fn lookup(distro: DistroId, codename: &str) -> OsOverrides {
    let family = distro.family();

    RELEASE_OVERRIDES
        .iter()
        .find(|(fam, name, _)| *fam == family && *name == codename)
        .map(|(_, _, overrides)| overrides.clone())
        .unwrap_or_else(|| match family {
            DistroFamily::Debian => DEBIAN_DEFAULTS,
            DistroFamily::Ubuntu => UBUNTU_DEFAULTS,
        })
}

/// Overrides for the probed host, or a precondition error if unsupported.
pub fn for_host(os: &OsInfo) -> Result<OsOverrides> {
    let distro = os.distro().ok_or_else(|| {
        InstallerError::precondition(format!(
            "Unsupported distribution '{}'. Supported: Debian, Raspbian, Ubuntu, Linux Mint, Pop!_OS",
            if os.id.is_empty() { "unknown" } else { &os.id }
        ))
    })?;

    let overrides = lookup(distro, os.effective_codename());
    log::info!(
        "OS overrides for {} {}: {:?}",
        distro,
        os.effective_codename(),
        overrides
    );
    Ok(overrides)
}
