//! Type-safe configuration types for the installer
//!
//! Enumerations that would otherwise travel around as bare strings:
//! supported distributions, optional extensions and the TLS front-end mode.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Distribution id as found in `ID=` of `/etc/os-release`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum DistroId {
    Debian,
    Raspbian,
    Ubuntu,
    #[strum(serialize = "linuxmint")]
    LinuxMint,
    Pop,
}

/// Package naming family a distribution follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistroFamily {
    Debian,
    Ubuntu,
}

impl DistroId {
    /// Which family's package names apply
    pub fn family(self) -> DistroFamily {
        match self {
            Self::Debian | Self::Raspbian => DistroFamily::Debian,
            Self::Ubuntu | Self::LinuxMint | Self::Pop => DistroFamily::Ubuntu,
        }
    }
}

/// Optional Guacamole extension, installable after the core setup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Extension {
    Totp,
    Duo,
    Ldap,
    #[strum(serialize = "quickconnect")]
    QuickConnect,
    #[strum(serialize = "history-recording")]
    HistoryRecording,
}

impl Extension {
    /// Script that installs this extension
    pub fn script_name(self) -> &'static str {
        match self {
            Self::Totp => "add-auth-totp.sh",
            Self::Duo => "add-auth-duo.sh",
            Self::Ldap => "add-auth-ldap.sh",
            Self::QuickConnect => "add-xtra-quickconnect.sh",
            Self::HistoryRecording => "add-xtra-histrecstor.sh",
        }
    }
}

/// TLS front-end selected for the reverse proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum TlsMode {
    #[default]
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "self-signed")]
    SelfSigned,
    #[strum(serialize = "letsencrypt")]
    LetsEncrypt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_distro_ids_parse_os_release_values() {
        assert_eq!("debian".parse::<DistroId>().unwrap(), DistroId::Debian);
        assert_eq!("linuxmint".parse::<DistroId>().unwrap(), DistroId::LinuxMint);
        assert_eq!("pop".parse::<DistroId>().unwrap(), DistroId::Pop);
        assert!("fedora".parse::<DistroId>().is_err());
    }

    #[test]
    fn test_distro_family() {
        assert_eq!(DistroId::Raspbian.family(), DistroFamily::Debian);
        assert_eq!(DistroId::Pop.family(), DistroFamily::Ubuntu);
    }

    #[test]
    fn test_extension_names_round_trip() {
        for ext in Extension::iter() {
            let parsed: Extension = ext.to_string().parse().unwrap();
            assert_eq!(parsed, ext);
            assert!(ext.script_name().ends_with(".sh"));
        }
        assert_eq!(
            "history-recording".parse::<Extension>().unwrap(),
            Extension::HistoryRecording
        );
    }
}
