//! Host environment detection
//!
//! Read-only queries against the host that feed defaults into the
//! configuration collector: OS identity, the address on the default-route
//! interface, the DNS search suffix, the time zone and leftover artifacts
//! from an earlier run.
//!
//! # Design
//!
//! - **Never mutates**: every function here only reads files or kernel state
//! - **Parse functions are pure**: file contents come in as `&str` so the
//!   interesting logic is testable without a real host
//! - **No panics**: missing files yield empty/default values

use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::types::DistroId;

/// Name prefixes of build artifacts left behind by a previous run
pub const LEFTOVER_PREFIXES: &[&str] = &["guacamole-", "mysql-connector-j-"];

/// Suffix used when resolv.conf has neither `search` nor `domain`
pub const FALLBACK_DNS_SUFFIX: &str = "local";

/// Fields of `/etc/os-release` the installer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsInfo {
    /// `ID=`, lowercased
    pub id: String,
    /// `ID_LIKE=`, lowercased, space separated
    pub id_like: String,
    /// `VERSION_ID=`
    pub version_id: String,
    /// `VERSION_CODENAME=`
    pub codename: String,
    /// `UBUNTU_CODENAME=` or `DEBIAN_CODENAME=` for derivatives
    pub upstream_codename: String,
    /// `PRETTY_NAME=`
    pub pretty_name: String,
}

impl OsInfo {
    /// Parse the contents of an os-release file.
    pub fn parse(content: &str) -> Self {
        let mut info = OsInfo::default();

        for line in content.lines() {
            let Some((key, raw)) = line.split_once('=') else {
                continue;
            };
            let value = raw.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "ID" => info.id = value.to_lowercase(),
                "ID_LIKE" => info.id_like = value.to_lowercase(),
                "VERSION_ID" => info.version_id = value.to_string(),
                "VERSION_CODENAME" => info.codename = value.to_lowercase(),
                "UBUNTU_CODENAME" | "DEBIAN_CODENAME" => {
                    info.upstream_codename = value.to_lowercase()
                }
                "PRETTY_NAME" => info.pretty_name = value.to_string(),
                _ => {}
            }
        }

        info
    }

    /// Read `/etc/os-release`; an unreadable file yields empty fields.
    pub fn detect() -> Self {
        match fs::read_to_string("/etc/os-release") {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                log::warn!("Cannot read /etc/os-release: {}", e);
                Self::default()
            }
        }
    }

    /// Supported distribution this host runs, if any
    pub fn distro(&self) -> Option<DistroId> {
        self.id.parse().ok()
    }

    /// Codename used for package decisions (upstream codename for derivatives)
    pub fn effective_codename(&self) -> &str {
        if !self.upstream_codename.is_empty() {
            &self.upstream_codename
        } else {
            &self.codename
        }
    }
}

impl fmt::Display for OsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pretty_name.is_empty() {
            write!(f, "{} {} ({})", self.id, self.version_id, self.codename)
        } else {
            write!(f, "{}", self.pretty_name)
        }
    }
}

/// Everything probed from the host, gathered once at startup.
#[derive(Debug, Clone, Default)]
pub struct HostFacts {
    pub os: OsInfo,
    pub hostname: String,
    /// IPv4 address on the default-route interface, empty if none
    pub default_ip: String,
    pub dns_suffix: String,
    pub timezone: String,
}

impl HostFacts {
    /// Probe the running host.
    pub fn detect() -> Self {
        let facts = Self {
            os: OsInfo::detect(),
            hostname: detect_hostname(),
            default_ip: detect_default_ip(),
            dns_suffix: detect_dns_suffix(),
            timezone: detect_timezone(),
        };

        log::info!(
            "Host: os={}, hostname={}, ip={}, dns_suffix={}, tz={}",
            facts.os,
            facts.hostname,
            facts.default_ip,
            facts.dns_suffix,
            facts.timezone
        );

        facts
    }
}

// ============================================================================
// Network
// ============================================================================

/// Interface carrying the default route, from `/proc/net/route` contents.
///
/// Picks the lowest-metric route that is up with destination 0.0.0.0.
pub fn default_route_interface(route_table: &str) -> Option<String> {
    const RTF_UP: u32 = 0x1;

    route_table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 7 || fields[1] != "00000000" {
                return None;
            }
            let flags = u32::from_str_radix(fields[3], 16).ok()?;
            if flags & RTF_UP == 0 {
                return None;
            }
            let metric: u32 = fields[6].parse().unwrap_or(u32::MAX);
            Some((metric, fields[0].to_string()))
        })
        .min_by_key(|(metric, _)| *metric)
        .map(|(_, iface)| iface)
}

/// IPv4 address bound to the default-route interface, or "" if there is none.
pub fn detect_default_ip() -> String {
    let Ok(routes) = fs::read_to_string("/proc/net/route") else {
        log::warn!("Cannot read /proc/net/route, no default IP");
        return String::new();
    };
    let Some(iface) = default_route_interface(&routes) else {
        log::warn!("No default route found");
        return String::new();
    };

    match interface_ipv4(&iface) {
        Some(ip) => ip.to_string(),
        None => {
            log::warn!("Default route interface {} has no IPv4 address", iface);
            String::new()
        }
    }
}

fn interface_ipv4(iface: &str) -> Option<Ipv4Addr> {
    let addrs = nix::ifaddrs::getifaddrs().ok()?;
    addrs
        .filter(|ifa| ifa.interface_name == iface)
        .find_map(|ifa| {
            ifa.address
                .as_ref()
                .and_then(|addr| addr.as_sockaddr_in())
                .map(|sin| Ipv4Addr::from(sin.ip()))
        })
}

/// Derive the DNS suffix from resolv.conf contents.
///
/// Takes the first `search` domain and the `domain` value; the shorter one
/// wins, equal lengths prefer `search`. Falls back to `"local"`.
pub fn dns_suffix(resolv_conf: &str) -> String {
    let mut search: Option<&str> = None;
    let mut domain: Option<&str> = None;

    for line in resolv_conf.lines() {
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some("search"), Some(value)) => search = Some(value),
            (Some("domain"), Some(value)) => domain = Some(value),
            _ => {}
        }
    }

    let chosen = match (search, domain) {
        (Some(s), Some(d)) if d.len() < s.len() => d,
        (Some(s), _) => s,
        (None, Some(d)) => d,
        (None, None) => FALLBACK_DNS_SUFFIX,
    };

    chosen.trim_end_matches('.').to_string()
}

fn detect_dns_suffix() -> String {
    match fs::read_to_string("/etc/resolv.conf") {
        Ok(content) => dns_suffix(&content),
        Err(e) => {
            log::warn!("Cannot read /etc/resolv.conf: {}", e);
            FALLBACK_DNS_SUFFIX.to_string()
        }
    }
}

// ============================================================================
// Identity & time
// ============================================================================

/// Short host name of this machine
pub fn detect_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .map(|name| name.split('.').next().unwrap_or_default().to_string())
        .unwrap_or_default()
}

/// Zone name from a `/etc/localtime` link target such as
/// `/usr/share/zoneinfo/Europe/Berlin`.
pub fn timezone_from_link(target: &Path) -> Option<String> {
    let text = target.to_str()?;
    let (_, zone) = text.split_once("zoneinfo/")?;
    (!zone.is_empty()).then(|| zone.to_string())
}

/// Host time zone, `UTC` when it cannot be determined
pub fn detect_timezone() -> String {
    if let Ok(content) = fs::read_to_string("/etc/timezone") {
        let zone = content.trim();
        if !zone.is_empty() {
            return zone.to_string();
        }
    }

    fs::read_link("/etc/localtime")
        .ok()
        .and_then(|target| timezone_from_link(&target))
        .unwrap_or_else(|| "UTC".to_string())
}

// ============================================================================
// Leftovers
// ============================================================================

/// Entries in `dir` left by an earlier install run.
///
/// A missing directory has no leftovers.
pub fn find_leftovers(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            LEFTOVER_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}
