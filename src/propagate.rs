//! Placeholder propagation into fetched scripts.
//!
//! Step scripts ship with bare assignments such as `PROXY_SITE=` so they can
//! be re-run by hand later. Propagation rewrites the first such line for
//! each variable to `PROXY_SITE="value"` and leaves everything else alone.
//!
//! The rewrite is not idempotent: a second pass finds `NAME="old"` and
//! produces `NAME="new""old"`. Scripts are fetched fresh on every run, so
//! each copy is propagated exactly once.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{InstallerError, Result};

/// Quote `value` for use inside a Bash double-quoted string.
pub fn bash_double_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Rewrite the first line starting with `NAME=`.
///
/// The line becomes `NAME="value"` followed by whatever followed the `=`.
/// Returns `None` when no line starts with `NAME=`.
pub fn substitute_first(text: &str, name: &str, value: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    let mut out = String::with_capacity(text.len() + value.len() + 2);
    let mut replaced = false;

    for line in text.split_inclusive('\n') {
        match line.strip_prefix(prefix.as_str()) {
            Some(rest) if !replaced => {
                out.push_str(&prefix);
                out.push_str(&bash_double_quote(value));
                out.push_str(rest);
                replaced = true;
            }
            _ => out.push_str(line),
        }
    }

    replaced.then_some(out)
}

/// Fill the placeholders of one script file in place.
///
/// `vars` are `(NAME, value)` pairs; names the script does not mention are
/// skipped. File permissions are kept. Returns how many placeholders were
/// filled.
pub fn propagate_file<'a, I>(path: &Path, vars: I) -> Result<usize>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut text = fs::read_to_string(path)
        .map_err(|e| InstallerError::propagation(path, format!("cannot read: {}", e)))?;

    let mut filled = 0;
    for (name, value) in vars {
        match substitute_first(&text, name, value) {
            Some(updated) => {
                text = updated;
                filled += 1;
            }
            None => log::debug!("{} has no {}= placeholder", path.display(), name),
        }
    }

    // fs::write truncates in place, so the existing mode bits survive
    fs::write(path, text)
        .map_err(|e| InstallerError::propagation(path, format!("cannot write: {}", e)))?;

    log::info!("Propagated {} value(s) into {}", filled, path.display());
    Ok(filled)
}

/// Value of the first `NAME="..."` assignment, unescaped.
///
/// Returns `None` if there is no `NAME=` line or it was never filled.
pub fn read_assigned(text: &str, name: &str) -> Option<String> {
    let prefix = format!("{}=\"", name);
    let line = text.lines().find(|l| l.starts_with(&format!("{}=", name)))?;
    let quoted = line.strip_prefix(prefix.as_str())?;

    let mut value = String::new();
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => value.push(chars.next()?),
            '"' => return Some(value),
            other => value.push(other),
        }
    }
    None
}

/// Values already propagated into a script, for re-running it later.
///
/// Placeholders still blank are left out of the map.
pub fn read_propagated<'a, I>(path: &Path, names: I) -> Result<HashMap<String, String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let text = fs::read_to_string(path)
        .map_err(|e| InstallerError::propagation(path, format!("cannot read: {}", e)))?;

    Ok(names
        .into_iter()
        .filter_map(|name| read_assigned(&text, name).map(|v| (name.to_string(), v)))
        .collect())
}
