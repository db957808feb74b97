//! Device address validation and canonicalization
//!
//! Callers hand in loosely formatted addresses (`192.168.1.10`,
//! `http://192.168.1.10`, `ip: 192.168.1.10`). The canonical form is always
//! `http://<dotted-quad>[:<port>]`, and that exact text feeds identifier
//! derivation, so normalization must be stable.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::DeviceError;

const SCHEME: &str = "http://";

static ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    let octet = "(?:25[0-5]|2[0-4][0-9]|[0-1]?[0-9][0-9]?)";
    Regex::new(&format!(r"^{o}\.{o}\.{o}\.{o}(?::([0-9]{{1,5}}))?$", o = octet))
        .expect("address pattern is valid")
});

/// A validated, canonical device base URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Validate `raw` and return its canonical form
    ///
    /// A leading `http://` is removed; otherwise every leading non-digit
    /// character is skipped. The remainder must be a dotted quad with octets
    /// in 0..=255, optionally followed by `:<port>`. Anything trailing after
    /// that is rejected.
    pub fn normalize(raw: &str) -> Result<Self, DeviceError> {
        let rest = match raw.strip_prefix(SCHEME) {
            Some(rest) => rest,
            None => raw.trim_start_matches(|c: char| !c.is_ascii_digit()),
        };

        let caps = ADDRESS_RE
            .captures(rest)
            .ok_or_else(|| DeviceError::InvalidAddress(raw.to_string()))?;

        if let Some(port) = caps.get(1) {
            match port.as_str().parse::<u16>() {
                Ok(p) if p > 0 => {}
                _ => return Err(DeviceError::InvalidAddress(raw.to_string())),
            }
        }

        Ok(Self(format!("{}{}", SCHEME, rest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
