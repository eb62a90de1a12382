//! Calendar-based bundle versioning
//!
//! Bundles are versioned `YYYY.MM.PATCH`. The version is resolved once per
//! run: the `BUNDLE_VERSION` environment variable wins if set (and well
//! formed), otherwise the current UTC date yields `<year>.<month>.0`.

use std::fmt;

use anyhow::Result;
use chrono::{Datelike, Utc};
use regex::Regex;

/// Environment variable overriding the derived version
pub const BUNDLE_VERSION_ENV: &str = "BUNDLE_VERSION";

/// An immutable `YYYY.MM.PATCH` bundle version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleVersion(String);

impl BundleVersion {
    /// Resolve the version for this run from the environment or the clock.
    pub fn resolve() -> Result<Self> {
        match std::env::var(BUNDLE_VERSION_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok(Self::from_current_date()),
        }
    }

    /// Validate an explicit version string
    pub fn parse(value: &str) -> Result<Self> {
        let pattern = Regex::new(r"^\d{4}\.\d{2}\.\d+$").expect("static regex");
        if !pattern.is_match(value) {
            anyhow::bail!(
                "Invalid {BUNDLE_VERSION_ENV} '{value}': expected YYYY.MM.PATCH (e.g. 2025.01.0)"
            );
        }
        Ok(Self(value.to_string()))
    }

    /// Derive `<year>.<month>.0` from the current UTC date
    pub fn from_current_date() -> Self {
        let now = Utc::now();
        Self(format!("{:04}.{:02}.0", now.year(), now.month()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
