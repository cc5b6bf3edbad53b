//! Integrity Guard
//!
//! Two independent tamper signals:
//!
//! - **Structural validity**: header sizes and header-length fields checked
//!   against the captured bytes. Failures are [`IntegrityViolation`]s.
//! - **Environment trust**: whether the analyzer is running from the module it
//!   was shipped as. This is a coarse anti-hooking signal, not a
//!   cryptographic integrity check.

use crate::IntegrityViolation;
use std::path::Path;

/// Minimum IPv4 header (IHL = 5)
pub const IPV4_MIN_HEADER: usize = 20;

/// Fixed IPv6 header
pub const IPV6_HEADER: usize = 40;

/// Minimum TCP header (data offset = 5)
pub const TCP_MIN_HEADER: usize = 20;

/// UDP header
pub const UDP_HEADER: usize = 8;

/// Capability answering "is this environment the one we shipped in?"
pub trait EnvironmentTrust: Send + Sync {
    fn is_trusted(&self) -> bool;
}

/// Fixed answer, for tests and hosts that cannot probe
#[derive(Debug, Clone, Copy)]
pub struct FixedTrust(pub bool);

impl EnvironmentTrust for FixedTrust {
    fn is_trusted(&self) -> bool {
        self.0
    }
}

/// Trust derived from the running executable's file name.
///
/// The path is resolved once at construction; a missing or unresolvable
/// executable counts as untrusted.
#[derive(Debug, Clone)]
pub struct ExecutableOriginTrust {
    expected_module: String,
    trusted: bool,
}

impl ExecutableOriginTrust {
    pub fn new(expected_module: impl Into<String>) -> Self {
        let expected_module = expected_module.into();
        let trusted = std::env::current_exe()
            .map(|path| origin_matches(&path, &expected_module))
            .unwrap_or(false);

        if !trusted {
            tracing::warn!(
                expected = %expected_module,
                "Analyzer is not running from its expected module"
            );
        }

        Self {
            expected_module,
            trusted,
        }
    }

    pub fn expected_module(&self) -> &str {
        &self.expected_module
    }
}

impl EnvironmentTrust for ExecutableOriginTrust {
    fn is_trusted(&self) -> bool {
        self.trusted
    }
}

/// Does the file name at `path` carry `expected_module`?
pub fn origin_matches(path: &Path, expected_module: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.replace('-', "_").contains(&expected_module.replace('-', "_")))
        .unwrap_or(false)
}

/// Validate a header-length field: at least `min`, within `available`.
///
/// Returns the header length on success.
pub fn check_header_len(
    layer: &'static str,
    declared: usize,
    min: usize,
    available: usize,
) -> Result<usize, IntegrityViolation> {
    if declared < min || declared > available {
        return Err(IntegrityViolation::HeaderLengthOutOfBounds {
            layer,
            declared,
            available,
        });
    }
    Ok(declared)
}

/// Ensure at least `needed` bytes exist for a fixed-size header
pub fn check_min_len(
    layer: &'static str,
    needed: usize,
    available: usize,
) -> Result<(), IntegrityViolation> {
    if available < needed {
        return Err(IntegrityViolation::HeaderTooShort {
            layer,
            needed,
            available,
        });
    }
    Ok(())
}
