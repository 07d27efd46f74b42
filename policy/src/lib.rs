//! Shared policy-set infrastructure (§4.7): string key/value
//! parametrisation, supplied at connection-creation time to a named
//! policy-set implementation.
//!
//! The hook traits themselves — `DtpPolicySet` in the `dtp` crate,
//! `DtcpPolicySet` in the `dtcp` crate — live next to the engine state
//! they take as their first parameter, not here: a shared crate holding
//! both the trait and the concrete state it operates on would need `dtp`
//! and `dtcp` to depend on it while it depended back on them for the
//! state types. This crate only carries what both sides need.
#![deny(missing_docs)]
#![deny(warnings)]
use std::collections::HashMap;
use std::time::Duration;

/// String key/value parameters for a named policy-set implementation.
#[derive(Clone, Debug, Default)]
pub struct PolicyParams(HashMap<String, String>);

impl PolicyParams {
    /// Creates an empty parameter set, meaning every hook uses its
    /// built-in default.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Sets a parameter, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Reads a raw string parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Reads and parses a `u64` parameter, falling back to `default` if
    /// absent or unparsable.
    pub fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// Reads and parses a `u32` parameter, falling back to `default` if
    /// absent or unparsable.
    pub fn get_u32(&self, key: &str, default: u32) -> u32 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// Reads a millisecond-valued parameter as a `Duration`.
    pub fn get_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_falls_back_to_default() {
        let p = PolicyParams::new();
        assert_eq!(p.get_u64("af", 1), 1);
    }

    #[test]
    fn set_overrides_default() {
        let p = PolicyParams::new().with("af", "2");
        assert_eq!(p.get_u64("af", 1), 2);
    }
}
