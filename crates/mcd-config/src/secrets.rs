//! Runtime secret resolution.
//!
//! - Config YAML stores only env var NAMES (`api_key_env: ALPHAVANTAGE_API_KEY`)
//! - [`resolve_secrets`] is called once at startup; the result is passed to
//!   constructors instead of reading the environment elsewhere
//! - `Debug` redacts every value, and errors name the variable, never its value

use std::collections::BTreeMap;

use anyhow::{bail, Result};

use crate::app::{AppConfig, ProviderKind};

/// API keys per provider kind.
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    keys: BTreeMap<ProviderKind, String>,
    /// Env var name per provider kind, kept for error messages.
    names: BTreeMap<ProviderKind, String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("ResolvedSecrets");
        for (kind, var) in &self.names {
            let shown = self.keys.get(kind).map(|_| "<REDACTED>");
            s.field(kind.as_str(), &(var.as_str(), shown));
        }
        s.finish()
    }
}

impl ResolvedSecrets {
    pub fn api_key(&self, kind: ProviderKind) -> Option<&str> {
        self.keys.get(&kind).map(String::as_str)
    }

    /// Key for `kind`, or an error naming the env var that was missing.
    pub fn require(&self, kind: ProviderKind) -> Result<&str> {
        match (self.api_key(kind), self.names.get(&kind)) {
            (Some(k), _) => Ok(k),
            (None, Some(var)) => bail!(
                "SECRETS_MISSING: env var '{}' ({} api key) is not set or empty",
                var,
                kind.as_str()
            ),
            (None, None) => bail!("SECRETS_MISSING: no api_key_env configured for provider {}", kind.as_str()),
        }
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Resolve every provider's `api_key_env`. A missing variable is not an error
/// here; callers use [`ResolvedSecrets::require`] where a key is mandatory.
pub fn resolve_secrets(cfg: &AppConfig) -> ResolvedSecrets {
    resolve_with(cfg, resolve_env)
}

fn resolve_with(cfg: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> ResolvedSecrets {
    let mut out = ResolvedSecrets::default();
    for p in &cfg.data.providers {
        let Some(var) = p.api_key_env.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        out.names.insert(p.kind, var.to_string());
        if let Some(v) = lookup(var) {
            out.keys.insert(p.kind, v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(var: &str) -> Option<String> {
        (var == "AV_KEY").then(|| "demo-secret-value".to_string())
    }

    #[test]
    fn debug_never_prints_values() {
        let s = resolve_with(&AppConfig::default(), |_| Some("demo-secret-value".to_string()));
        let dbg = format!("{s:?}");
        assert!(dbg.contains("ALPHAVANTAGE_API_KEY"));
        assert!(dbg.contains("<REDACTED>"));
        assert!(!dbg.contains("demo-secret-value"));
    }

    #[test]
    fn require_names_the_missing_variable() {
        let s = resolve_with(&AppConfig::default(), lookup);
        assert!(s.api_key(ProviderKind::AlphaVantage).is_none());
        let err = s.require(ProviderKind::AlphaVantage).unwrap_err().to_string();
        assert!(err.contains("ALPHAVANTAGE_API_KEY"));
        assert!(s.require(ProviderKind::Yahoo).is_err());
    }

    #[test]
    fn configured_name_is_resolved() {
        let mut cfg = AppConfig::default();
        cfg.data.providers[1].api_key_env = Some("AV_KEY".to_string());
        let s = resolve_with(&cfg, lookup);
        assert_eq!(s.require(ProviderKind::AlphaVantage).unwrap(), "demo-secret-value");
    }
}
