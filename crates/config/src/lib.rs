use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

// ── Resolver config ──────────────────────────────────────────────────────────

/// Tuning knobs for the subject resolver and its caches.
///
/// | Cache    | Keyed by                                  | Bounded by                                  |
/// |----------|-------------------------------------------|---------------------------------------------|
/// | result   | query text, hint, language, context key   | `result_cache_capacity` / `result_cache_ttl_secs` |
/// | context  | context key → last resolved subject       | `context_cache_capacity` / `context_ttl_secs` |
/// | heat     | context key → recently resolved subjects  | `heat_capacity` / `heat_ttl_secs` / `heat_size` |
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Age after which the subject index is rebuilt from a fresh store snapshot.
    pub index_ttl_secs: u64,
    pub result_cache_capacity: usize,
    pub result_cache_ttl_secs: u64,
    pub context_cache_capacity: usize,
    pub context_ttl_secs: u64,
    /// Number of conversations tracked by the heat cache.
    pub heat_capacity: usize,
    pub heat_ttl_secs: u64,
    /// Recently resolved subjects remembered per conversation.
    pub heat_size: usize,
    /// Largest edit distance still accepted as a match.
    pub max_distance: usize,
    /// Upper bound on candidates handed to the evaluator per query.
    pub max_candidates: usize,
    /// Minimum confidence a heat-only match needs before the full candidate
    /// pipeline is skipped.
    pub heat_accept_confidence: f32,
    /// Relational words recognised in addition to the built-in table
    /// (e.g. `"handledare"`).  Matched after normalization.
    pub extra_relation_terms: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            index_ttl_secs: 300,
            result_cache_capacity: 512,
            result_cache_ttl_secs: 120,
            context_cache_capacity: 256,
            context_ttl_secs: 600,
            heat_capacity: 64,
            heat_ttl_secs: 900,
            heat_size: 5,
            max_distance: 2,
            max_candidates: 40,
            heat_accept_confidence: 0.90,
            extra_relation_terms: vec![],
        }
    }
}

impl ResolverConfig {
    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }

    pub fn result_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.result_cache_ttl_secs)
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_secs)
    }

    pub fn heat_ttl(&self) -> Duration {
        Duration::from_secs(self.heat_ttl_secs)
    }
}

/// Logging settings for the embedding process.
///
/// The library crates only emit `tracing` events and never install a
/// subscriber.  The host reads `log_level` and passes it as the default
/// directive of its own subscriber (e.g. an `EnvFilter`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `tracing` level or filter directive, e.g. `"info"` or
    /// `"kindred_subjects=debug"`.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub resolver: ResolverConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        // Env overrides take precedence over the config file.  Unparseable
        // values are ignored rather than failing startup.
        if let Some(max) = env_parse::<usize>("KINDRED_MAX_DISTANCE") {
            config.resolver.max_distance = max;
        }
        if let Some(ttl) = env_parse::<u64>("KINDRED_INDEX_TTL_SECS") {
            config.resolver.index_ttl_secs = ttl;
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| value.trim().parse().ok())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn resolver_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.resolver.max_distance, 2);
        assert_eq!(cfg.resolver.max_candidates, 40);
        assert_eq!(cfg.resolver.heat_size, 5);
        assert_eq!(cfg.resolver.heat_capacity, 64);
        assert_eq!(cfg.resolver.heat_ttl(), Duration::from_secs(15 * 60));
        assert!((cfg.resolver.heat_accept_confidence - 0.90).abs() < f32::EPSILON);
        assert!(cfg.resolver.extra_relation_terms.is_empty());
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    // ── load_from ──────────────────────────────────────────────────────────

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(cfg.resolver.index_ttl_secs, 300);
        assert_eq!(cfg.resolver.result_cache_capacity, 512);
    }

    #[test]
    fn load_from_partial_toml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(
            &path,
            r#"
[resolver]
heat_size = 3
extra_relation_terms = ["handledare"]
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.resolver.heat_size, 3);
        assert_eq!(cfg.resolver.extra_relation_terms, vec!["handledare"]);
        // Everything else should be default
        assert_eq!(cfg.resolver.heat_ttl_secs, 900);
        assert_eq!(cfg.telemetry.log_level, "info");
    }

    #[test]
    fn load_from_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    // ── save_to + roundtrip ────────────────────────────────────────────────

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/config.toml");

        let mut cfg = AppConfig::default();
        cfg.resolver.result_cache_ttl_secs = 30;
        cfg.resolver.heat_accept_confidence = 0.85;
        cfg.telemetry.log_level = "debug".to_string();

        cfg.save_to(&path).unwrap();
        assert!(path.exists());

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.resolver.result_cache_ttl_secs, 30);
        assert!((loaded.resolver.heat_accept_confidence - 0.85).abs() < f32::EPSILON);
        assert_eq!(loaded.telemetry.log_level, "debug");
    }

    #[test]
    fn telemetry_filter_directive_survives_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.toml");
        fs::write(&path, "[telemetry]\nlog_level = \"kindred_subjects=debug\"\n").unwrap();
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.telemetry.log_level, "kindred_subjects=debug");
    }

    #[test]
    fn resolver_config_serializes_to_json() {
        let json = serde_json::to_value(ResolverConfig::default()).unwrap();
        assert_eq!(json["max_distance"], 2);
        assert_eq!(json["heat_ttl_secs"], 900);
    }

    // ── Env var overrides ──────────────────────────────────────────────────

    #[test]
    fn env_overrides_resolver_bounds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(
            &path,
            r#"
[resolver]
max_distance = 1
index_ttl_secs = 60
"#,
        )
        .unwrap();

        // SAFETY: test is single-threaded for these env vars.
        unsafe {
            env::set_var("KINDRED_MAX_DISTANCE", "3");
            env::set_var("KINDRED_INDEX_TTL_SECS", "not-a-number");
        }
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.resolver.max_distance, 3);
        // Unparseable override leaves the file value in place.
        assert_eq!(cfg.resolver.index_ttl_secs, 60);
        unsafe {
            env::remove_var("KINDRED_MAX_DISTANCE");
            env::remove_var("KINDRED_INDEX_TTL_SECS");
        }
    }
}
