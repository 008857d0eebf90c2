// src/config/relevance.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::Context;
use tracing::{info, warn};

use crate::cache::file::DEFAULT_CACHE_DIR;
use crate::llm::openai::DEFAULT_MODEL;
use crate::relevance::llm::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/relevance.toml";
pub const ENV_CONFIG_PATH: &str = "RELEVANCE_CONFIG_PATH";
pub const ENV_CACHE_TTL_DAYS: &str = "RELEVANCE_CACHE_TTL_DAYS";
pub const ENV_LLM_ENABLED: &str = "RELEVANCE_LLM_ENABLED";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

const MAX_TIMEOUT_SECS: u64 = 120;

fn default_ttl_days() -> u64 {
    7
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}
fn default_true() -> bool {
    true
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}
fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelevanceConfig {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub rules: RulesSection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Only used by the file backend.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
    /// Only used by the memory backend.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            dir: default_cache_dir(),
            ttl_days: default_ttl_days(),
            max_entries: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Only "openai" (or an OpenAI-compatible endpoint) is supported.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            endpoint: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesSection {
    /// Optional TOML rule table replacing the built-in one.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl RelevanceConfig {
    /// Load using RELEVANCE_CONFIG_PATH, else `config/relevance.toml`.
    /// A missing default file yields built-in defaults; a missing explicit file is an error.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match env::var(ENV_CONFIG_PATH) {
            Ok(p) => Self::load_from_file(Path::new(&p))?,
            Err(_) => {
                let p = Path::new(DEFAULT_CONFIG_PATH);
                if p.exists() {
                    Self::load_from_file(p)?
                } else {
                    info!(target: "relevance", "no config file found; using defaults");
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading relevance config from {}", path.display()))?;
        Self::from_toml_str(&data)
            .with_context(|| format!("parsing relevance config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: RelevanceConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(days) = env::var(ENV_CACHE_TTL_DAYS)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.cache.ttl_days = days;
        }
        if let Ok(v) = env::var(ENV_LLM_ENABLED) {
            self.llm.enabled = matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    fn sanitize(&mut self) {
        self.llm.provider = self.llm.provider.trim().to_lowercase();
        self.llm.timeout_secs = self.llm.timeout_secs.clamp(1, MAX_TIMEOUT_SECS);
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            self.llm.temperature = default_temperature();
        }
        if self.llm.max_tokens == 0 {
            self.llm.max_tokens = default_max_tokens();
        }
        // A zero TTL would make every entry dead on arrival.
        self.cache.ttl_days = self.cache.ttl_days.max(1);
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_days.saturating_mul(86_400))
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    /// API key for the configured provider, or `None` when the LLM path should
    /// stay off (disabled, unsupported provider, or no credential).
    pub fn resolve_api_key(&self) -> Option<String> {
        if !self.llm.enabled {
            return None;
        }
        if self.llm.provider != "openai" {
            warn!(target: "relevance", provider = %self.llm.provider, "unsupported LLM provider; rules only");
            return None;
        }
        let raw = if self.llm.api_key.trim().eq_ignore_ascii_case("env") {
            env::var(ENV_OPENAI_API_KEY).unwrap_or_default()
        } else {
            self.llm.api_key.clone()
        };
        let key = raw.trim().to_string();
        if key.is_empty() {
            info!(target: "relevance", "no LLM credential configured; rules only");
            None
        } else {
            Some(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = RelevanceConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.cache.backend, CacheBackend::Memory);
        assert_eq!(cfg.cache.ttl_days, 7);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(7 * 86_400));
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.llm.max_tokens, 150);
        assert_eq!(cfg.llm_timeout(), Duration::from_secs(30));
        assert!(cfg.rules.path.is_none());
    }

    #[test]
    fn sections_parse_and_sanitize() {
        let cfg = RelevanceConfig::from_toml_str(
            r#"
[cache]
backend = "file"
dir = "/tmp/rel"
ttl_days = 0

[llm]
provider = " OpenAI "
timeout_secs = 900
temperature = 7.5
max_tokens = 0

[rules]
path = "config/rules.toml"
"#,
        )
        .unwrap();
        assert_eq!(cfg.cache.backend, CacheBackend::File);
        assert_eq!(cfg.cache.dir, PathBuf::from("/tmp/rel"));
        assert_eq!(cfg.cache.ttl_days, 1);
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.timeout_secs, MAX_TIMEOUT_SECS);
        assert_eq!(cfg.llm.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(cfg.llm.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(cfg.rules.path, Some(PathBuf::from("config/rules.toml")));
    }

    #[test]
    fn unknown_backend_is_an_error() {
        assert!(RelevanceConfig::from_toml_str("[cache]\nbackend = \"redis\"").is_err());
    }

    #[test]
    fn literal_key_and_disabled_flag() {
        let mut cfg = RelevanceConfig::default();
        cfg.llm.api_key = "sk-literal".into();
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-literal"));

        cfg.llm.enabled = false;
        assert!(cfg.resolve_api_key().is_none());

        cfg.llm.enabled = true;
        cfg.llm.provider = "claude".into();
        assert!(cfg.resolve_api_key().is_none());
    }

    #[serial_test::serial]
    #[test]
    fn env_key_and_overrides() {
        env::set_var(ENV_OPENAI_API_KEY, " sk-env ");
        let cfg = RelevanceConfig::default();
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("sk-env"));
        env::remove_var(ENV_OPENAI_API_KEY);
        assert!(cfg.resolve_api_key().is_none());

        env::set_var(ENV_CACHE_TTL_DAYS, "3");
        env::set_var(ENV_LLM_ENABLED, "0");
        let mut cfg = RelevanceConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.cache.ttl_days, 3);
        assert!(!cfg.llm.enabled);
        env::remove_var(ENV_CACHE_TTL_DAYS);
        env::remove_var(ENV_LLM_ENABLED);
    }

    #[serial_test::serial]
    #[test]
    fn load_uses_env_path_then_defaults() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        // Nothing on disk → defaults
        let cfg = RelevanceConfig::load().unwrap();
        assert_eq!(cfg.cache.backend, CacheBackend::Memory);

        // Explicit path wins
        let p = tmp.path().join("custom.toml");
        fs::write(&p, "[cache]\nbackend = \"file\"\n").unwrap();
        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        assert_eq!(RelevanceConfig::load().unwrap().cache.backend, CacheBackend::File);

        // Explicit path that does not exist is an error
        env::set_var(ENV_CONFIG_PATH, tmp.path().join("absent.toml").display().to_string());
        assert!(RelevanceConfig::load().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
