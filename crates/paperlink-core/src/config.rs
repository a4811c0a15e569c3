use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::models::LanguageClass;

/// Root application configuration, loaded from `~/.config/paperlink/config.toml`.
///
/// Read once at startup; the engine treats it as an immutable snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub extraction: ExtractionConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub matching: MatchingConfig,
    pub library: LibraryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    /// Inline key. Prefer `api_key_env`; an inline key wins when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Use the model at all. When false every record is extracted heuristically.
    pub enabled: bool,
    pub max_pages: usize,
    pub max_chars: usize,
    /// Cache time-to-live in seconds.
    pub cache_ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub daily_api_calls: u32,
    pub monthly_budget: f64,
    pub cost_per_1k_tokens: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStrategy {
    /// Exact maximum-weight bipartite assignment.
    Optimal,
    /// Descending score with conflict skip. Approximate.
    Greedy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub similarity_threshold: f64,
    pub title_weight: f64,
    pub author_weight: f64,
    pub year_weight: f64,
    pub assignment: AssignmentStrategy,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub root: String,
    pub zh_dir: String,
    pub en_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Append-only JSON-lines audit log of model calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_file: Option<String>,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key: None,
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            timeout_secs: 30,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_pages: 3,
            max_chars: 4000,
            cache_ttl: 30 * 24 * 3600,
            cache_dir: None,
            concurrency: 4,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_api_calls: 1000,
            monthly_budget: 100.0,
            cost_per_1k_tokens: 0.002,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            title_weight: 0.6,
            author_weight: 0.3,
            year_weight: 0.1,
            assignment: AssignmentStrategy::Optimal,
            concurrency: 4,
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        Self {
            root: home.join("Papers").to_string_lossy().to_string(),
            zh_dir: "中文pdf".to_string(),
            en_dir: "英文pdf".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            audit_file: None,
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/paperlink/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PAPERLINK_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("paperlink")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Check every limit once, before any work begins.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| -> Result<()> { Err(CoreError::ConfigError(msg)) };

        if self.extraction.max_pages == 0 {
            return fail("extraction.max_pages must be at least 1".into());
        }
        if self.extraction.max_chars == 0 {
            return fail("extraction.max_chars must be at least 1".into());
        }
        if self.extraction.concurrency == 0 || self.matching.concurrency == 0 {
            return fail("concurrency must be at least 1".into());
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1".into());
        }
        if self.llm.timeout_secs == 0 {
            return fail("llm.timeout_secs must be at least 1".into());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return fail(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            ));
        }
        if self.limits.monthly_budget < 0.0 || self.limits.cost_per_1k_tokens < 0.0 {
            return fail("limits must not be negative".into());
        }
        if !(0.0..=1.0).contains(&self.matching.similarity_threshold) {
            return fail(format!(
                "matching.similarity_threshold must be within [0, 1], got {}",
                self.matching.similarity_threshold
            ));
        }

        let m = &self.matching;
        if m.title_weight < 0.0 || m.author_weight < 0.0 || m.year_weight < 0.0 {
            return fail("matching weights must not be negative".into());
        }
        if m.title_weight <= 0.0 {
            return fail("matching.title_weight must be positive".into());
        }
        if m.title_weight < m.author_weight {
            return fail(format!(
                "matching.title_weight ({}) must not be below matching.author_weight ({})",
                m.title_weight, m.author_weight
            ));
        }
        Ok(())
    }

    /// Resolve the model API key: inline value first, then the named env var.
    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = self.llm.api_key.as_deref().map(str::trim)
            && !key.is_empty()
        {
            return Ok(key.to_string());
        }
        match std::env::var(&self.llm.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(CoreError::ConfigError(format!(
                "no API key: set llm.api_key or the {} environment variable",
                self.llm.api_key_env
            ))),
        }
    }

    // ─── Derived paths ─────────────────────────────────────

    /// Library root directory.
    pub fn library_root(&self) -> PathBuf {
        PathBuf::from(&self.library.root)
    }

    /// Directory holding the PDFs of one language class.
    pub fn language_dir(&self, language: LanguageClass) -> PathBuf {
        let name = match language {
            LanguageClass::Zh => &self.library.zh_dir,
            LanguageClass::En => &self.library.en_dir,
        };
        self.library_root().join(name)
    }

    /// Path to the JSON record store.
    pub fn records_path(&self) -> PathBuf {
        self.library_root().join("records.json")
    }

    /// Cache directory for model responses and usage stats.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.extraction.cache_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("paperlink"),
        }
    }

    /// Persisted budget counters.
    pub fn stats_path(&self) -> PathBuf {
        self.cache_dir().join("api_stats.json")
    }
}
