use crate::costs::PricingEntry;
use crate::errors::ArchitectError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application configuration, loaded from a TOML file.
///
/// Every section has serde defaults so a partial (or absent) file yields a
/// working configuration. Validation beyond what serde can express lives in
/// [`Config::validate`], which runs before any agent loop starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub llm: LlmConfig,
    pub costs: CostsConfig,
    pub llm_cache: LlmCacheConfig,
    pub mcp: McpConfig,
    pub memory: MemoryConfig,
    pub tools: ToolsConfig,
    /// Per-profile overrides merged over the built-in agent profiles.
    pub agents: BTreeMap<String, AgentProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub allow_delete: bool,
    /// Globs matched against workspace-relative paths and file names.
    pub sensitive_patterns: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            allow_delete: false,
            sensitive_patterns: default_sensitive_patterns(),
        }
    }
}

fn default_sensitive_patterns() -> Vec<String> {
    ["*.key", "*.pem", "*.env", "*password*", "*secret*"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    pub model: String,
    /// Environment variable holding the API key. The key itself never lives
    /// in the config file.
    pub api_key_env: String,
    /// Override for the chat-completions endpoint (proxies, local gateways).
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: usize,
    /// Rewrite the system message with a cache-control marker for model
    /// families that support prompt caching.
    pub prompt_caching: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            timeout_secs: 120,
            max_retries: 3,
            prompt_caching: false,
            temperature: 0.2,
            max_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostsConfig {
    pub enabled: bool,
    /// Hard ceiling in USD. Crossing it ends the run with `budget_exceeded`.
    pub budget_usd: Option<f64>,
    /// Soft threshold in USD. Crossing it emits a one-shot warning.
    pub warn_at_usd: Option<f64>,
    /// Pricing overrides, keyed by model name or prefix. Take priority over
    /// the embedded price table.
    pub prices: BTreeMap<String, PricingEntry>,
}

impl Default for CostsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            budget_usd: None,
            warn_at_usd: None,
            prices: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmCacheConfig {
    pub enabled: bool,
    /// Cache directory. Defaults to `<user cache dir>/architect/llm-cache`.
    pub dir: Option<PathBuf>,
    pub ttl_hours: u64,
}

impl Default for LlmCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpConfig {
    pub servers: Vec<McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    /// Explicit bearer token. Takes precedence over `token_env`.
    pub token: Option<String>,
    /// Environment variable to read the bearer token from.
    pub token_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            token: None,
            token_env: None,
            timeout_secs: 30,
        }
    }
}

impl McpServerConfig {
    /// Resolve the bearer token: explicit `token` > `token_env` > none.
    pub fn resolve_token(&self) -> Option<String> {
        if let Some(token) = &self.token {
            return Some(token.clone());
        }
        self.token_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub auto_detect_corrections: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_detect_corrections: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub exec_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 120,
        }
    }
}

/// Partial agent-profile override from the config file. `None` fields keep
/// the built-in profile's value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentProfileConfig {
    pub system_prompt: Option<String>,
    pub allowed_tools: Option<Vec<String>>,
    pub confirm_mode: Option<String>,
    pub max_steps: Option<usize>,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config
            .validate()
            .map_err(|e| ArchitectError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Validate constraints serde cannot express. Runs before the loop starts.
    pub fn validate(&self) -> Result<()> {
        if let Some(budget) = self.costs.budget_usd {
            anyhow::ensure!(budget > 0.0, "costs.budget_usd must be positive");
        }
        if let Some(warn_at) = self.costs.warn_at_usd {
            anyhow::ensure!(warn_at > 0.0, "costs.warn_at_usd must be positive");
        }
        for server in &self.mcp.servers {
            anyhow::ensure!(!server.name.is_empty(), "mcp server name must not be empty");
            anyhow::ensure!(
                server.url.starts_with("http://") || server.url.starts_with("https://"),
                "mcp server '{}' has invalid url '{}'",
                server.name,
                server.url
            );
        }
        for pattern in &self.workspace.sensitive_patterns {
            glob::Pattern::new(pattern)
                .with_context(|| format!("invalid sensitive pattern '{}'", pattern))?;
        }
        for (name, profile) in &self.agents {
            if let Some(mode) = &profile.confirm_mode {
                anyhow::ensure!(
                    matches!(mode.as_str(), "yolo" | "confirm-sensitive" | "confirm-all"),
                    "agent '{}' has unknown confirm_mode '{}'",
                    name,
                    mode
                );
            }
            if let Some(max_steps) = profile.max_steps {
                anyhow::ensure!(max_steps >= 1, "agent '{}' max_steps must be >= 1", name);
            }
        }
        Ok(())
    }
}
