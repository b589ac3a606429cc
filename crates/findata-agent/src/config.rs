//! Configuration for agent sessions
//!
//! Constructed once at session start and passed by reference into the
//! components that need it (preamble builder, generator client, engine) —
//! never read ad hoc from the environment inside deep call chains.

use crate::error::{AgentError, Result};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";
const DEFAULT_MODEL: &str = "deepseek-chat";

/// Configuration for one agent session
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// API key for the code generator
    pub api_key: String,

    /// Base URL of the generator endpoint
    pub api_base: String,

    /// Generator model name
    pub model: String,

    /// Bearer credential for the market-data API, exported to the
    /// subprocess environment (never embedded in the generated script)
    pub tushare_token: Option<String>,

    /// Project root; working directory of executed scripts
    pub project_root: PathBuf,

    /// Canonical directory for produced artifacts
    pub exports_dir: PathBuf,

    /// Scratch directory for generated scripts
    pub temp_scripts_dir: PathBuf,

    /// Directory holding the knowledge-base schema documents
    pub knowledge_dir: PathBuf,

    /// Interpreter used to run generated scripts
    pub interpreter: String,

    /// Wall-clock budget per script execution
    pub exec_timeout: Duration,

    /// Maximum generate-then-execute attempts per run
    pub max_attempts: u32,

    /// Max tokens per completion
    pub max_tokens: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Keep scratch scripts after execution for postmortem debugging
    pub keep_scripts: bool,

    /// Ask the generator for structured intent hints before the run
    pub use_llm_extraction: bool,

    /// Run the deterministic template script when no artifact is located
    pub enable_fallback: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let project_root = PathBuf::from(".");
        Self {
            api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            tushare_token: None,
            exports_dir: project_root.join("workspace/exports"),
            temp_scripts_dir: project_root.join("workspace/temp_scripts"),
            knowledge_dir: project_root.join("knowledge_base"),
            project_root,
            interpreter: "python3".to_string(),
            exec_timeout: Duration::from_secs(600),
            max_attempts: 3,
            max_tokens: 4096,
            temperature: 0.0,
            keep_scripts: true,
            use_llm_extraction: true,
            enable_fallback: true,
        }
    }
}

impl AgentConfig {
    /// Create a new configuration builder
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Build a configuration from environment variables
    ///
    /// Reads `DEEPSEEK_API_KEY`, `DEEPSEEK_BASE_URL`, `DEEPSEEK_MODEL` and
    /// `TUSHARE_TOKEN`; everything else keeps its default.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").map_err(|_| {
            AgentError::ConfigError("DEEPSEEK_API_KEY environment variable not set".to_string())
        })?;

        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Ok(base) = std::env::var("DEEPSEEK_BASE_URL") {
            config.api_base = base;
        }
        if let Ok(model) = std::env::var("DEEPSEEK_MODEL") {
            config.model = model;
        }
        if let Ok(token) = std::env::var("TUSHARE_TOKEN") {
            config.tushare_token = Some(token);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AgentError::ConfigError(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.exec_timeout.is_zero() {
            return Err(AgentError::ConfigError(
                "exec_timeout must be non-zero".to_string(),
            ));
        }
        if self.interpreter.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "interpreter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for AgentConfig
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    model: Option<String>,
    tushare_token: Option<String>,
    project_root: Option<PathBuf>,
    exports_dir: Option<PathBuf>,
    temp_scripts_dir: Option<PathBuf>,
    knowledge_dir: Option<PathBuf>,
    interpreter: Option<String>,
    exec_timeout: Option<Duration>,
    max_attempts: Option<u32>,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    keep_scripts: Option<bool>,
    use_llm_extraction: Option<bool>,
    enable_fallback: Option<bool>,
}

impl AgentConfigBuilder {
    /// Set the generator API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the generator base URL
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Set the generator model name
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the market-data API credential
    pub fn tushare_token(mut self, token: impl Into<String>) -> Self {
        self.tushare_token = Some(token.into());
        self
    }

    /// Set the project root; derives the workspace directories unless they
    /// are set explicitly
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    /// Set the artifact export directory
    pub fn exports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exports_dir = Some(dir.into());
        self
    }

    /// Set the scratch-script directory
    pub fn temp_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_scripts_dir = Some(dir.into());
        self
    }

    /// Set the knowledge-base directory
    pub fn knowledge_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.knowledge_dir = Some(dir.into());
        self
    }

    /// Set the script interpreter
    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Set the per-script wall-clock budget
    pub fn exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = Some(timeout);
        self
    }

    /// Set the maximum attempt count
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set max tokens per completion
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set sampling temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Keep or delete scratch scripts after execution
    pub fn keep_scripts(mut self, keep: bool) -> Self {
        self.keep_scripts = Some(keep);
        self
    }

    /// Enable or disable model-assisted intent extraction
    pub fn use_llm_extraction(mut self, enabled: bool) -> Self {
        self.use_llm_extraction = Some(enabled);
        self
    }

    /// Enable or disable the deterministic fallback script
    pub fn enable_fallback(mut self, enabled: bool) -> Self {
        self.enable_fallback = Some(enabled);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AgentConfig> {
        let defaults = AgentConfig::default();
        let project_root = self.project_root.unwrap_or(defaults.project_root);

        let config = AgentConfig {
            api_key: self.api_key.unwrap_or(defaults.api_key),
            api_base: self.api_base.unwrap_or(defaults.api_base),
            model: self.model.unwrap_or(defaults.model),
            tushare_token: self.tushare_token,
            exports_dir: self
                .exports_dir
                .unwrap_or_else(|| project_root.join("workspace/exports")),
            temp_scripts_dir: self
                .temp_scripts_dir
                .unwrap_or_else(|| project_root.join("workspace/temp_scripts")),
            knowledge_dir: self
                .knowledge_dir
                .unwrap_or_else(|| project_root.join("knowledge_base")),
            project_root,
            interpreter: self.interpreter.unwrap_or(defaults.interpreter),
            exec_timeout: self.exec_timeout.unwrap_or(defaults.exec_timeout),
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            keep_scripts: self.keep_scripts.unwrap_or(defaults.keep_scripts),
            use_llm_extraction: self
                .use_llm_extraction
                .unwrap_or(defaults.use_llm_extraction),
            enable_fallback: self.enable_fallback.unwrap_or(defaults.enable_fallback),
        };

        config.validate()?;
        Ok(config)
    }
}
