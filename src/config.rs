use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slurm: SlurmConfig,
    pub lustre: LustreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlurmConfig {
    #[serde(default = "default_squeue_command")]
    pub squeue_command: String,
    #[serde(default = "default_squeue_timeout")]
    pub timeout_secs: u64,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            squeue_command: default_squeue_command(),
            timeout_secs: default_squeue_timeout(),
        }
    }
}

/// Endpoints serving the Lustre jobstats throughput queries, one per
/// I/O direction.
#[derive(Debug, Deserialize, Clone)]
pub struct LustreConfig {
    pub read_url: String,
    pub write_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        // Expand environment variables
        let expanded = expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded)
            .with_context(|| "Failed to parse configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Startup-fatal checks. A process with an invalid timeout or a missing
    /// query URL must not begin serving scrapes.
    pub fn validate(&self) -> Result<()> {
        if self.lustre.request_timeout_secs == 0 {
            bail!("lustre.request_timeout_secs must be greater than 0");
        }
        if self.slurm.timeout_secs == 0 {
            bail!("slurm.timeout_secs must be greater than 0");
        }
        if self.slurm.squeue_command.is_empty() {
            bail!("slurm.squeue_command must not be empty");
        }
        if self.lustre.read_url.is_empty() || self.lustre.write_url.is_empty() {
            bail!("lustre.read_url and lustre.write_url must be set");
        }
        Ok(())
    }
}

/// Expand ${ENV_VAR} references in config string
fn expand_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .to_string()
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_bind() -> String { "0.0.0.0:9846".to_string() }
fn default_squeue_command() -> String { "squeue".to_string() }
fn default_squeue_timeout() -> u64 { 15 }
fn default_request_timeout() -> u64 { 10 }
