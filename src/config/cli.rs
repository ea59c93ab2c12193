use super::TomlConfig;
use crate::adapters::output::OutputFormat;
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "kg-extract")]
#[command(about = "Extract a knowledge graph from free-form text")]
pub struct CliConfig {
    /// Text to describe as a knowledge graph
    pub query: String,

    #[arg(long, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Model to use (defaults to service.default_model)")]
    pub model: Option<String>,

    #[arg(long, help = "Service endpoint, e.g. https://api.openai.com/v1")]
    pub endpoint: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Interactive)]
    pub format: OutputFormat,

    #[arg(long, help = "Persist the response cache in this file between runs")]
    pub cache_file: Option<PathBuf>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl CliConfig {
    /// 載入設定檔（若有）並套用命令列覆寫
    pub fn load_settings(&self) -> Result<TomlConfig> {
        let mut settings = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };
        let cache_file = self.cache_file.as_ref().map(|p| p.to_string_lossy().into_owned());
        settings.apply_overrides(
            self.endpoint.as_deref(),
            self.model.as_deref(),
            cache_file.as_deref(),
        );
        Ok(settings)
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("query", &self.query)?;
        if let Some(model) = &self.model {
            validation::validate_non_empty_string("model", model)?;
        }
        if let Some(endpoint) = &self.endpoint {
            validation::validate_url("endpoint", endpoint)?;
        }
        Ok(())
    }
}
