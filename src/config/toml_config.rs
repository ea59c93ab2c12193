use crate::core::cost::{default_price_table, ModelPrice, PriceTable};
use crate::core::prompt::{DEFAULT_DETAIL_LEVEL, DEFAULT_TEMPLATE};
use crate::core::session::DEFAULT_CACHE_TTL_SECONDS;
use crate::domain::model::SamplingParams;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ExtractError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern"));

/// 所有區段皆可省略，省略時使用內建預設值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub service: Option<ServiceConfig>,
    pub sampling: Option<SamplingConfig>,
    pub cache: Option<CacheConfig>,
    pub prompt: Option<PromptConfig>,
    pub pricing: Option<PricingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub default_model: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: Option<u64>,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    pub template: Option<String>,
    pub detail_level: Option<String>,
}

/// 在內建定價之上追加或覆寫
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    pub models: Option<HashMap<String, ModelPrice>>,
    pub aliases: Option<HashMap<String, String>>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ExtractError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ExtractError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${OPENAI_API_KEY})，未設定的變數保留原文
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        // 驗證服務端點
        validation::validate_url("service.endpoint", self.service_endpoint())?;

        if let Some(timeout) = self.service.as_ref().and_then(|s| s.timeout_seconds) {
            validation::validate_positive_number("service.timeout_seconds", timeout, 1)?;
        }

        // 驗證取樣參數
        let sampling = self.sampling();
        validation::validate_range("sampling.temperature", sampling.temperature, 0.0, 2.0)?;
        validation::validate_range("sampling.top_p", sampling.top_p, 0.0, 1.0)?;
        validation::validate_positive_number("sampling.max_tokens", sampling.max_tokens as u64, 1)?;

        if let Some(file) = self.cache_file() {
            validation::validate_path("cache.file", file)?;
        }

        validation::validate_non_empty_string("prompt.template", self.prompt_template())?;
        validation::validate_non_empty_string("prompt.detail_level", self.detail_level())?;

        // 定價表與預設模型需一致
        let prices = self.price_table()?;
        if prices.resolve(self.default_model()).is_err() {
            return Err(ExtractError::InvalidConfigValueError {
                field: "service.default_model".to_string(),
                value: self.default_model().to_string(),
                reason: "No pricing entry for this model".to_string(),
            });
        }

        Ok(())
    }

    /// 未替換的 `${VAR}` 視為未設定
    pub fn configured_api_key(&self) -> Option<&str> {
        self.service
            .as_ref()
            .and_then(|s| s.api_key.as_deref())
            .filter(|key| !key.is_empty() && !ENV_VAR.is_match(key))
    }

    /// 設定檔未提供時改用 `OPENAI_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        self.configured_api_key()
            .map(str::to_string)
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()))
    }

    pub fn timeout_seconds(&self) -> Option<u64> {
        self.service.as_ref().and_then(|s| s.timeout_seconds)
    }

    /// 取得快取檔案路徑
    pub fn cache_file(&self) -> Option<&str> {
        self.cache.as_ref().and_then(|c| c.file.as_deref())
    }

    /// 內建定價加上設定檔中的模型與別名
    pub fn price_table(&self) -> Result<PriceTable> {
        let mut table = default_price_table();
        let Some(pricing) = &self.pricing else {
            return Ok(table);
        };

        for (model_id, price) in pricing.models.iter().flatten() {
            let field = format!("pricing.models.{}", model_id);
            validation::validate_range(&format!("{}.input", field), price.input, 0.0, f64::MAX)?;
            validation::validate_range(&format!("{}.output", field), price.output, 0.0, f64::MAX)?;
            table = table.with_price(model_id.clone(), *price);
        }

        for (alias, canonical) in pricing.aliases.iter().flatten() {
            table = table.with_alias(alias.clone(), canonical.clone());
        }

        for alias in pricing.aliases.iter().flat_map(|a| a.keys()) {
            if table.resolve(alias).is_err() {
                return Err(ExtractError::ConfigValidationError {
                    field: format!("pricing.aliases.{}", alias),
                    message: "Alias points to a model without pricing".to_string(),
                });
            }
        }

        Ok(table)
    }

    /// 以命令列參數覆寫設定
    pub fn apply_overrides(&mut self, endpoint: Option<&str>, model: Option<&str>, cache_file: Option<&str>) {
        if endpoint.is_some() || model.is_some() {
            let service = self.service.get_or_insert_with(ServiceConfig::default);
            if let Some(endpoint) = endpoint {
                service.endpoint = Some(endpoint.to_string());
            }
            if let Some(model) = model {
                service.default_model = Some(model.to_string());
            }
        }
        if let Some(file) = cache_file {
            self.cache.get_or_insert_with(CacheConfig::default).file = Some(file.to_string());
        }
    }
}

impl ConfigProvider for TomlConfig {
    fn service_endpoint(&self) -> &str {
        self.service
            .as_ref()
            .and_then(|s| s.endpoint.as_deref())
            .unwrap_or(DEFAULT_ENDPOINT)
    }

    fn default_model(&self) -> &str {
        self.service
            .as_ref()
            .and_then(|s| s.default_model.as_deref())
            .unwrap_or(DEFAULT_MODEL)
    }

    fn sampling(&self) -> SamplingParams {
        let defaults = SamplingParams::default();
        match &self.sampling {
            Some(s) => SamplingParams {
                temperature: s.temperature.unwrap_or(defaults.temperature),
                top_p: s.top_p.unwrap_or(defaults.top_p),
                max_tokens: s.max_tokens.unwrap_or(defaults.max_tokens),
            },
            None => defaults,
        }
    }

    fn cache_ttl_seconds(&self) -> u64 {
        self.cache
            .as_ref()
            .and_then(|c| c.ttl_seconds)
            .unwrap_or(DEFAULT_CACHE_TTL_SECONDS)
    }

    fn prompt_template(&self) -> &str {
        self.prompt
            .as_ref()
            .and_then(|p| p.template.as_deref())
            .unwrap_or(DEFAULT_TEMPLATE)
    }

    fn detail_level(&self) -> &str {
        self.prompt
            .as_ref()
            .and_then(|p| p.detail_level.as_deref())
            .unwrap_or(DEFAULT_DETAIL_LEVEL)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();

        assert_eq!(config.service_endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.default_model(), "gpt-4-turbo");
        assert_eq!(config.sampling(), SamplingParams::default());
        assert_eq!(config.cache_ttl_seconds(), 3600);
        assert_eq!(config.prompt_template(), DEFAULT_TEMPLATE);
        assert!(config.configured_api_key().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml_config() {
        let toml_content = r#"
[service]
endpoint = "http://localhost:8080/v1"
default_model = "local-model"
timeout_seconds = 30

[sampling]
temperature = 0.5
max_tokens = 512

[cache]
ttl_seconds = 60
file = "./kg-cache.json"

[prompt]
detail_level = "brief"

[pricing.models.local-model]
input = 0.0
output = 0.0

[pricing.aliases]
local = "local-model"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.service_endpoint(), "http://localhost:8080/v1");
        assert_eq!(config.timeout_seconds(), Some(30));
        assert_eq!(config.sampling().temperature, 0.5);
        assert_eq!(config.sampling().top_p, 0.9);
        assert_eq!(config.sampling().max_tokens, 512);
        assert_eq!(config.cache_ttl_seconds(), 60);
        assert_eq!(config.cache_file(), Some("./kg-cache.json"));
        assert_eq!(config.detail_level(), "brief");
        assert!(config.validate().is_ok());

        let table = config.price_table().unwrap();
        assert_eq!(table.resolve("local").unwrap(), "local-model");
        assert_eq!(table.resolve("gpt-4").unwrap(), "gpt-4");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("KG_TEST_API_KEY", "sk-from-env");

        let toml_content = r#"
[service]
api_key = "${KG_TEST_API_KEY}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.configured_api_key(), Some("sk-from-env"));
        assert_eq!(config.api_key().as_deref(), Some("sk-from-env"));

        std::env::remove_var("KG_TEST_API_KEY");
    }

    #[test]
    fn test_unset_env_var_is_kept_and_ignored() {
        let toml_content = r#"
[service]
api_key = "${KG_TEST_SURELY_UNSET_VAR}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.service.as_ref().unwrap().api_key.as_deref(),
            Some("${KG_TEST_SURELY_UNSET_VAR}")
        );
        assert!(config.configured_api_key().is_none());
    }

    #[test]
    fn test_config_validation() {
        let bad_endpoint = TomlConfig::from_toml_str("[service]\nendpoint = \"invalid-url\"\n").unwrap();
        assert!(bad_endpoint.validate().is_err());

        let bad_temperature = TomlConfig::from_toml_str("[sampling]\ntemperature = 3.5\n").unwrap();
        assert!(matches!(
            bad_temperature.validate(),
            Err(ExtractError::InvalidConfigValueError { ref field, .. }) if field == "sampling.temperature"
        ));

        let unknown_model = TomlConfig::from_toml_str("[service]\ndefault_model = \"gpt-9\"\n").unwrap();
        assert!(matches!(
            unknown_model.validate(),
            Err(ExtractError::InvalidConfigValueError { ref field, .. }) if field == "service.default_model"
        ));

        let dangling_alias =
            TomlConfig::from_toml_str("[pricing.aliases]\nfast = \"missing-model\"\n").unwrap();
        assert!(matches!(
            dangling_alias.validate(),
            Err(ExtractError::ConfigValidationError { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[service\nendpoint = 1").unwrap_err();
        assert!(matches!(err, ExtractError::ConfigError { ref message } if message.starts_with("TOML parsing error")));
    }

    #[test]
    fn test_overrides() {
        let mut config = TomlConfig::default();
        config.apply_overrides(Some("http://127.0.0.1:1234"), Some("gpt-4"), Some("cache.json"));
        assert_eq!(config.service_endpoint(), "http://127.0.0.1:1234");
        assert_eq!(config.default_model(), "gpt-4");
        assert_eq!(config.cache_file(), Some("cache.json"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[service]
default_model = "gpt-4"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.default_model(), "gpt-4");
    }
}
