use clap::Parser;
use kg_extract::config::toml_config::DEFAULT_ENDPOINT;
use kg_extract::domain::ports::ConfigProvider;
use kg_extract::utils::error::ErrorSeverity;
use kg_extract::utils::{logger, validation, validation::Validate};
use kg_extract::{
    format_graph, CliConfig, ExtractionSession, GraphExtractor, LocalStorage, OpenAiClient,
    TomlConfig,
};

/// 載入並驗證設定
fn prepare(cli: &CliConfig) -> kg_extract::Result<TomlConfig> {
    cli.validate()?;
    let settings = cli.load_settings()?;
    settings.validate()?;

    // 官方端點一定要有金鑰，自架端點則不一定
    if settings.service_endpoint() == DEFAULT_ENDPOINT {
        validation::validate_required_field("service.api_key", &settings.api_key())?;
    }
    Ok(settings)
}

async fn run(cli: &CliConfig, settings: &TomlConfig) -> kg_extract::Result<String> {
    let session = ExtractionSession::new(settings.price_table()?, settings.cache_ttl_seconds());
    let storage = LocalStorage::new(".");

    if let Some(file) = settings.cache_file() {
        session.load_cache(&storage, file).await?;
    }

    let client = OpenAiClient::new(settings.service_endpoint())
        .with_api_key(settings.api_key())
        .with_timeout(settings.timeout_seconds());
    let extractor = GraphExtractor::from_config(client, settings);

    let extraction = extractor
        .extract_graph(&session, &cli.query, settings.default_model())
        .await?;

    if let Some(file) = settings.cache_file() {
        session.save_cache(&storage, file).await?;
    }

    tracing::info!(
        "💰 Estimated cost: ${:.4} (cache {:?})",
        extraction.cost,
        extraction.cache_status
    );
    if !extraction.graph.rejections().is_empty() {
        tracing::warn!(
            "⚠️ {} entries were skipped while building the graph",
            extraction.graph.rejections().len()
        );
    }

    format_graph(&extraction.graph, cli.format)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting kg-extract CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    let settings = match prepare(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    match run(&cli, &settings).await {
        Ok(output) => {
            tracing::info!("✅ Extraction completed successfully!");
            println!("{}", output);
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Extraction failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            // 輸出用戶友好的錯誤信息
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,      // 警告，但成功
                ErrorSeverity::Medium => 2,   // 可重試
                ErrorSeverity::High => 1,     // 輸入或設定錯誤
                ErrorSeverity::Critical => 3, // 系統錯誤
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
