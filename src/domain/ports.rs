use crate::domain::model::{Completion, SamplingParams};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn service_endpoint(&self) -> &str;
    fn default_model(&self) -> &str;
    fn sampling(&self) -> SamplingParams;
    fn cache_ttl_seconds(&self) -> u64;
    fn prompt_template(&self) -> &str;
    fn detail_level(&self) -> &str;
}

/// 外部文字生成服務
///
/// 失敗時回傳 `RateLimited`、`ServiceError` 或 `ServiceUnavailable`，
/// 不做任何自動重試。
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        params: &SamplingParams,
    ) -> Result<Completion>;
}
