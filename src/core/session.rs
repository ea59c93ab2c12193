use crate::core::cache::{CacheEntry, ResponseCache};
use crate::core::cost::{CostAccountant, PriceTable};
use crate::domain::ports::Storage;
use crate::utils::error::{ExtractError, Result};
use serde_json::Value;

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// 呼叫端持有的擷取狀態：回應快取與費用帳本
#[derive(Debug)]
pub struct ExtractionSession {
    cache: ResponseCache<Value>,
    accountant: CostAccountant,
    ttl_seconds: u64,
}

impl ExtractionSession {
    pub fn new(prices: PriceTable, ttl_seconds: u64) -> Self {
        Self {
            cache: ResponseCache::new(),
            accountant: CostAccountant::new(prices),
            ttl_seconds,
        }
    }

    pub fn cache(&self) -> &ResponseCache<Value> {
        &self.cache
    }

    pub fn accountant(&self) -> &CostAccountant {
        &self.accountant
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn reset_cache(&self) {
        self.cache.reset();
    }

    pub fn reset_cost_ledger(&self) {
        self.accountant.reset();
        tracing::info!("🧹 Cost ledger reset");
    }

    /// 檔案不存在時視為空快取
    pub async fn load_cache<S: Storage>(&self, storage: &S, path: &str) -> Result<usize> {
        let data = match storage.read_file(path).await {
            Ok(data) => data,
            Err(ExtractError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("📂 No cache snapshot at {}", path);
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let entries: Vec<CacheEntry<Value>> = serde_json::from_slice(&data)?;
        let restored = self.cache.restore(entries).await;
        tracing::info!("📥 Loaded {} cache entries from {}", restored, path);
        Ok(restored)
    }

    pub async fn save_cache<S: Storage>(&self, storage: &S, path: &str) -> Result<usize> {
        let entries = self.cache.snapshot().await;
        let data = serde_json::to_vec_pretty(&entries)?;
        storage.write_file(path, &data).await?;
        tracing::info!("💾 Saved {} cache entries to {}", entries.len(), path);
        Ok(entries.len())
    }
}
