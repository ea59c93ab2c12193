//! 以輸入指紋為鍵、具存活時間的回應快取
//!
//! 每個指紋各自持有一把非同步鎖，同一指紋同時間最多只有一個
//! `compute` 在執行，其餘等待者直接取得寫入後的結果。

use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

/// 模型識別與完整提示詞的 SHA-256
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(model_id: &str, prompt: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        // 分隔，避免 ("ab", "c") 與 ("a", "bc") 相撞
        hasher.update([0u8]);
        hasher.update(prompt.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub fingerprint: Fingerprint,
    pub value: V,
    pub created_at: DateTime<Utc>,
    /// 秒
    pub ttl: u64,
}

impl<V> CacheEntry<V> {
    /// 存活時間為 0 的項目永遠視為過期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let age_ms = now.signed_duration_since(self.created_at).num_milliseconds() as i128;
        age_ms >= self.ttl as i128 * 1000
    }
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<CacheEntry<V>>>>;

pub struct ResponseCache<V> {
    slots: Mutex<HashMap<Fingerprint, Slot<V>>>,
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ResponseCache")
            .field("slots", &slots.len())
            .finish()
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, fingerprint: &Fingerprint) -> Slot<V> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(fingerprint.clone()).or_default().clone()
    }

    fn existing_slots(&self) -> Vec<Slot<V>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().cloned().collect()
    }

    /// 槽位已空且沒有其他持有者時，從表中移除
    fn release(&self, fingerprint: &Fingerprint, slot: Slot<V>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // 表中一份、`slot` 一份；更多代表還有呼叫端在等待
        let unused = slots
            .get(fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, &slot) && Arc::strong_count(&slot) == 2);
        let empty = unused && slot.try_lock().is_ok_and(|entry| entry.is_none());
        if empty {
            slots.remove(fingerprint);
        }
    }

    /// 命中未過期項目時不會呼叫 `compute`；失敗結果不寫入快取
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        ttl: u64,
        compute: F,
    ) -> Result<(V, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let slot = self.slot(fingerprint);
        let result = Self::fill(&slot, fingerprint, ttl, compute).await;
        self.release(fingerprint, slot);
        result
    }

    async fn fill<F, Fut>(
        slot: &Slot<V>,
        fingerprint: &Fingerprint,
        ttl: u64,
        compute: F,
    ) -> Result<(V, CacheStatus)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_ref() {
            if !entry.is_expired_at(Utc::now()) {
                tracing::debug!("🎯 Cache hit for {}", fingerprint);
                return Ok((entry.value.clone(), CacheStatus::Hit));
            }
            tracing::debug!("⌛ Cache entry for {} expired", fingerprint);
            *guard = None;
        } else {
            tracing::debug!("🔍 Cache miss for {}", fingerprint);
        }

        let value = compute().await?;
        *guard = Some(CacheEntry {
            fingerprint: fingerprint.clone(),
            value: value.clone(),
            created_at: Utc::now(),
            ttl,
        });
        Ok((value, CacheStatus::Miss))
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(fingerprint).cloned()
        };
        if let Some(slot) = slot {
            *slot.lock().await = None;
            self.release(fingerprint, slot);
            tracing::debug!("🗑️ Invalidated cache entry {}", fingerprint);
        }
    }

    /// 清除所有已完成的項目。計算中的槽位保留，等待者仍共用同一次計算，
    /// 其結果在清除後寫入。
    pub fn reset(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        let mut in_flight = 0;
        slots.retain(|_, slot| {
            let Ok(mut entry) = slot.try_lock() else {
                in_flight += 1;
                return true;
            };
            *entry = None;
            // 仍有呼叫端持有時保留，讓它們繼續排隊在同一把鎖上
            Arc::strong_count(slot) > 1
        });
        tracing::info!(
            "🧹 Cache cleared ({} slots, {} still computing)",
            before,
            in_flight
        );
    }

    /// 匯出所有未過期項目
    pub async fn snapshot(&self) -> Vec<CacheEntry<V>> {
        let now = Utc::now();
        let mut entries = Vec::new();
        for slot in self.existing_slots() {
            if let Some(entry) = slot.lock().await.as_ref() {
                if !entry.is_expired_at(now) {
                    entries.push(entry.clone());
                }
            }
        }
        entries
    }

    /// 匯入項目並回傳實際寫入的數量，過期者略過
    pub async fn restore(&self, entries: Vec<CacheEntry<V>>) -> usize {
        let now = Utc::now();
        let mut restored = 0;
        for entry in entries {
            if entry.is_expired_at(now) {
                continue;
            }
            let slot = self.slot(&entry.fingerprint);
            *slot.lock().await = Some(entry);
            restored += 1;
        }
        tracing::debug!("📥 Restored {} cache entries", restored);
        restored
    }

    pub async fn len(&self) -> usize {
        self.snapshot().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ExtractError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fp(prompt: &str) -> Fingerprint {
        Fingerprint::compute("gpt-4", prompt)
    }

    #[test]
    fn test_fingerprint_is_stable_and_model_sensitive() {
        assert_eq!(fp("hello"), fp("hello"));
        assert_ne!(fp("hello"), fp("hello!"));
        assert_ne!(
            Fingerprint::compute("gpt-4", "hello"),
            Fingerprint::compute("gpt-4-1106-preview", "hello")
        );
        assert_eq!(fp("hello").as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_compute() {
        let cache: ResponseCache<Value> = ResponseCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let key = fp("q");

        for expected in [CacheStatus::Miss, CacheStatus::Hit, CacheStatus::Hit] {
            let (value, status) = cache
                .get_or_compute(&key, 3600, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"nodes": []}))
                })
                .await
                .unwrap();
            assert_eq!(status, expected);
            assert_eq!(value, json!({"nodes": []}));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_recomputes() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        let key = fp("q");
        let (_, first) = cache.get_or_compute(&key, 0, || async { Ok(1) }).await.unwrap();
        let (value, second) = cache.get_or_compute(&key, 0, || async { Ok(2) }).await.unwrap();
        assert_eq!(first, CacheStatus::Miss);
        assert_eq!(second, CacheStatus::Miss);
        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        let key = fp("q");

        let result = cache
            .get_or_compute(&key, 3600, || async {
                Err(ExtractError::RateLimited {
                    message: "slow down".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(ExtractError::RateLimited { .. })));
        assert!(cache.is_empty().await);

        let (value, status) = cache.get_or_compute(&key, 3600, || async { Ok(7) }).await.unwrap();
        assert_eq!((value, status), (7, CacheStatus::Miss));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache: Arc<ResponseCache<u32>> = Arc::new(ResponseCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = fp("shared");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute(&key, 3600, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(42)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut misses = 0;
        for handle in handles {
            let (value, status) = handle.await.unwrap();
            assert_eq!(value, 42);
            if status == CacheStatus::Miss {
                misses += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(misses, 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_reset() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        cache.get_or_compute(&fp("a"), 3600, || async { Ok(1) }).await.unwrap();
        cache.get_or_compute(&fp("b"), 3600, || async { Ok(2) }).await.unwrap();
        assert_eq!(cache.len().await, 2);

        cache.invalidate(&fp("a")).await;
        assert_eq!(cache.len().await, 1);
        let (_, status) = cache.get_or_compute(&fp("a"), 3600, || async { Ok(3) }).await.unwrap();
        assert_eq!(status, CacheStatus::Miss);

        cache.reset();
        assert!(cache.is_empty().await);
    }

    fn slot_count<V>(cache: &ResponseCache<V>) -> usize {
        cache.slots.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_empty_slots_are_released() {
        let cache: ResponseCache<u32> = ResponseCache::new();
        for i in 0..100 {
            let result = cache
                .get_or_compute(&fp(&format!("q{}", i)), 3600, || async {
                    Err(ExtractError::ServiceError {
                        status: Some(500),
                        message: "boom".to_string(),
                    })
                })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(slot_count(&cache), 0);

        cache.get_or_compute(&fp("kept"), 3600, || async { Ok(1) }).await.unwrap();
        assert_eq!(slot_count(&cache), 1);
        cache.invalidate(&fp("kept")).await;
        assert_eq!(slot_count(&cache), 0);

        // 過期後重新計算失敗，也不留下槽位
        cache.get_or_compute(&fp("short"), 0, || async { Ok(2) }).await.unwrap();
        let result = cache
            .get_or_compute(&fp("short"), 0, || async {
                Err(ExtractError::ValidationError {
                    message: "no".to_string(),
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(slot_count(&cache), 0);
    }

    #[tokio::test]
    async fn test_reset_while_computing_keeps_single_flight() {
        let cache: Arc<ResponseCache<u32>> = Arc::new(ResponseCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = fp("slow");

        let spawn_call = |cache: Arc<ResponseCache<u32>>, calls: Arc<AtomicUsize>, key: Fingerprint| {
            tokio::spawn(async move {
                cache
                    .get_or_compute(&key, 3600, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        Ok(9)
                    })
                    .await
                    .unwrap()
            })
        };

        let first = spawn_call(cache.clone(), calls.clone(), key.clone());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cache.reset();
        let second = spawn_call(cache.clone(), calls.clone(), key.clone());

        assert_eq!(first.await.unwrap(), (9, CacheStatus::Miss));
        assert_eq!(second.await.unwrap(), (9, CacheStatus::Hit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_restore_skips_expired() {
        let cache: ResponseCache<Value> = ResponseCache::new();
        cache
            .get_or_compute(&fp("kept"), 3600, || async { Ok(json!({"k": 1})) })
            .await
            .unwrap();
        let mut entries = cache.snapshot().await;
        entries.push(CacheEntry {
            fingerprint: fp("stale"),
            value: json!({"k": 2}),
            created_at: Utc::now() - chrono::Duration::hours(2),
            ttl: 3600,
        });

        let serialized = serde_json::to_value(&entries[0]).unwrap();
        let keys: Vec<&String> = serialized.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        for key in ["fingerprint", "value", "created_at", "ttl"] {
            assert!(serialized.get(key).is_some(), "missing {}", key);
        }

        let fresh: ResponseCache<Value> = ResponseCache::new();
        assert_eq!(fresh.restore(entries).await, 1);
        let (value, status) = fresh
            .get_or_compute(&fp("kept"), 3600, || async { Ok(json!(null)) })
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(value, json!({"k": 1}));
    }
}
