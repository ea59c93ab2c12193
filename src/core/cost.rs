use crate::domain::model::Usage;
use crate::utils::error::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// 每 1000 tokens 的單價
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

impl ModelPrice {
    pub fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }
}

/// 模型定價表，含別名
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    prices: HashMap<String, ModelPrice>,
    aliases: HashMap<String, String>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, model_id: impl Into<String>, price: ModelPrice) -> Self {
        self.prices.insert(model_id.into(), price);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), canonical.into());
        self
    }

    /// 別名優先於同名的定價項目
    pub fn resolve<'a>(&'a self, model_id: &'a str) -> Result<&'a str> {
        let canonical = self
            .aliases
            .get(model_id)
            .map(String::as_str)
            .unwrap_or(model_id);
        if self.prices.contains_key(canonical) {
            Ok(canonical)
        } else {
            Err(ExtractError::UnknownModel {
                model_id: model_id.to_string(),
            })
        }
    }

    pub fn price_of(&self, model_id: &str) -> Result<ModelPrice> {
        let canonical = self.resolve(model_id)?;
        self.prices
            .get(canonical)
            .copied()
            .ok_or_else(|| ExtractError::UnknownModel {
                model_id: model_id.to_string(),
            })
    }
}

/// 內建定價
pub fn default_price_table() -> PriceTable {
    PriceTable::new()
        .with_price("gpt-4", ModelPrice::new(0.03, 0.06))
        .with_price("gpt-4-1106-preview", ModelPrice::new(0.01, 0.03))
        .with_price("gpt-3.5-turbo-instruct", ModelPrice::new(0.0015, 0.002))
        .with_alias("gpt-4-turbo", "gpt-4-1106-preview")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostLedger {
    pub last_cost: f64,
    pub total_cost: f64,
}

/// 將 token 用量換算成費用並累計
#[derive(Debug, Default)]
pub struct CostAccountant {
    table: PriceTable,
    ledger: Mutex<CostLedger>,
}

impl CostAccountant {
    pub fn new(table: PriceTable) -> Self {
        Self {
            table,
            ledger: Mutex::new(CostLedger::default()),
        }
    }

    pub fn price_table(&self) -> &PriceTable {
        &self.table
    }

    /// 計算單次費用，同時更新最近一次與累計金額
    pub fn estimate(&self, usage: &Usage, model_id: &str) -> Result<f64> {
        let price = self.table.price_of(model_id)?;
        let cost = usage.input_tokens as f64 / 1000.0 * price.input
            + usage.output_tokens as f64 / 1000.0 * price.output;

        let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        ledger.last_cost = cost;
        ledger.total_cost += cost;
        let total = ledger.total_cost;
        drop(ledger);

        tracing::debug!(
            "💰 {} tokens on {}: ${:.4} (total ${:.4})",
            usage.total_tokens(),
            model_id,
            cost,
            total
        );
        Ok(cost)
    }

    pub fn snapshot(&self) -> CostLedger {
        *self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_cost(&self) -> f64 {
        self.snapshot().last_cost
    }

    pub fn total_cost(&self) -> f64 {
        self.snapshot().total_cost
    }

    pub fn reset(&self) {
        *self.ledger.lock().unwrap_or_else(PoisonError::into_inner) = CostLedger::default();
    }
}
