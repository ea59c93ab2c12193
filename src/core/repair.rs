//! 將服務回傳的近似 JSON 修補為嚴格 JSON
//!
//! 規則依序套用，且只作用於字串常值之外的文字。每條規則本身冪等，
//! 後面的規則不會產生前面規則能再次匹配的內容，因此整體也冪等。

use crate::utils::error::{ExtractError, Result};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$\-]*)(\s*):").expect("bare key pattern")
});

static BARE_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(:\s*)([A-Za-z_][A-Za-z0-9_.\-]*)(\s*)([,}\]]|$)").expect("bare value pattern")
});

static TRAILING_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",[\s,]*([}\]])").expect("trailing separator pattern"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// 單一修補規則
pub struct RepairRule {
    pub name: &'static str,
    apply: fn(&str) -> String,
}

impl RepairRule {
    pub fn apply(&self, text: &str) -> String {
        (self.apply)(text)
    }
}

/// 套用順序即陣列順序
pub static RULES: [RepairRule; 4] = [
    RepairRule {
        name: "quote_bare_keys",
        apply: quote_bare_keys,
    },
    RepairRule {
        name: "quote_bare_values",
        apply: quote_bare_values,
    },
    RepairRule {
        name: "drop_trailing_separators",
        apply: drop_trailing_separators,
    },
    RepairRule {
        name: "collapse_whitespace",
        apply: collapse_whitespace,
    },
];

enum Span<'a> {
    Code(&'a str),
    Str(&'a str),
}

/// 依雙引號字串切分；未結束的字串視為字串直到結尾
fn split_spans(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                spans.push(Span::Str(&text[start..=i]));
                start = i + 1;
                in_string = false;
            }
        } else if c == '"' {
            if start < i {
                spans.push(Span::Code(&text[start..i]));
            }
            start = i;
            in_string = true;
        }
    }

    if start < text.len() {
        let tail = &text[start..];
        spans.push(if in_string { Span::Str(tail) } else { Span::Code(tail) });
    }
    spans
}

fn map_code(text: &str, f: impl Fn(&str) -> String) -> String {
    split_spans(text)
        .into_iter()
        .map(|span| match span {
            Span::Code(code) => f(code),
            Span::Str(s) => s.to_string(),
        })
        .collect()
}

fn quote_bare_keys(text: &str) -> String {
    map_code(text, |code| BARE_KEY.replace_all(code, "${1}\"${2}\"${3}:").into_owned())
}

fn quote_bare_values(text: &str) -> String {
    map_code(text, |code| {
        BARE_VALUE
            .replace_all(code, |caps: &Captures| match &caps[2] {
                "true" | "false" | "null" => caps[0].to_string(),
                word => format!("{}\"{}\"{}{}", &caps[1], word, &caps[3], &caps[4]),
            })
            .into_owned()
    })
}

fn drop_trailing_separators(text: &str) -> String {
    map_code(text, |code| TRAILING_SEPARATOR.replace_all(code, "${1}").into_owned())
}

fn collapse_whitespace(text: &str) -> String {
    map_code(text, |code| WHITESPACE_RUN.replace_all(code, " ").into_owned())
}

/// 只做文字層面的修補，不解析
pub fn normalize(raw: &str) -> String {
    RULES
        .iter()
        .fold(raw.to_string(), |text, rule| rule.apply(&text))
}

pub fn repair(raw: &str) -> Result<Value> {
    let normalized = normalize(raw);
    if normalized.len() != raw.len() {
        tracing::debug!(
            "🔧 Repaired service output: {} -> {} bytes",
            raw.len(),
            normalized.len()
        );
    }

    serde_json::from_str(&normalized).map_err(|e| ExtractError::MalformedOutput {
        raw: raw.to_string(),
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })
}
