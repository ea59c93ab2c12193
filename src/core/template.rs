//! 可分段套用的提示詞模板
//!
//! 佔位符語法為 `{name}`，可帶限定符（`{name[0]}`、`{name.attr}`）、轉換
//! （`!s`、`!r`）與格式（`:[[fill]align][width]`）。`{{` 與 `}}` 為跳脫的大括號；
//! 無法構成佔位符的 `{`（例如內嵌的 JSON 片段）視為一般文字，與它配對的 `}`
//! 也是一般文字，所以 `{"a": {"b": 1}}` 結尾的 `}}` 不會被當成跳脫。
//!
//! 只有值已知的佔位符會被替換，其餘原樣保留，讓後續呼叫帶入更多值。
//! 結果仍含佔位符時，輸出本身是一份模板：文字與已替換值中的大括號會被跳脫，
//! 下一輪解析不會誤判。全部解析完成時才還原跳脫，得到最終文字。

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// 佔位符名稱對應的值；`None` 表示值未知，佔位符保留
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionSet {
    values: BTreeMap<String, Option<String>>,
}

impl SubstitutionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, Some(value.into()));
        self
    }

    pub fn with_optional(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.insert(name, value.map(Into::into));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.values.insert(name.into(), value);
    }

    /// 缺少或為空值時回傳 `None`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
    Center,
}

impl Align {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '<' => Some(Align::Left),
            '>' => Some(Align::Right),
            '^' => Some(Align::Center),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FormatSpec {
    fill: char,
    align: Align,
    width: usize,
}

impl FormatSpec {
    fn parse(spec: &str) -> Option<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let (fill, align, width_start) = match chars.as_slice() {
            [fill, align, ..] if Align::from_char(*align).is_some() => {
                (*fill, Align::from_char(*align)?, 2)
            }
            [align, ..] if Align::from_char(*align).is_some() => (' ', Align::from_char(*align)?, 1),
            _ => (' ', Align::Left, 0),
        };

        let digits: String = chars[width_start..].iter().collect();
        let width = if digits.is_empty() {
            0
        } else if digits.chars().all(|c| c.is_ascii_digit()) {
            digits.parse().ok()?
        } else {
            return None;
        };

        Some(Self { fill, align, width })
    }

    fn apply(&self, value: &str) -> String {
        let len = value.chars().count();
        if len >= self.width {
            return value.to_string();
        }
        let pad = self.width - len;
        let (left, right) = match self.align {
            Align::Left => (0, pad),
            Align::Right => (pad, 0),
            Align::Center => (pad / 2, pad - pad / 2),
        };
        let mut out = String::with_capacity(value.len() + pad);
        out.extend(std::iter::repeat(self.fill).take(left));
        out.push_str(value);
        out.extend(std::iter::repeat(self.fill).take(right));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// 大括號之間的原始內容
    raw: String,
    name: String,
    qualified: bool,
    conversion: Option<char>,
    spec: Option<FormatSpec>,
}

fn ident_len(s: &str) -> usize {
    s.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len())
}

impl Placeholder {
    /// `source` 以 `{` 開頭；成功時回傳佔位符與消耗的位元組數
    fn parse(source: &str) -> Option<(Self, usize)> {
        let close = source.find('}')?;
        let body = &source[1..close];
        if body.contains('{') {
            return None;
        }

        let name_len = ident_len(body);
        let name = &body[..name_len];
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        let mut rest = &body[name_len..];
        let mut qualified = false;
        loop {
            if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']')?;
                rest = &after[end + 1..];
                qualified = true;
            } else if let Some(after) = rest.strip_prefix('.') {
                let end = ident_len(after);
                if end == 0 {
                    return None;
                }
                rest = &after[end..];
                qualified = true;
            } else {
                break;
            }
        }

        let mut conversion = None;
        if let Some(after) = rest.strip_prefix('!') {
            let c = after.chars().next()?;
            if !matches!(c, 's' | 'r' | 'a') {
                return None;
            }
            conversion = Some(c);
            rest = &after[c.len_utf8()..];
        }

        let spec = match rest.strip_prefix(':') {
            Some(spec) => Some(FormatSpec::parse(spec)?),
            None if rest.is_empty() => None,
            None => return None,
        };

        let placeholder = Self {
            raw: body.to_string(),
            name: name.to_string(),
            qualified,
            conversion,
            spec,
        };
        Some((placeholder, close + 1))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 帶索引或屬性存取的佔位符一律不解析
    fn resolve(&self, values: &SubstitutionSet) -> Option<String> {
        if self.qualified {
            return None;
        }
        let value = values.get(&self.name)?;
        let converted = match self.conversion {
            Some('r') | Some('a') => serde_json::Value::String(value.to_string()).to_string(),
            _ => value.to_string(),
        };
        Some(match &self.spec {
            Some(spec) => spec.apply(&converted),
            None => converted,
        })
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `raw` 為原始文字（含跳脫），`text` 為還原後的文字
    Literal { raw: String, text: String },
    Placeholder(Placeholder),
}

/// 文字與佔位符交錯的序列；`Display` 逐位元組還原原始模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

/// `fully_resolved` 為 false 時，`text` 仍是可再次套用的模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub fully_resolved: bool,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut raw = String::new();
        let mut text = String::new();
        let mut rest = source;
        // 尚未關閉的文字 `{` 數量；此時的 `}` 先用來關閉它，不視為跳脫
        let mut open_literals = 0usize;

        while let Some(c) = rest.chars().next() {
            let closes_literal = c == '}' && open_literals > 0;
            if rest.starts_with("{{") || (rest.starts_with("}}") && !closes_literal) {
                raw.push_str(&rest[..2]);
                text.push(c);
                rest = &rest[2..];
                continue;
            }

            if c == '{' {
                if let Some((placeholder, consumed)) = Placeholder::parse(rest) {
                    if !raw.is_empty() {
                        segments.push(Segment::Literal {
                            raw: std::mem::take(&mut raw),
                            text: std::mem::take(&mut text),
                        });
                    }
                    segments.push(Segment::Placeholder(placeholder));
                    rest = &rest[consumed..];
                    continue;
                }
                open_literals += 1;
            } else if closes_literal {
                open_literals -= 1;
            }

            raw.push(c);
            text.push(c);
            rest = &rest[c.len_utf8()..];
        }

        if !raw.is_empty() {
            segments.push(Segment::Literal { raw, text });
        }

        Self { segments }
    }

    /// 模板中出現的佔位符名稱（去重，依出現順序）
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Placeholder(p) = segment {
                if !names.contains(&p.name()) {
                    names.push(p.name());
                }
            }
        }
        names
    }

    pub fn render(&self, values: &SubstitutionSet) -> Rendered {
        let resolved: Vec<Option<String>> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Placeholder(p) => p.resolve(values),
                Segment::Literal { .. } => None,
            })
            .collect();

        let fully_resolved = self
            .segments
            .iter()
            .zip(&resolved)
            .all(|(segment, value)| matches!(segment, Segment::Literal { .. }) || value.is_some());

        let mut out = String::new();
        for (segment, value) in self.segments.iter().zip(resolved) {
            match (segment, value) {
                (Segment::Literal { text, .. }, _) if fully_resolved => out.push_str(text),
                (Segment::Literal { text, .. }, _) => out.push_str(&escape(text)),
                (Segment::Placeholder(_), Some(value)) if fully_resolved => out.push_str(&value),
                (Segment::Placeholder(_), Some(value)) => out.push_str(&escape(&value)),
                (Segment::Placeholder(p), None) => out.push_str(&p.to_string()),
            }
        }

        Rendered {
            text: out,
            fully_resolved,
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal { raw, .. } => f.write_str(raw)?,
                Segment::Placeholder(p) => write!(f, "{}", p)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Template {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Template::parse(s))
    }
}

pub fn render(template: &str, values: &SubstitutionSet) -> Rendered {
    Template::parse(template).render(values)
}

pub fn escape(text: &str) -> String {
    if !text.contains(|c| c == '{' || c == '}') {
        return text.to_string();
    }
    text.replace('{', "{{").replace('}', "}}")
}

pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if (c == '{' || c == '}') && chars.peek() == Some(&c) {
            chars.next();
        }
    }
    out
}
