use crate::core::template::{Rendered, SubstitutionSet, Template};
use serde_json::{json, Value};

pub const FUNCTION_NAME: &str = "knowledge_graph";

pub const DEFAULT_DETAIL_LEVEL: &str = "detailed";

/// 預設提示詞。第一輪填入 `detail_level`，第二輪填入 `user_input`；
/// 範例 JSON 中的大括號必須原樣保留到最後。
pub const DEFAULT_TEMPLATE: &str = "Help me understand following by describing as a {detail_level} knowledge graph. \
Reply through the knowledge_graph function with output shaped like \
{\"nodes\": [{\"id\": \"cargo\", \"label\": \"Cargo\", \"type\": \"tool\", \"color\": \"#ffd8b1\"}, \
{\"id\": \"rust\", \"label\": \"Rust\", \"type\": \"language\", \"color\": \"#c1e1c1\"}], \
\"edges\": [{\"from\": \"cargo\", \"to\": \"rust\", \"relationship\": \"builds\", \"color\": \"#aec6cf\"}]} \
Text: {user_input}";

/// 換行轉為空白，移除回車
pub fn normalize_query(query: &str) -> String {
    query.replace('\n', " ").replace('\r', "")
}

/// 已完成設定值代入的提示詞，等待使用者輸入
#[derive(Debug, Clone)]
pub struct ExtractionPrompt {
    stage: Rendered,
}

impl ExtractionPrompt {
    pub fn new(template: &str, detail_level: &str) -> Self {
        let values = SubstitutionSet::new().with("detail_level", detail_level);
        let stage = Template::parse(template).render(&values);
        tracing::debug!(
            "📝 Prompt template prepared, remaining placeholders: {:?}",
            Template::parse(&stage.text).placeholders()
        );
        Self { stage }
    }

    pub fn render(&self, user_input: &str) -> Rendered {
        // 第一輪已完全代入時，文字已還原，不能再當作模板解析
        if self.stage.fully_resolved {
            return self.stage.clone();
        }
        let values = SubstitutionSet::new().with("user_input", user_input);
        Template::parse(&self.stage.text).render(&values)
    }
}

impl Default for ExtractionPrompt {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE, DEFAULT_DETAIL_LEVEL)
    }
}

/// 要求服務填寫的函式結構
pub fn function_schema() -> Value {
    json!({
        "name": FUNCTION_NAME,
        "description": "Generate a knowledge graph with entities and relationships. \
            Use the colors to help differentiate between different node or edge types/categories. \
            Always provide light pastel colors that work well with black font.",
        "parameters": {
            "type": "object",
            "properties": {
                "metadata": {
                    "type": "object",
                    "properties": {
                        "createdDate": {"type": "string"},
                        "lastUpdated": {"type": "string"},
                        "description": {"type": "string"}
                    }
                },
                "nodes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "label": {"type": "string"},
                            "type": {"type": "string"},
                            "color": {"type": "string"},
                            "properties": {
                                "type": "object",
                                "description": "Additional attributes for the node"
                            }
                        },
                        "required": ["id", "label", "type", "color"]
                    }
                },
                "edges": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "from": {"type": "string"},
                            "to": {"type": "string"},
                            "relationship": {"type": "string"},
                            "direction": {"type": "string"},
                            "color": {"type": "string"},
                            "properties": {
                                "type": "object",
                                "description": "Additional attributes for the edge"
                            }
                        },
                        "required": ["from", "to", "relationship", "color"]
                    }
                }
            },
            "required": ["nodes", "edges"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_keeps_example_braces() {
        let prompt = ExtractionPrompt::default();
        let rendered = prompt.render("Rust is built with Cargo.");
        assert!(rendered.fully_resolved);
        assert!(rendered.text.starts_with(
            "Help me understand following by describing as a detailed knowledge graph."
        ));
        assert!(rendered
            .text
            .contains(r#"{"nodes": [{"id": "cargo", "label": "Cargo""#));
        assert!(rendered.text.ends_with("Text: Rust is built with Cargo."));
        assert!(!rendered.text.contains("{{"));
    }

    #[test]
    fn test_two_passes_match_single_pass() {
        let single = Template::parse(DEFAULT_TEMPLATE).render(
            &SubstitutionSet::new()
                .with("detail_level", "brief")
                .with("user_input", "a {b} c"),
        );
        let staged = ExtractionPrompt::new(DEFAULT_TEMPLATE, "brief").render("a {b} c");
        assert_eq!(staged, single);
    }

    #[test]
    fn test_custom_template_with_nested_example() {
        let template = r#"Give a {detail_level} graph like {"metadata": {"description": "x"}} for: {user_input}"#;
        let rendered = ExtractionPrompt::new(template, "brief").render("Cargo builds Rust");
        assert!(rendered.fully_resolved);
        assert_eq!(
            rendered.text,
            r#"Give a brief graph like {"metadata": {"description": "x"}} for: Cargo builds Rust"#
        );
    }

    #[test]
    fn test_template_without_user_input_is_sent_as_is() {
        let prompt = ExtractionPrompt::new("Summarize in {detail_level} form: {\"x\": 1}", "short");
        let rendered = prompt.render("ignored");
        assert!(rendered.fully_resolved);
        assert_eq!(rendered.text, "Summarize in short form: {\"x\": 1}");
    }

    #[test]
    fn test_unknown_placeholder_stays_unresolved() {
        let prompt = ExtractionPrompt::new("{detail_level} {audience}: {user_input}", "detailed");
        let rendered = prompt.render("text");
        assert!(!rendered.fully_resolved);
        assert_eq!(rendered.text, "detailed {audience}: text");
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("line one\r\nline two\n"), "line one line two ");
        assert_eq!(normalize_query("plain"), "plain");
    }

    #[test]
    fn test_function_schema_requires_collections() {
        let schema = function_schema();
        assert_eq!(schema["name"], FUNCTION_NAME);
        assert_eq!(schema["parameters"]["required"], json!(["nodes", "edges"]));
        assert_eq!(
            schema["parameters"]["properties"]["edges"]["items"]["required"],
            json!(["from", "to", "relationship", "color"])
        );
    }
}
